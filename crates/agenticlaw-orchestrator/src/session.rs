//! Session + Snapshot — per-turn restart-safe state, modeled on the
//! teacher's `.ctx` append-only session log but adding the strictly
//! monotonic sequence-number concept the spec requires.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub mode: String,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
    pub turn_count: u64,
    pub tokens_used: u64,
    pub status: SessionStatus,
}

/// A per-turn restart point. `sequence_number` is strictly increasing within
/// a session, starting at 1, and is written after the plan is produced but
/// before execution begins — so on crash recovery the latest snapshot
/// reflects "about to execute this plan", never a half-executed one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub session_id: String,
    pub sequence_number: u64,
    pub ephemeral_state: serde_json::Value,
    pub retrieval_ids: Vec<String>,
    pub token_budget: u64,
    pub last_command: Option<String>,
    pub created_at_ms: u64,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub struct Session {
    record: RwLock<SessionRecord>,
    next_seq: AtomicU64,
    snapshots: RwLock<Vec<Snapshot>>,
}

impl Session {
    pub fn new(id: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            record: RwLock::new(SessionRecord {
                id: id.into(),
                mode: mode.into(),
                started_at_ms: now_ms(),
                ended_at_ms: None,
                turn_count: 0,
                tokens_used: 0,
                status: SessionStatus::Active,
            }),
            next_seq: AtomicU64::new(1),
            snapshots: RwLock::new(Vec::new()),
        }
    }

    pub fn record(&self) -> SessionRecord {
        self.record.read().unwrap().clone()
    }

    /// Write a snapshot after the plan for this turn is produced. Sequence
    /// numbers are contiguous and monotone; concurrent callers never observe
    /// the same number twice.
    pub fn snapshot(
        &self,
        ephemeral_state: serde_json::Value,
        retrieval_ids: Vec<String>,
        token_budget: u64,
        last_command: Option<String>,
    ) -> Snapshot {
        let sequence_number = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let snap = Snapshot {
            session_id: self.record.read().unwrap().id.clone(),
            sequence_number,
            ephemeral_state,
            retrieval_ids,
            token_budget,
            last_command,
            created_at_ms: now_ms(),
        };
        self.snapshots.write().unwrap().push(snap.clone());
        snap
    }

    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.snapshots.read().unwrap().last().cloned()
    }

    pub fn complete_turn(&self, tokens_used: u64) {
        let mut rec = self.record.write().unwrap();
        rec.turn_count += 1;
        rec.tokens_used += tokens_used;
    }

    pub fn end(&self) {
        let mut rec = self.record.write().unwrap();
        rec.status = SessionStatus::Ended;
        rec.ended_at_ms = Some(now_ms());
    }

    /// Restore from the latest snapshot. Returns the snapshot and, if set,
    /// the command that should be re-issued.
    pub fn replay(&self) -> Option<(Snapshot, Option<String>)> {
        self.latest_snapshot().map(|s| {
            let cmd = s.last_command.clone();
            (s, cmd)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sequence_numbers_are_contiguous_and_monotone() {
        let session = Session::new("s1", "default");
        let a = session.snapshot(json!({}), vec![], 0, None);
        let b = session.snapshot(json!({}), vec![], 0, None);
        let c = session.snapshot(json!({}), vec![], 0, None);
        assert_eq!(a.sequence_number, 1);
        assert_eq!(b.sequence_number, 2);
        assert_eq!(c.sequence_number, 3);
    }

    #[test]
    fn latest_snapshot_is_authoritative() {
        let session = Session::new("s1", "default");
        session.snapshot(json!({"n": 1}), vec![], 0, None);
        session.snapshot(json!({"n": 2}), vec![], 0, Some("retry last".into()));
        let (snap, cmd) = session.replay().unwrap();
        assert_eq!(snap.ephemeral_state, json!({"n": 2}));
        assert_eq!(cmd, Some("retry last".into()));
    }

    #[test]
    fn turn_count_and_tokens_accumulate() {
        let session = Session::new("s1", "default");
        session.complete_turn(100);
        session.complete_turn(50);
        let rec = session.record();
        assert_eq!(rec.turn_count, 2);
        assert_eq!(rec.tokens_used, 150);
    }
}
