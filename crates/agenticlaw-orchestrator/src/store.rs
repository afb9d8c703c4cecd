//! Reference persistence backend — append-only newline-delimited JSON files,
//! one per entity kind, mirroring the teacher's `.ctx` append-only session
//! log convention. Exists for local operation and tests; any backend honoring
//! the same shape is acceptable in production.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use agenticlaw_core::{Error, ErrorKind};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub root_path: String,
    pub name: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionLogRecord {
    pub id: String,
    pub project_id: String,
    pub session_id: Option<String>,
    #[serde(rename = "type")]
    pub log_type: String,
    pub tool: Option<String>,
    pub input: Option<serde_json::Value>,
    pub output: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub created_at_ms: u64,
}

/// File-backed append-only store for one workspace directory.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        Ok(Self { root: root.as_ref().to_path_buf() })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.ndjson", name))
    }

    fn append(&self, name: &str, value: &impl Serialize) -> Result<(), Error> {
        let line = serde_json::to_string(value)?;
        let mut file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(name))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn read_all<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<Vec<T>, Error> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line)?);
        }
        Ok(out)
    }

    pub fn put_project(&self, project: &ProjectRecord) -> Result<(), Error> {
        self.append("projects", project)
    }

    pub fn projects(&self) -> Result<Vec<ProjectRecord>, Error> {
        self.read_all("projects")
    }

    pub fn put_session(&self, session: &crate::session::SessionRecord) -> Result<(), Error> {
        self.append("sessions", session)
    }

    pub fn sessions(&self) -> Result<Vec<crate::session::SessionRecord>, Error> {
        self.read_all("sessions")
    }

    pub fn put_snapshot(&self, snapshot: &crate::session::Snapshot) -> Result<(), Error> {
        self.append("snapshots", snapshot)
    }

    pub fn snapshots_for(&self, session_id: &str) -> Result<Vec<crate::session::Snapshot>, Error> {
        Ok(self
            .read_all::<crate::session::Snapshot>("snapshots")?
            .into_iter()
            .filter(|s| s.session_id == session_id)
            .collect())
    }

    /// The latest snapshot for a session by sequence number, or `NotFound`
    /// if none were ever written.
    pub fn latest_snapshot(&self, session_id: &str) -> Result<crate::session::Snapshot, Error> {
        self.snapshots_for(session_id)?
            .into_iter()
            .max_by_key(|s| s.sequence_number)
            .ok_or_else(|| Error::runtime(ErrorKind::NotFound, format!("no snapshot for session {}", session_id)))
    }

    pub fn put_execution_log(&self, log: &ExecutionLogRecord) -> Result<(), Error> {
        self.append("execution_log", log)
    }

    pub fn execution_logs(&self) -> Result<Vec<ExecutionLogRecord>, Error> {
        self.read_all("execution_log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use serde_json::json;

    fn test_store() -> (FileStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn project_roundtrips() {
        let (store, _dir) = test_store();
        let p = ProjectRecord {
            id: "p1".into(),
            root_path: "/tmp/proj".into(),
            name: "demo".into(),
            created_at_ms: 1,
            updated_at_ms: 1,
        };
        store.put_project(&p).unwrap();
        let all = store.projects().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "p1");
    }

    #[test]
    fn latest_snapshot_picks_max_sequence() {
        let (store, _dir) = test_store();
        let session = Session::new("s1", "default");
        let a = session.snapshot(json!({"n": 1}), vec![], 0, None);
        let b = session.snapshot(json!({"n": 2}), vec![], 0, None);
        store.put_snapshot(&a).unwrap();
        store.put_snapshot(&b).unwrap();
        let latest = store.latest_snapshot("s1").unwrap();
        assert_eq!(latest.sequence_number, b.sequence_number);
    }

    #[test]
    fn missing_session_snapshot_is_not_found() {
        let (store, _dir) = test_store();
        let err = store.latest_snapshot("ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
