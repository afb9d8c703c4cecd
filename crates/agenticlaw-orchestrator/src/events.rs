//! Event Bus — typed pub/sub with bounded history and pattern detection.
//!
//! Publication is synchronous: subscribers registered before `publish()` are
//! invoked in registration order, in the same call. There is no per-subscriber
//! buffering, so handlers must be cheap (O(1)); slow consumers should offload
//! to their own task.

use crate::types::{Event, EventType};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

pub type Handler = Box<dyn Fn(&Event) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Filter {
    Type(EventType),
    Wildcard,
}

impl Filter {
    fn matches(&self, ty: EventType) -> bool {
        match self {
            Filter::Type(t) => *t == ty,
            Filter::Wildcard => true,
        }
    }
}

struct Subscription {
    id: u64,
    filter: Filter,
    once: bool,
    handler: Handler,
}

/// Handle returned by `subscribe*`, used to deregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Stats {
    counts: HashMap<EventType, u64>,
}

const DEFAULT_CAPACITY: usize = 1000;
/// Window used by rapid-fire detection.
const RAPID_FIRE_WINDOW_MS: u64 = 1000;
/// Window used by `count_recent`.
const RECENT_MINUTE_WINDOW_MS: u64 = 60_000;

pub struct EventBus {
    capacity: usize,
    history: RwLock<VecDeque<Event>>,
    subs: RwLock<Vec<Subscription>>,
    stats: RwLock<Stats>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            history: RwLock::new(VecDeque::with_capacity(capacity.min(4096))),
            subs: RwLock::new(Vec::new()),
            stats: RwLock::new(Stats::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn subscribe(&self, event_type: EventType, handler: Handler) -> SubscriptionId {
        self.push_sub(Filter::Type(event_type), false, handler)
    }

    pub fn subscribe_all(&self, handler: Handler) -> SubscriptionId {
        self.push_sub(Filter::Wildcard, false, handler)
    }

    pub fn subscribe_once(&self, event_type: EventType, handler: Handler) -> SubscriptionId {
        self.push_sub(Filter::Type(event_type), true, handler)
    }

    fn push_sub(&self, filter: Filter, once: bool, handler: Handler) -> SubscriptionId {
        let id = self.next_id();
        self.subs.write().unwrap().push(Subscription {
            id,
            filter,
            once,
            handler,
        });
        SubscriptionId(id)
    }

    /// Remove a subscription. No-op if already deregistered (e.g. a `once`
    /// subscription that already fired).
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subs.write().unwrap().retain(|s| s.id != id.0);
    }

    /// Publish an event: record it in history, update stats, then dispatch to
    /// every matching subscriber registered so far, in order. `once`
    /// subscribers are removed after firing.
    pub fn publish(&self, event: Event) {
        {
            let mut hist = self.history.write().unwrap();
            if hist.len() >= self.capacity {
                hist.pop_front();
            }
            hist.push_back(event.clone());
        }
        {
            let mut stats = self.stats.write().unwrap();
            *stats.counts.entry(event.event_type).or_insert(0) += 1;
        }

        let mut fired_once = Vec::new();
        {
            let subs = self.subs.read().unwrap();
            for sub in subs.iter() {
                if sub.filter.matches(event.event_type) {
                    (sub.handler)(&event);
                    if sub.once {
                        fired_once.push(sub.id);
                    }
                }
            }
        }
        if !fired_once.is_empty() {
            let mut subs = self.subs.write().unwrap();
            subs.retain(|s| !fired_once.contains(&s.id));
        }
    }

    /// The last `n` events in publish order (oldest first).
    pub fn history(&self, n: usize) -> Vec<Event> {
        let hist = self.history.read().unwrap();
        hist.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn count(&self, event_type: EventType) -> u64 {
        self.stats
            .read()
            .unwrap()
            .counts
            .get(&event_type)
            .copied()
            .unwrap_or(0)
    }

    /// Count of `event_type` events whose timestamp falls within the last
    /// minute, relative to `now_ms`. Unlike `count()`, this is a sliding
    /// window over `history` rather than a lifetime total, so it is bounded
    /// by `capacity` even for a long-running bus.
    pub fn count_recent(&self, event_type: EventType, now_ms: u64) -> u64 {
        let cutoff = now_ms.saturating_sub(RECENT_MINUTE_WINDOW_MS);
        let hist = self.history.read().unwrap();
        hist.iter()
            .filter(|e| e.event_type == event_type && e.timestamp_ms >= cutoff)
            .count() as u64
    }

    /// True if at least `k` events of `event_type` occurred within
    /// `RAPID_FIRE_WINDOW_MS` of the most recent one in history.
    pub fn rapid_fire(&self, event_type: EventType, k: usize) -> bool {
        let hist = self.history.read().unwrap();
        let matching: Vec<&Event> = hist.iter().filter(|e| e.event_type == event_type).collect();
        if matching.len() < k {
            return false;
        }
        let last_n = &matching[matching.len() - k..];
        let span = last_n.last().unwrap().timestamp_ms - last_n.first().unwrap().timestamp_ms;
        span <= RAPID_FIRE_WINDOW_MS
    }

    /// True if `agent_id`'s history contains a full lifecycle: a spawn event,
    /// a terminal event, and a destroyed event, in that relative order.
    pub fn lifecycle_complete(&self, agent_id: &str) -> bool {
        let hist = self.history.read().unwrap();
        let mut saw_spawned = false;
        let mut saw_terminal = false;
        let mut saw_destroyed = false;
        for e in hist.iter() {
            if e.agent_id.as_deref() != Some(agent_id) {
                continue;
            }
            match e.event_type {
                EventType::AgentSpawned => saw_spawned = true,
                EventType::AgentCompleted | EventType::AgentFailed | EventType::AgentCancelled => {
                    if saw_spawned {
                        saw_terminal = true;
                    }
                }
                EventType::AgentDestroyed => {
                    if saw_terminal {
                        saw_destroyed = true;
                    }
                }
                _ => {}
            }
        }
        saw_spawned && saw_terminal && saw_destroyed
    }
}
