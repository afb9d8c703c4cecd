//! Lifecycle Manager — tracks AgentInstance state transitions and reaps
//! finished agents on a periodic sweep.
//!
//! ```text
//! spawning -> running -> {completing -> completed | failed | cancelled} -> destroyed
//! ```

use crate::events::EventBus;
use crate::types::{AgentInstance, AgentState, Event, EventType, ResourceCounters};
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_GRACE_WINDOW: Duration = Duration::from_secs(30);

struct Tracked {
    instance: AgentInstance,
    cancel: CancellationToken,
    timeout_ms: u64,
}

pub struct LifecycleManager {
    agents: DashMap<String, Tracked>,
    events: Arc<EventBus>,
    grace_window: Duration,
}

impl LifecycleManager {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            agents: DashMap::new(),
            events,
            grace_window: DEFAULT_GRACE_WINDOW,
        }
    }

    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn emit(&self, event_type: EventType, agent_id: &str, payload: serde_json::Value) {
        self.events.publish(Event {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            timestamp_ms: Self::now_ms(),
            agent_id: Some(agent_id.to_string()),
            payload,
        });
    }

    /// Register a new agent in `spawning`, returning its cancellation handle.
    pub fn register(&self, agent_id: &str, task_id: &str, timeout_ms: u64) -> CancellationToken {
        let cancel = CancellationToken::new();
        let instance = AgentInstance {
            id: agent_id.to_string(),
            task_id: task_id.to_string(),
            state: AgentState::Spawning,
            started_at_ms: Self::now_ms(),
            ended_at_ms: None,
            counters: ResourceCounters::default(),
            last_error: None,
        };
        self.emit(EventType::SpawnRequested, agent_id, json!({ "task_id": task_id }));
        self.agents.insert(
            agent_id.to_string(),
            Tracked {
                instance,
                cancel: cancel.clone(),
                timeout_ms,
            },
        );
        cancel
    }

    pub fn mark_running(&self, agent_id: &str) {
        if let Some(mut t) = self.agents.get_mut(agent_id) {
            t.instance.state = AgentState::Running;
        }
        self.emit(EventType::AgentSpawned, agent_id, json!({}));
    }

    pub fn progress(&self, agent_id: &str, note: &str) {
        self.emit(EventType::ProgressUpdate, agent_id, json!({ "note": note }));
    }

    fn finish(&self, agent_id: &str, state: AgentState, event_type: EventType, error: Option<&str>) {
        if let Some(mut t) = self.agents.get_mut(agent_id) {
            if t.instance.state.is_terminal() {
                return;
            }
            t.instance.state = state;
            t.instance.ended_at_ms = Some(Self::now_ms());
            t.instance.last_error = error.map(String::from);
        }
        self.emit(event_type, agent_id, json!({ "error": error }));
    }

    pub fn mark_completed(&self, agent_id: &str) {
        self.finish(agent_id, AgentState::Completed, EventType::AgentCompleted, None);
    }

    pub fn mark_failed(&self, agent_id: &str, error: &str) {
        self.finish(agent_id, AgentState::Failed, EventType::AgentFailed, Some(error));
    }

    pub fn mark_cancelled(&self, agent_id: &str) {
        self.finish(agent_id, AgentState::Cancelled, EventType::AgentCancelled, None);
    }

    pub fn record_tool_call(&self, agent_id: &str) {
        if let Some(mut t) = self.agents.get_mut(agent_id) {
            t.instance.counters.tool_calls += 1;
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentInstance> {
        self.agents.get(agent_id).map(|t| t.instance.clone())
    }

    pub fn list(&self) -> Vec<AgentInstance> {
        self.agents.iter().map(|t| t.instance.clone()).collect()
    }

    /// One sweep pass: cancel timed-out running agents, destroy terminal
    /// agents past the grace window. Returns the ids destroyed this pass.
    pub fn sweep(&self) -> Vec<String> {
        let now = Self::now_ms();
        let mut to_cancel = Vec::new();
        let mut to_destroy = Vec::new();

        for entry in self.agents.iter() {
            let t = entry.value();
            if !t.instance.state.is_terminal() && t.instance.state != AgentState::Destroyed {
                let deadline = t.instance.started_at_ms + t.timeout_ms;
                if now > deadline {
                    to_cancel.push(entry.key().clone());
                }
            } else if t.instance.state.is_terminal() {
                if let Some(ended) = t.instance.ended_at_ms {
                    if now.saturating_sub(ended) > self.grace_window.as_millis() as u64 {
                        to_destroy.push(entry.key().clone());
                    }
                }
            }
        }

        for id in &to_cancel {
            warn!(agent = %id, "lifecycle sweep: agent exceeded its timeout, cancelling");
            if let Some(t) = self.agents.get(id) {
                t.cancel.cancel();
            }
            self.mark_cancelled(id);
        }

        for id in &to_destroy {
            self.emit(EventType::CleanupInitiated, id, json!({}));
            self.agents.remove(id);
            self.emit(EventType::AgentDestroyed, id, json!({}));
            debug!(agent = %id, "lifecycle sweep: destroyed");
        }

        to_destroy
    }

    /// Force every non-destroyed agent into `destroyed`, cancelling the
    /// living ones first. Called on process shutdown.
    pub fn shutdown(&self) {
        let ids: Vec<String> = self.agents.iter().map(|t| t.key().clone()).collect();
        for id in &ids {
            if let Some(t) = self.agents.get(id) {
                if !t.instance.state.is_terminal() {
                    t.cancel.cancel();
                }
            }
            self.mark_cancelled(id);
            self.emit(EventType::CleanupInitiated, id, json!({}));
            self.emit(EventType::AgentDestroyed, id, json!({}));
        }
        self.agents.clear();
        info!(count = ids.len(), "lifecycle manager: forced shutdown");
    }

    /// Spawn a background task that calls `sweep()` on an interval. Returns a
    /// handle the caller can abort.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(DEFAULT_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                this.sweep();
            }
        })
    }
}
