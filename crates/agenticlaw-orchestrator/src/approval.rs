//! Approval Gate — sensitivity classification and policy-gated confirmation.
//!
//! Generalizes the knowledge-graph executor's `OperatorRole` + per-node tool
//! budget pattern into a synchronous gate sitting in front of every tool call.

use crate::events::EventBus;
use crate::permission::{classify_action, ActionClass};
use crate::types::{ApprovalMode, Event, EventType, Sensitivity};
use serde_json::{json, Value};
use std::sync::Arc;

/// Outcome of an approval check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub approved: bool,
    pub reason: String,
}

impl Decision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
        }
    }
}

/// Pluggable confirmation channel. The gate is headless by default — a TUI or
/// CLI front end supplies its own sink to actually prompt a human; without
/// one, anything above the policy's auto-approve ceiling is denied.
#[async_trait::async_trait]
pub trait ApprovalSink: Send + Sync {
    async fn confirm(&self, tool_name: &str, sensitivity: Sensitivity) -> bool;
}

/// Denies everything; used when no interactive front end is attached.
pub struct AutoDenySink;

#[async_trait::async_trait]
impl ApprovalSink for AutoDenySink {
    async fn confirm(&self, _tool_name: &str, _sensitivity: Sensitivity) -> bool {
        false
    }
}

/// Names and argument fragments that escalate a call by one sensitivity
/// level regardless of its base classification.
const RISK_HINTS: &[&str] = &[
    "rm ", "git push", "--force", "sudo ", "curl ", "chmod ",
];

/// Patterns severe enough to always classify as `Critical`, bypassing any
/// policy's auto-approve ceiling (only an explicit sink confirmation, never
/// auto-approval, can let these through — `approve()` denies them outright).
const CRITICAL_HINTS: &[&str] = &["rm -rf /", "DROP TABLE", ":(){ :|:& };:"];

fn base_sensitivity(tool_name: &str, args: &Value) -> Sensitivity {
    match tool_name {
        "read" | "glob" | "grep" => Sensitivity::None,
        "write" | "edit" => {
            let path = args
                .get("file_path")
                .or_else(|| args.get("path"))
                .and_then(|v| v.as_str())
                .unwrap_or("");
            if is_sensitive_path(path) {
                Sensitivity::High
            } else {
                Sensitivity::Medium
            }
        }
        "bash" | "command" => Sensitivity::Medium,
        "spawn" => Sensitivity::Low,
        _ => Sensitivity::Low,
    }
}

fn is_sensitive_path(path: &str) -> bool {
    const SENSITIVE_NAMES: &[&str] = &[
        "Cargo.toml",
        "package.json",
        ".env",
        ".git/config",
        "id_rsa",
        "secrets",
    ];
    SENSITIVE_NAMES.iter().any(|n| path.contains(n))
}

fn escalate(sensitivity: Sensitivity) -> Sensitivity {
    match sensitivity {
        Sensitivity::None => Sensitivity::Low,
        Sensitivity::Low => Sensitivity::Medium,
        Sensitivity::Medium => Sensitivity::High,
        Sensitivity::High | Sensitivity::Critical => Sensitivity::Critical,
    }
}

/// Classify a prospective call. Exposed standalone so the Planner/Executor
/// can reason about risk before even reaching the gate.
pub fn classify(tool_name: &str, args: &Value) -> Sensitivity {
    let text = args.to_string();
    if CRITICAL_HINTS.iter().any(|hint| text.contains(hint)) {
        return Sensitivity::Critical;
    }
    let base = base_sensitivity(tool_name, args);
    if RISK_HINTS.iter().any(|hint| text.contains(hint)) {
        escalate(base)
    } else {
        base
    }
}

pub struct ApprovalGate {
    mode: ApprovalMode,
    sink: Arc<dyn ApprovalSink>,
    events: Arc<EventBus>,
}

impl ApprovalGate {
    pub fn new(mode: ApprovalMode, events: Arc<EventBus>) -> Self {
        Self {
            mode,
            sink: Arc::new(AutoDenySink),
            events,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ApprovalSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Ceiling a policy mode auto-approves without consulting the sink.
    ///
    /// `AutoEdit` only raises the ceiling for edit-like writes — commands and
    /// network calls still fall back to `Default`'s Low ceiling, so a
    /// Medium-sensitivity `bash` call prompts even under `autoEdit`.
    fn auto_approve_ceiling(&self, action: ActionClass) -> Sensitivity {
        match self.mode {
            ApprovalMode::Default => Sensitivity::Low,
            ApprovalMode::AutoEdit => match action {
                ActionClass::ReadFile | ActionClass::WriteFile => Sensitivity::Medium,
                ActionClass::ToolCall | ActionClass::NetworkCall => Sensitivity::Low,
            },
            ApprovalMode::Yolo => Sensitivity::High,
        }
    }

    /// Synchronously resolve approval for a call. Suspends the caller until
    /// a decision is reached; the decision is logged to the event bus either
    /// way.
    pub async fn approve(&self, agent_id: Option<&str>, tool_name: &str, args: &Value) -> Decision {
        let sensitivity = classify(tool_name, args);
        let action = classify_action(tool_name);

        self.events.publish(Event {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: EventType::ApprovalPending,
            timestamp_ms: now_ms(),
            agent_id: agent_id.map(String::from),
            payload: json!({ "tool": tool_name, "sensitivity": format!("{:?}", sensitivity) }),
        });

        let decision = if sensitivity == Sensitivity::Critical {
            Decision::deny("critical-sensitivity calls always require a human sink that approves explicitly")
        } else if sensitivity <= self.auto_approve_ceiling(action) {
            Decision::allow(format!("auto-approved under {:?} policy", self.mode))
        } else if self.sink.confirm(tool_name, sensitivity).await {
            Decision::allow("approved by sink")
        } else {
            Decision::deny(format!("{:?} sensitivity exceeds {:?} policy ceiling", sensitivity, self.mode))
        };

        self.events.publish(Event {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: EventType::ApprovalComplete,
            timestamp_ms: now_ms(),
            agent_id: agent_id.map(String::from),
            payload: json!({ "tool": tool_name, "approved": decision.approved, "reason": decision.reason }),
        });

        decision
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_is_never_sensitive() {
        assert_eq!(classify("read", &json!({"file_path": "src/lib.rs"})), Sensitivity::None);
    }

    #[test]
    fn write_to_manifest_is_high() {
        assert_eq!(classify("write", &json!({"file_path": "Cargo.toml"})), Sensitivity::High);
    }

    #[test]
    fn risk_hint_escalates_bash() {
        let plain = classify("bash", &json!({"command": "ls -la"}));
        let risky = classify("bash", &json!({"command": "rm -rf /tmp/x"}));
        assert_eq!(plain, Sensitivity::Medium);
        assert_eq!(risky, Sensitivity::High);
    }

    #[tokio::test]
    async fn default_mode_auto_approves_read_only() {
        let gate = ApprovalGate::new(ApprovalMode::Default, Arc::new(EventBus::default()));
        let d = gate.approve(None, "read", &json!({"file_path": "a.rs"})).await;
        assert!(d.approved);
    }

    #[tokio::test]
    async fn default_mode_denies_writes_without_sink() {
        let gate = ApprovalGate::new(ApprovalMode::Default, Arc::new(EventBus::default()));
        let d = gate.approve(None, "write", &json!({"file_path": "a.rs"})).await;
        assert!(!d.approved);
    }

    #[tokio::test]
    async fn auto_edit_mode_approves_medium_writes_but_not_medium_commands() {
        let gate = ApprovalGate::new(ApprovalMode::AutoEdit, Arc::new(EventBus::default()));
        let write = gate.approve(None, "write", &json!({"file_path": "notes.md"})).await;
        assert!(write.approved);
        let bash = gate.approve(None, "bash", &json!({"command": "ls -la"})).await;
        assert!(!bash.approved);
    }

    #[tokio::test]
    async fn yolo_mode_approves_high_but_not_critical() {
        let gate = ApprovalGate::new(ApprovalMode::Yolo, Arc::new(EventBus::default()));
        let d = gate.approve(None, "write", &json!({"file_path": "Cargo.toml"})).await;
        assert!(d.approved);
        let d2 = gate.approve(None, "bash", &json!({"command": "rm -rf /"})).await;
        assert!(!d2.approved);
    }
}
