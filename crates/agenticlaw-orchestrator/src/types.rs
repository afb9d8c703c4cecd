//! Core data model: plans, steps, mini-agent tasks, instances, permissions, events.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// What kind of work a step performs — used for step-grouping and tool-set inference.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    File,
    Command,
    Search,
    Edit,
    Analysis,
    General,
}

/// A single unit of work in a Plan.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub kind: StepKind,
}

impl Step {
    pub fn is_independent(&self) -> bool {
        self.depends_on.is_empty()
    }
}

/// An ordered, dependency-annotated set of steps produced by the Planner.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
    /// Set when the Planner decided this turn needs no tool execution at all
    /// (greeting, trivia) — the Orchestrator short-circuits on this.
    pub direct_response: Option<String>,
}

impl Plan {
    pub fn conversational(response: impl Into<String>) -> Self {
        Self {
            steps: Vec::new(),
            direct_response: Some(response.into()),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.steps.is_empty()
    }

    /// Validate that `depends_on` references only earlier step ids and that
    /// the dependency graph has no cycles. Returns the first offending step
    /// id on failure.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            for dep in &step.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(format!(
                        "step '{}' depends on '{}' which is not an earlier step",
                        step.id, dep
                    ));
                }
            }
            if !seen.insert(step.id.as_str()) {
                return Err(format!("duplicate step id '{}'", step.id));
            }
        }
        Ok(())
    }
}

/// Deterministic scores computed over a produced Plan.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanScore {
    pub complexity: f64,
    pub parallelizability: f64,
}

/// Execution strategy selected by the Orchestrator from a PlanScore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    MainOnly,
    MainWithDelegation,
    Hybrid,
    MiniAgentsOnly,
}

/// Relative scheduling priority for a mini-agent task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// A unit of delegated work handed to a mini-agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MiniAgentTask {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub prompt: String,
    pub allowed_tools: Vec<String>,
    pub restricted_tools: Vec<String>,
    pub max_iterations: usize,
    pub timeout_ms: u64,
    pub priority: TaskPriority,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Lifecycle state of an AgentInstance. Transitions are monotone: an instance
/// never re-enters a state it has already left.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Spawning,
    Running,
    Completing,
    Completed,
    Failed,
    Cancelled,
    Destroyed,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Per-agent resource usage, incremented by the PermissionManager on every call.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ResourceCounters {
    pub file_reads: u64,
    pub file_writes: u64,
    pub tool_calls: u64,
    pub network_calls: u64,
    pub tokens: u64,
}

/// A live or recently-terminated mini-agent, tracked by the Lifecycle Manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentInstance {
    pub id: String,
    pub task_id: String,
    pub state: AgentState,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
    pub counters: ResourceCounters,
    pub last_error: Option<String>,
}

/// Filesystem access level granted to an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSystemAccess {
    None,
    Read,
    Write,
}

/// Immutable permission bundle assigned to an agent at registration time.
/// Never widened after creation; per-task overrides can only narrow a
/// global security-mode preset, never exceed it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Permissions {
    pub allowed: HashSet<String>,
    pub restricted: HashSet<String>,
    pub read_only: bool,
    pub network_access: bool,
    pub file_system_access: FileSystemAccess,
    pub dangerous_operations: bool,
    pub git_operations: bool,
    pub max_tool_calls: u64,
    pub max_file_reads: u64,
    pub max_file_writes: u64,
    pub max_network_calls: u64,
}

/// Global presets for default Permissions, selected by `RuntimeConfig::security_mode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    Strict,
    Default,
    Permissive,
    Development,
}

impl SecurityMode {
    pub fn defaults(&self) -> Permissions {
        match self {
            SecurityMode::Strict => Permissions {
                allowed: HashSet::new(),
                restricted: HashSet::new(),
                read_only: true,
                network_access: false,
                file_system_access: FileSystemAccess::Read,
                dangerous_operations: false,
                git_operations: false,
                max_tool_calls: 20,
                max_file_reads: 50,
                max_file_writes: 0,
                max_network_calls: 0,
            },
            SecurityMode::Default => Permissions {
                allowed: HashSet::new(),
                restricted: HashSet::new(),
                read_only: false,
                network_access: false,
                file_system_access: FileSystemAccess::Write,
                dangerous_operations: false,
                git_operations: true,
                max_tool_calls: 100,
                max_file_reads: 200,
                max_file_writes: 50,
                max_network_calls: 10,
            },
            SecurityMode::Permissive => Permissions {
                allowed: HashSet::new(),
                restricted: HashSet::new(),
                read_only: false,
                network_access: true,
                file_system_access: FileSystemAccess::Write,
                dangerous_operations: true,
                git_operations: true,
                max_tool_calls: 500,
                max_file_reads: 1000,
                max_file_writes: 300,
                max_network_calls: 100,
            },
            SecurityMode::Development => Permissions {
                allowed: HashSet::new(),
                restricted: HashSet::new(),
                read_only: false,
                network_access: true,
                file_system_access: FileSystemAccess::Write,
                dangerous_operations: true,
                git_operations: true,
                max_tool_calls: u64::MAX,
                max_file_reads: u64::MAX,
                max_file_writes: u64::MAX,
                max_network_calls: u64::MAX,
            },
        }
    }
}

/// Sensitivity classification assigned to a tool call by the Approval Gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Approval policy mode, selected via CLI flag or config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalMode {
    Default,
    AutoEdit,
    Yolo,
}

/// Event envelope published on the Event Bus.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub event_type: EventType,
    pub timestamp_ms: u64,
    pub agent_id: Option<String>,
    pub payload: serde_json::Value,
}

/// Typed event kinds. Lifecycle events for one agent id always appear in the
/// order listed for `SPAWN_REQUESTED..AGENT_DESTROYED`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    SpawnRequested,
    AgentSpawned,
    ProgressUpdate,
    AgentCompleted,
    AgentFailed,
    AgentCancelled,
    CleanupInitiated,
    AgentDestroyed,
    ToolStart,
    ToolComplete,
    ToolError,
    ApprovalPending,
    ApprovalComplete,
}
