//! Trio runtime substrate: plan scoring and execution strategy selection,
//! mini-agent spawning and lifecycle, permission and approval gating, the
//! event bus, memory scoping, and session/snapshot bookkeeping.
//!
//! This crate owns the orchestration core; concrete tool implementations,
//! LLM client wiring, and UI/CLI surfaces live in the sibling crates that
//! depend on it.

pub mod approval;
pub mod context;
pub mod coordinator;
pub mod events;
pub mod executor;
pub mod lifecycle;
pub mod permission;
pub mod planner;
pub mod session;
pub mod spawner;
pub mod store;
pub mod types;

pub use approval::{ApprovalGate, ApprovalSink, AutoDenySink, Decision};
pub use context::{AssembledContext, EphemeralTurn, MemoryScoper, PinnedFact, RetrievedChunk, ScopedContext, TokenReport};
pub use coordinator::{Aggregated, Coordinator, CoordinatorResult};
pub use events::{EventBus, Handler, SubscriptionId};
pub use executor::{ExecutionResult, Executor, StepOutcome, StepResult};
pub use lifecycle::LifecycleManager;
pub use permission::{ActionClass, PermissionManager};
pub use planner::{EchoPlanner, PlanBuilder};
pub use session::{Session, SessionRecord, SessionStatus, Snapshot};
pub use spawner::{AgentSpawner, SpawnOutcome};
pub use store::{ExecutionLogRecord, FileStore, ProjectRecord};
pub use types::*;
