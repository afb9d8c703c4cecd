//! Executor (C8) — walks a Plan in topological order, running independent
//! steps through a bounded-parallelism pool and aggregating results.

use crate::approval::ApprovalGate;
use crate::events::EventBus;
use crate::types::{Event, EventType, Plan, Step};
use agenticlaw_core::ErrorKind;
use agenticlaw_tools::ToolRegistry;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Clone, Debug)]
pub enum StepOutcome {
    Success(Value),
    Failed(String),
    /// Never ran because an upstream dependency failed; carries that step's id.
    Skipped { upstream: String },
}

#[derive(Clone, Debug)]
pub struct StepResult {
    pub step_id: String,
    pub outcome: StepOutcome,
}

#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub step_results: Vec<StepResult>,
    pub overall_success: bool,
    pub response: Option<String>,
}

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Executor {
    tools: Arc<ToolRegistry>,
    approval: Arc<ApprovalGate>,
    events: Arc<EventBus>,
    max_parallel: usize,
    step_timeout: Duration,
}

impl Executor {
    pub fn new(tools: Arc<ToolRegistry>, approval: Arc<ApprovalGate>, events: Arc<EventBus>, max_concurrent_agents: usize) -> Self {
        Self {
            tools,
            approval,
            events,
            max_parallel: max_concurrent_agents.min(4).max(1),
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Build a breadth-first topological order in levels, each level
    /// runnable concurrently once its dependencies have resolved. Assumes
    /// `plan.validate()` already passed (no cycles, no forward references).
    ///
    /// `pre_satisfied` step ids are treated as already resolved — they are
    /// not walked themselves (a caller has handled them some other way, e.g.
    /// delegated to a mini-agent) but dependents waiting on them are still
    /// unblocked.
    fn levels(plan: &Plan, pre_satisfied: &HashSet<String>) -> Vec<Vec<Step>> {
        let mut remaining: HashMap<String, Step> = plan
            .steps
            .iter()
            .filter(|s| !pre_satisfied.contains(&s.id))
            .map(|s| (s.id.clone(), s.clone()))
            .collect();
        let mut done: HashSet<String> = pre_satisfied.clone();
        let mut levels = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<String> = remaining
                .values()
                .filter(|s| s.depends_on.iter().all(|d| done.contains(d)))
                .map(|s| s.id.clone())
                .collect();
            if ready.is_empty() {
                // Shouldn't happen for a validated DAG; drain the rest as a
                // final level rather than looping forever.
                levels.push(remaining.values().cloned().collect());
                break;
            }
            let mut level = Vec::new();
            for id in &ready {
                if let Some(step) = remaining.remove(id) {
                    level.push(step);
                }
            }
            for step in &level {
                done.insert(step.id.clone());
            }
            levels.push(level);
        }
        levels
    }

    pub async fn execute(&self, plan: &Plan, agent_id: &str) -> ExecutionResult {
        self.execute_excluding(plan, agent_id, &HashSet::new()).await
    }

    /// Like `execute`, but steps whose id is in `exclude` are skipped
    /// entirely — used when a caller has already handed those steps to a
    /// mini-agent and only wants the Executor to cover what's left.
    pub async fn execute_excluding(&self, plan: &Plan, agent_id: &str, exclude: &HashSet<String>) -> ExecutionResult {
        if let Some(response) = &plan.direct_response {
            return ExecutionResult { step_results: Vec::new(), overall_success: true, response: Some(response.clone()) };
        }

        let levels = Self::levels(plan, exclude);
        let mut outputs: HashMap<String, Value> = HashMap::new();
        let mut failed_upstream: HashMap<String, String> = HashMap::new();
        let mut results = Vec::new();
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));

        for level in levels {
            let mut joinset: JoinSet<StepResult> = JoinSet::new();

            for step in level {
                if let Some(upstream) = step.depends_on.iter().find_map(|d| failed_upstream.get(d).cloned()) {
                    results.push(StepResult { step_id: step.id.clone(), outcome: StepOutcome::Skipped { upstream: upstream.clone() } });
                    failed_upstream.insert(step.id.clone(), upstream);
                    continue;
                }

                let input = compose_input(&step, &outputs);
                let tools = self.tools.clone();
                let approval = self.approval.clone();
                let events = self.events.clone();
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                let agent_id = agent_id.to_string();
                let timeout = self.step_timeout;

                joinset.spawn(async move {
                    let _permit = permit;
                    let outcome = run_step(&step, input, &tools, &approval, &events, &agent_id, timeout).await;
                    StepResult { step_id: step.id.clone(), outcome }
                });
            }

            while let Some(joined) = joinset.join_next().await {
                let result = joined.expect("step task panicked");
                match &result.outcome {
                    StepOutcome::Success(v) => {
                        outputs.insert(result.step_id.clone(), v.clone());
                    }
                    StepOutcome::Failed(_) => {
                        failed_upstream.insert(result.step_id.clone(), result.step_id.clone());
                    }
                    StepOutcome::Skipped { upstream } => {
                        failed_upstream.insert(result.step_id.clone(), upstream.clone());
                    }
                }
                results.push(result);
            }
        }

        let overall_success = results.iter().all(|r| matches!(r.outcome, StepOutcome::Success(_)));
        ExecutionResult { step_results: results, overall_success, response: None }
    }
}

fn compose_input(step: &Step, outputs: &HashMap<String, Value>) -> Value {
    let mut input = step.args.clone();
    if !step.depends_on.is_empty() {
        let mut deps = serde_json::Map::new();
        for dep in &step.depends_on {
            if let Some(v) = outputs.get(dep) {
                deps.insert(dep.clone(), v.clone());
            }
        }
        if let Value::Object(map) = &mut input {
            map.insert("_depends_on".to_string(), Value::Object(deps));
        }
    }
    input
}

async fn run_step(
    step: &Step,
    input: Value,
    tools: &Arc<ToolRegistry>,
    approval: &Arc<ApprovalGate>,
    events: &Arc<EventBus>,
    agent_id: &str,
    timeout: Duration,
) -> StepOutcome {
    let Some(tool_name) = step.tool.as_deref() else {
        // Analysis steps carry no tool; treat the composed input as the result.
        return StepOutcome::Success(input);
    };

    if tools.get(tool_name).is_none() {
        return StepOutcome::Failed(format!("{}: tool '{}' not found", ErrorKind::NotFound, tool_name));
    }

    let decision = approval.approve(Some(agent_id), tool_name, &input).await;
    if !decision.approved {
        return StepOutcome::Failed(format!("denied: {}", decision.reason));
    }

    events.publish(Event {
        id: uuid::Uuid::new_v4().to_string(),
        event_type: EventType::ToolStart,
        timestamp_ms: now_ms(),
        agent_id: Some(agent_id.to_string()),
        payload: json!({ "tool": tool_name, "step": step.id }),
    });

    let cancel = tokio_util::sync::CancellationToken::new();
    let call = tools.execute_cancellable(tool_name, input, cancel);
    let result = match tokio::time::timeout(timeout, call).await {
        Ok(r) => r,
        Err(_) => {
            events.publish(Event {
                id: uuid::Uuid::new_v4().to_string(),
                event_type: EventType::ToolError,
                timestamp_ms: now_ms(),
                agent_id: Some(agent_id.to_string()),
                payload: json!({ "tool": tool_name, "step": step.id, "error": "timeout" }),
            });
            return StepOutcome::Failed(format!("step '{}' timed out", step.id));
        }
    };

    if result.is_error() {
        events.publish(Event {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: EventType::ToolError,
            timestamp_ms: now_ms(),
            agent_id: Some(agent_id.to_string()),
            payload: json!({ "tool": tool_name, "step": step.id }),
        });
        return StepOutcome::Failed(result.to_content_string());
    }

    events.publish(Event {
        id: uuid::Uuid::new_v4().to_string(),
        event_type: EventType::ToolComplete,
        timestamp_ms: now_ms(),
        agent_id: Some(agent_id.to_string()),
        payload: json!({ "tool": tool_name, "step": step.id }),
    });
    StepOutcome::Success(json!(result.to_content_string()))
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
    use crate::types::{ApprovalMode, StepKind};

    fn executor() -> Executor {
        let events = Arc::new(EventBus::default());
        Executor::new(
            Arc::new(ToolRegistry::new()),
            Arc::new(ApprovalGate::new(ApprovalMode::Default, events.clone())),
            events,
            4,
        )
    }

    fn step(id: &str, kind: StepKind, tool: Option<&str>, deps: &[&str]) -> Step {
        Step {
            id: id.to_string(),
            description: String::new(),
            tool: tool.map(String::from),
            args: json!({}),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            kind,
        }
    }

    #[tokio::test]
    async fn analysis_only_plan_succeeds_without_tools() {
        let plan = Plan {
            steps: vec![step("s1", StepKind::Analysis, None, &[])],
            direct_response: None,
        };
        let result = executor().execute(&plan, "main").await;
        assert!(result.overall_success);
        assert_eq!(result.step_results.len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_fails_and_skips_dependents() {
        let plan = Plan {
            steps: vec![
                step("s1", StepKind::Command, Some("nonexistent"), &[]),
                step("s2", StepKind::Analysis, None, &["s1"]),
            ],
            direct_response: None,
        };
        let result = executor().execute(&plan, "main").await;
        assert!(!result.overall_success);
        let s1 = result.step_results.iter().find(|r| r.step_id == "s1").unwrap();
        match &s1.outcome {
            StepOutcome::Failed(msg) => assert!(msg.contains("not_found"), "expected not_found tag, got: {msg}"),
            other => panic!("expected Failed, got {other:?}"),
        }
        let s2 = result.step_results.iter().find(|r| r.step_id == "s2").unwrap();
        assert!(matches!(s2.outcome, StepOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_fails_before_approval_is_consulted() {
        let events = Arc::new(EventBus::default());
        let approval = Arc::new(ApprovalGate::new(ApprovalMode::Yolo, events.clone()));
        let executor = Executor::new(Arc::new(ToolRegistry::new()), approval, events.clone(), 4);
        let plan = Plan {
            steps: vec![step("s1", StepKind::Command, Some("nonexistent"), &[])],
            direct_response: None,
        };
        let result = executor.execute(&plan, "main").await;
        assert!(!result.overall_success);
        // A not_found short-circuit never reaches approve(), so no
        // ApprovalPending/ApprovalComplete pair should have been published.
        assert_eq!(events.count(EventType::ApprovalPending), 0);
        assert_eq!(events.count(EventType::ApprovalComplete), 0);
    }

    #[tokio::test]
    async fn conversational_plan_short_circuits_to_response() {
        let plan = Plan::conversational("hi there");
        let result = executor().execute(&plan, "main").await;
        assert_eq!(result.response.as_deref(), Some("hi there"));
        assert!(result.step_results.is_empty());
    }

    #[tokio::test]
    async fn independent_steps_both_run_in_one_level() {
        let plan = Plan {
            steps: vec![
                step("s1", StepKind::Analysis, None, &[]),
                step("s2", StepKind::Analysis, None, &[]),
            ],
            direct_response: None,
        };
        let result = executor().execute(&plan, "main").await;
        assert!(result.overall_success);
        assert_eq!(result.step_results.len(), 2);
    }
}
