//! Orchestrator / Trio Coordinator (C9) — selects an execution strategy
//! from the Planner's score, runs the Plan through the Executor and/or
//! Agent Spawner accordingly, and aggregates the outcome.

use crate::context::{MemoryScoper, ScopedContext};
use crate::executor::{ExecutionResult, Executor, StepOutcome};
use crate::planner::{self, PlanBuilder};
use crate::spawner::{AgentSpawner, SpawnOutcome};
use crate::types::{MiniAgentTask, Permissions, Plan, PlanScore, Step, StepKind, Strategy, TaskPriority};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

const GROUP_SIZE_CAP: usize = 5;
const DEFAULT_MAX_DELEGATED_GROUPS: usize = 2;
const MINI_AGENT_MAX_ITERATIONS: usize = 5;
const MINI_AGENT_TIMEOUT_MS: u64 = 300_000;

/// Tools every mini-agent of a given task type may use regardless of which
/// steps literally named them, mirroring the registry's "if it isn't
/// registered, the LLM never sees it" pattern at the per-task level.
fn common_tools_for(task_type: &str) -> &'static [&'static str] {
    match task_type {
        "file" => &["read", "glob"],
        "command" => &["bash"],
        "search" => &["grep", "glob"],
        "edit" => &["read", "edit"],
        "analysis" => &["read"],
        _ => &[],
    }
}

/// Tools a mini-agent never gets unless its own steps explicitly call for
/// them — destructive by default, so a task scoped to e.g. "search" can't
/// accidentally pick up shell or write access from a shared allow-list.
const DANGEROUS_TOOLS: &[&str] = &["bash", "write"];

pub fn select_strategy(score: PlanScore) -> Strategy {
    if score.complexity >= 7.0 && score.parallelizability > 0.8 {
        Strategy::MiniAgentsOnly
    } else if score.complexity >= 4.0 && score.parallelizability > 0.5 {
        Strategy::Hybrid
    } else if score.complexity >= 2.0 && score.parallelizability > 0.3 {
        Strategy::MainWithDelegation
    } else {
        Strategy::MainOnly
    }
}

fn task_type_of(kind: StepKind) -> &'static str {
    match kind {
        StepKind::File => "file",
        StepKind::Command => "command",
        StepKind::Search => "search",
        StepKind::Edit => "edit",
        StepKind::Analysis => "analysis",
        StepKind::General => "general",
    }
}

/// Group steps in plan order: start a new group whenever the inferred task
/// type changes or the current group reaches `GROUP_SIZE_CAP`.
pub fn group_steps(plan: &Plan) -> Vec<Vec<Step>> {
    let mut groups: Vec<Vec<Step>> = Vec::new();
    let mut current: Vec<Step> = Vec::new();
    let mut current_type: Option<&'static str> = None;

    for step in &plan.steps {
        let ty = task_type_of(step.kind);
        let starts_new = match current_type {
            None => false,
            Some(t) => t != ty || current.len() >= GROUP_SIZE_CAP,
        };
        if starts_new {
            groups.push(std::mem::take(&mut current));
        }
        current_type = Some(ty);
        current.push(step.clone());
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn group_to_task(group: &[Step], parent_id: Option<&str>, index: usize) -> MiniAgentTask {
    let task_type = group.first().map(|s| task_type_of(s.kind)).unwrap_or("general").to_string();
    let prompt = group.iter().map(|s| s.description.clone()).collect::<Vec<_>>().join("\n");
    let mut allowed_tools: Vec<String> = group.iter().filter_map(|s| s.tool.clone()).collect();
    allowed_tools.extend(common_tools_for(&task_type).iter().map(|t| t.to_string()));
    allowed_tools.sort();
    allowed_tools.dedup();

    let restricted_tools: Vec<String> = DANGEROUS_TOOLS
        .iter()
        .filter(|t| !allowed_tools.iter().any(|a| a == *t))
        .map(|t| t.to_string())
        .collect();

    MiniAgentTask {
        id: format!("group-{index}"),
        task_type,
        prompt,
        allowed_tools,
        restricted_tools,
        max_iterations: MINI_AGENT_MAX_ITERATIONS,
        timeout_ms: MINI_AGENT_TIMEOUT_MS,
        priority: TaskPriority::Normal,
        parent_id: parent_id.map(String::from),
        metadata: serde_json::json!({}),
    }
}

#[derive(Clone, Debug, Default)]
pub struct Aggregated {
    pub success_count: u64,
    pub failure_count: u64,
    pub total_tokens: u64,
    pub wall_time_ms: u64,
    pub per_agent: HashMap<String, String>,
    pub summary: String,
}

#[derive(Clone, Debug)]
pub struct CoordinatorResult {
    pub response: String,
    pub strategy: Strategy,
    pub score: PlanScore,
    pub aggregated: Aggregated,
}

pub struct Coordinator {
    planner: Arc<dyn PlanBuilder>,
    executor: Arc<Executor>,
    spawner: Arc<AgentSpawner>,
    memory: Arc<MemoryScoper>,
    fallback_to_main: bool,
}

impl Coordinator {
    pub fn new(
        planner: Arc<dyn PlanBuilder>,
        executor: Arc<Executor>,
        spawner: Arc<AgentSpawner>,
        memory: Arc<MemoryScoper>,
        fallback_to_main: bool,
    ) -> Self {
        Self { planner, executor, spawner, memory, fallback_to_main }
    }

    pub async fn execute(&self, request: &str, session_id: &str, permissions: Permissions) -> Result<CoordinatorResult, String> {
        let start = Instant::now();
        let plan = self.planner.build(request).await?;

        if let Some(response) = plan.direct_response.clone() {
            return Ok(CoordinatorResult {
                response,
                strategy: Strategy::MainOnly,
                score: PlanScore { complexity: 0.0, parallelizability: 0.0 },
                aggregated: Aggregated::default(),
            });
        }

        planner::validate_contract(&plan)?;
        let score = planner::score(&plan);
        let strategy = select_strategy(score);

        let mut aggregated = match strategy {
            Strategy::MainOnly => self.run_main_only(&plan, session_id).await,
            Strategy::MainWithDelegation => self.run_with_delegation(&plan, session_id, &permissions).await,
            Strategy::Hybrid => self.run_hybrid(&plan, session_id, &permissions).await,
            Strategy::MiniAgentsOnly => self.run_mini_agents_only(&plan, session_id, &permissions).await,
        };

        if strategy != Strategy::MainOnly && aggregated.failure_count > 0 && self.fallback_to_main {
            let retried = self.run_main_only(&plan, session_id).await;
            aggregated = retried;
            aggregated.summary = format!("{} (fell back to main_only after mini-agent failure)", aggregated.summary);
        }

        aggregated.wall_time_ms = start.elapsed().as_millis() as u64;
        Ok(CoordinatorResult { response: aggregated.summary.clone(), strategy, score, aggregated })
    }

    async fn run_main_only(&self, plan: &Plan, session_id: &str) -> Aggregated {
        let result = self.executor.execute(plan, session_id).await;
        aggregate_execution(&result)
    }

    /// Runs the plan through the Executor, but with the steps belonging to
    /// up to `DEFAULT_MAX_DELEGATED_GROUPS` step-groups carved out and handed
    /// to mini-agents instead — each step runs exactly once, either in the
    /// Executor pass or inside its delegate, never both.
    async fn run_with_delegation(&self, plan: &Plan, session_id: &str, permissions: &Permissions) -> Aggregated {
        let groups = group_steps(plan);
        let delegate_count = groups.len().min(DEFAULT_MAX_DELEGATED_GROUPS);
        let delegated_groups = &groups[..delegate_count];
        let excluded: HashSet<String> = delegated_groups
            .iter()
            .flat_map(|g| g.iter().map(|s| s.id.clone()))
            .collect();

        let main_result = self.executor.execute_excluding(plan, session_id, &excluded).await;
        let mut agg = aggregate_execution(&main_result);

        for (i, group) in delegated_groups.iter().enumerate() {
            let task = group_to_task(group, Some(session_id), i);
            let scoped = self.scoped_context(session_id, group);
            let agent_id = format!("{session_id}-delegate-{i}");
            let outcome = self.spawner.spawn(&agent_id, &task, permissions.clone(), scoped).await;
            record_spawn_outcome(&mut agg, agent_id, outcome);
        }
        agg.summary = format!("main_with_delegation: {} delegated group(s), {}", delegated_groups.len(), agg.summary);
        agg
    }

    /// Runs every independent step-group through a mini-agent in parallel,
    /// then synthesizes over only the remaining (dependent) steps — the
    /// independent groups are never re-run through the Executor.
    async fn run_hybrid(&self, plan: &Plan, session_id: &str, permissions: &Permissions) -> Aggregated {
        let groups: Vec<Vec<Step>> = group_steps(plan).into_iter().filter(|g| g.iter().all(|s| s.is_independent())).collect();
        let excluded: HashSet<String> = groups.iter().flat_map(|g| g.iter().map(|s| s.id.clone())).collect();

        let mut handles = Vec::new();
        for (i, group) in groups.iter().enumerate() {
            let task = group_to_task(group, Some(session_id), i);
            let scoped = self.scoped_context(session_id, group);
            let agent_id = format!("{session_id}-hybrid-{i}");
            let spawner = self.spawner.clone();
            let permissions = permissions.clone();
            handles.push(async move {
                let outcome = spawner.spawn(&agent_id, &task, permissions, scoped).await;
                (agent_id, outcome)
            });
        }
        // Independent groups run concurrently; each spawn() call is itself
        // bounded by the spawner's maxConcurrentAgents semaphore.
        let spawn_results = futures::future::join_all(handles).await;

        let mut agg = Aggregated::default();
        for (agent_id, outcome) in spawn_results {
            record_spawn_outcome(&mut agg, agent_id, outcome);
        }

        let synthesis = self.executor.execute_excluding(plan, session_id, &excluded).await;
        let exec_agg = aggregate_execution(&synthesis);
        agg.success_count += exec_agg.success_count;
        agg.failure_count += exec_agg.failure_count;
        agg.summary = format!("hybrid: {} mini-agent group(s), synthesis {}", groups.len(), exec_agg.summary);
        agg
    }

    async fn run_mini_agents_only(&self, plan: &Plan, session_id: &str, permissions: &Permissions) -> Aggregated {
        let groups = group_steps(plan);
        let mut agg = Aggregated::default();

        let mut handles = Vec::new();
        for (i, group) in groups.iter().enumerate() {
            let task = group_to_task(group, Some(session_id), i);
            let scoped = self.scoped_context(session_id, group);
            let agent_id = format!("{session_id}-mini-{i}");
            let spawner = self.spawner.clone();
            let permissions = permissions.clone();
            handles.push(async move {
                let outcome = spawner.spawn(&task.id.clone(), &task, permissions, scoped).await;
                (agent_id, outcome)
            });
        }
        // sequential-safe fallback kept simple: spawn() itself is Semaphore-bounded,
        // so launching all futures concurrently respects maxConcurrentAgents.
        let results = futures::future::join_all(handles).await;
        for (agent_id, outcome) in results {
            record_spawn_outcome(&mut agg, agent_id, outcome);
        }
        agg.summary = format!(
            "mini_agents_only: {} succeeded, {} failed across {} group(s)",
            agg.success_count,
            agg.failure_count,
            groups.len()
        );
        agg
    }

    fn scoped_context(&self, session_id: &str, group: &[Step]) -> ScopedContext {
        let files: Vec<String> = group
            .iter()
            .filter_map(|s| s.args.get("file_path").or_else(|| s.args.get("path")))
            .filter_map(|v| v.as_str().map(String::from))
            .collect();
        let ctx = self.memory.assemble("", Vec::new(), Vec::new(), Vec::new());
        self.memory.scope_for_agent(session_id, files, Vec::new(), &ctx, 8000)
    }
}

fn record_spawn_outcome(agg: &mut Aggregated, agent_id: String, outcome: Result<SpawnOutcome, String>) {
    match outcome {
        Ok(SpawnOutcome::Completed { tokens_used, .. }) => {
            agg.success_count += 1;
            agg.total_tokens += tokens_used;
            agg.per_agent.insert(agent_id, "completed".to_string());
        }
        Ok(SpawnOutcome::Failed { reason }) => {
            agg.failure_count += 1;
            agg.per_agent.insert(agent_id, format!("failed: {reason}"));
        }
        Ok(SpawnOutcome::Cancelled) => {
            agg.failure_count += 1;
            agg.per_agent.insert(agent_id, "cancelled".to_string());
        }
        Err(reason) => {
            agg.failure_count += 1;
            agg.per_agent.insert(agent_id, format!("rejected: {reason}"));
        }
    }
}

fn aggregate_execution(result: &ExecutionResult) -> Aggregated {
    let mut agg = Aggregated::default();
    for step in &result.step_results {
        match step.outcome {
            StepOutcome::Success(_) => agg.success_count += 1,
            StepOutcome::Failed(_) | StepOutcome::Skipped { .. } => agg.failure_count += 1,
        }
    }
    agg.summary = result.response.clone().unwrap_or_else(|| {
        format!("main_only: {} succeeded, {} failed", agg.success_count, agg.failure_count)
    });
    agg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strategy_thresholds_match_spec_table() {
        assert_eq!(select_strategy(PlanScore { complexity: 7.0, parallelizability: 0.9 }), Strategy::MiniAgentsOnly);
        assert_eq!(select_strategy(PlanScore { complexity: 4.0, parallelizability: 0.6 }), Strategy::Hybrid);
        assert_eq!(select_strategy(PlanScore { complexity: 2.0, parallelizability: 0.4 }), Strategy::MainWithDelegation);
        assert_eq!(select_strategy(PlanScore { complexity: 1.0, parallelizability: 0.1 }), Strategy::MainOnly);
    }

    fn step(id: &str, kind: StepKind) -> Step {
        Step { id: id.to_string(), description: id.to_string(), tool: None, args: json!({}), depends_on: vec![], kind }
    }

    #[test]
    fn grouping_breaks_on_task_type_change() {
        let plan = Plan {
            steps: vec![
                step("s1", StepKind::File),
                step("s2", StepKind::File),
                step("s3", StepKind::Command),
            ],
            direct_response: None,
        };
        let groups = group_steps(&plan);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 1);
    }

    #[test]
    fn grouping_caps_group_size() {
        let steps: Vec<Step> = (0..12).map(|i| step(&format!("s{i}"), StepKind::Analysis)).collect();
        let plan = Plan { steps, direct_response: None };
        let groups = group_steps(&plan);
        assert!(groups.iter().all(|g| g.len() <= GROUP_SIZE_CAP));
        assert_eq!(groups.len(), 3);
    }
}
