//! Planner (C7) — structural validation and deterministic scoring over a
//! Plan. Plan *production* is LLM-driven and out of scope here (the Planner
//! trait below is the seam an LLM-backed implementation plugs into); this
//! module owns the purely structural contract: conversational shortcuts,
//! validation, and the complexity/parallelizability formulas.

use crate::types::{Plan, PlanScore, Step, StepKind};
use async_trait::async_trait;
use std::collections::HashSet;

/// Phrases short enough and free of action verbs that the Orchestrator
/// should short-circuit straight to a direct response instead of planning.
const CONVERSATIONAL_HINTS: &[&str] = &[
    "hello", "hi", "hey", "thanks", "thank you", "good morning", "good night", "how are you",
];

pub fn is_conversational_shortcut(request: &str) -> bool {
    let trimmed = request.trim().to_lowercase();
    if trimmed.len() > 40 {
        return false;
    }
    CONVERSATIONAL_HINTS.iter().any(|hint| trimmed == *hint || trimmed.starts_with(hint))
}

/// Produces a Plan from a free-form request plus whatever context the
/// caller supplies. The LLM-backed production implementation lives outside
/// this crate; anything satisfying this trait can stand in for it (tests
/// use a scripted implementation below).
#[async_trait]
pub trait PlanBuilder: Send + Sync {
    async fn build(&self, request: &str) -> Result<Plan, String>;
}

/// Computes `complexity` and `parallelizability` over an already-produced
/// Plan. `complexity` is capped at 10; a plan containing any step whose
/// `depends_on` is non-empty counts as "nested" for the purpose of the
/// formula's `+1` term.
pub fn score(plan: &Plan) -> PlanScore {
    if plan.is_degenerate() {
        return PlanScore { complexity: 0.0, parallelizability: 0.0 };
    }

    let step_count = plan.steps.len();
    let distinct_tools: HashSet<&str> = plan
        .steps
        .iter()
        .filter_map(|s| s.tool.as_deref())
        .collect();
    let nested = plan.steps.iter().any(|s| !s.depends_on.is_empty());
    let has_file_ops = plan.steps.iter().any(|s| s.kind == StepKind::File || s.kind == StepKind::Edit);

    let complexity = (0.5 * step_count as f64
        + 0.3 * distinct_tools.len() as f64
        + if nested { 1.0 } else { 0.0 }
        + if has_file_ops { 0.5 } else { 0.0 })
    .min(10.0);

    let independent = plan.steps.iter().filter(|s| s.is_independent()).count();
    let parallelizability = independent as f64 / step_count.max(1) as f64;

    PlanScore { complexity, parallelizability }
}

/// Validate the structural contract beyond DAG-acyclicity (already checked
/// by `Plan::validate`): every non-analysis step names a tool, every
/// file-writing step names an explicit path, every command step names an
/// explicit command.
pub fn validate_contract(plan: &Plan) -> Result<(), String> {
    plan.validate()?;
    for step in &plan.steps {
        if step.kind != StepKind::Analysis && step.tool.is_none() {
            return Err(format!("step '{}' has kind {:?} but names no tool", step.id, step.kind));
        }
        match step.kind {
            StepKind::File | StepKind::Edit => {
                let has_path = step.args.get("file_path").or_else(|| step.args.get("path")).is_some();
                if !has_path {
                    return Err(format!("step '{}' writes a file but declares no target path", step.id));
                }
            }
            StepKind::Command => {
                if step.args.get("command").is_none() {
                    return Err(format!("step '{}' is a command step but declares no command", step.id));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Minimal structural planner for requests that need no LLM: a single
/// analysis step that echoes the request back as a direct response. Useful
/// as a fallback when no `PlanBuilder` is configured, and in tests.
pub struct EchoPlanner;

#[async_trait]
impl PlanBuilder for EchoPlanner {
    async fn build(&self, request: &str) -> Result<Plan, String> {
        if is_conversational_shortcut(request) {
            return Ok(Plan::conversational(format!("Hello! How can I help with: {request}")));
        }
        Ok(Plan {
            steps: vec![Step {
                id: "s1".to_string(),
                description: request.to_string(),
                tool: None,
                args: serde_json::json!({}),
                depends_on: vec![],
                kind: StepKind::Analysis,
            }],
            direct_response: None,
        })
    }
}
