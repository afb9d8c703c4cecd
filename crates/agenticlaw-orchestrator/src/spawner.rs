//! Agent Spawner — creates mini-agents and drives each one's inner
//! reasoning loop, structurally mirroring the teacher's `AgentRuntime`
//! turn loop but scoped to a single `MiniAgentTask` and gated through the
//! Approval Gate and Permission Manager on every tool call.

use crate::approval::ApprovalGate;
use crate::context::ScopedContext;
use crate::events::EventBus;
use crate::lifecycle::LifecycleManager;
use crate::permission::PermissionManager;
use crate::types::{Event, EventType, MiniAgentTask, Permissions};
use agenticlaw_llm::{
    AccumulatedToolCall, ContentBlock, LlmMessage, LlmProvider, LlmRequest, StreamDelta,
};
use agenticlaw_tools::ToolRegistry;
use futures::StreamExt;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-tool-call deadline inside a mini-agent's inner loop, matching the
/// Executor's default step timeout (spec's three-tier timeout model).
const TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a mini-agent run.
#[derive(Clone, Debug)]
pub enum SpawnOutcome {
    Completed { output: String, tokens_used: u64, tool_calls: u64 },
    Failed { reason: String },
    Cancelled,
}

/// Caps how many mini-agents may be `Running` at once. Spawning beyond the
/// cap is rejected immediately with no queuing at this layer — the caller
/// (Executor/Orchestrator) decides whether to retry later.
pub struct AgentSpawner {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    lifecycle: Arc<LifecycleManager>,
    permissions: Arc<PermissionManager>,
    approval: Arc<ApprovalGate>,
    events: Arc<EventBus>,
    slots: Arc<Semaphore>,
    in_flight: AtomicUsize,
    default_model: String,
}

impl AgentSpawner {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        lifecycle: Arc<LifecycleManager>,
        permissions: Arc<PermissionManager>,
        approval: Arc<ApprovalGate>,
        events: Arc<EventBus>,
        max_concurrent_agents: usize,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tools,
            lifecycle,
            permissions,
            approval,
            events,
            slots: Arc::new(Semaphore::new(max_concurrent_agents.max(1))),
            in_flight: AtomicUsize::new(0),
            default_model: default_model.into(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Spawn and run a mini-agent to completion (or failure/timeout/cancel).
    /// Returns `Err("capacity")` immediately, without registering the task
    /// anywhere, if `maxConcurrentAgents` is already saturated.
    pub async fn spawn(
        &self,
        agent_id: &str,
        task: &MiniAgentTask,
        permissions: Permissions,
        scoped: ScopedContext,
    ) -> Result<SpawnOutcome, String> {
        let permit = match self.slots.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                self.events.publish(Event {
                    id: uuid::Uuid::new_v4().to_string(),
                    event_type: EventType::SpawnRequested,
                    timestamp_ms: Self::now_ms(),
                    agent_id: Some(agent_id.to_string()),
                    payload: json!({ "error": "capacity", "task_id": task.id }),
                });
                return Err("capacity".to_string());
            }
        };
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let cancel = self.lifecycle.register(agent_id, &task.id, task.timeout_ms);
        self.permissions.register(agent_id, permissions);
        self.lifecycle.mark_running(agent_id);

        let outcome = self.run_inner_loop(agent_id, task, &scoped, cancel).await;

        self.permissions.deregister(agent_id);
        match &outcome {
            SpawnOutcome::Completed { .. } => self.lifecycle.mark_completed(agent_id),
            SpawnOutcome::Failed { reason } => self.lifecycle.mark_failed(agent_id, reason),
            SpawnOutcome::Cancelled => self.lifecycle.mark_cancelled(agent_id),
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        drop(permit);
        Ok(outcome)
    }

    async fn run_inner_loop(
        &self,
        agent_id: &str,
        task: &MiniAgentTask,
        scoped: &ScopedContext,
        cancel: CancellationToken,
    ) -> SpawnOutcome {
        let system_prompt = render_system_prompt(task, scoped);
        let mut messages = vec![LlmMessage::user(task.prompt.clone())];
        let mut total_tokens: u64 = 0;
        let mut total_tool_calls: u64 = 0;
        let mut output = String::new();

        for iteration in 1..=task.max_iterations {
            if cancel.is_cancelled() {
                return SpawnOutcome::Cancelled;
            }

            let request = LlmRequest {
                model: self.default_model.clone(),
                messages: messages.clone(),
                tools: Some(self.tools.get_definitions()),
                max_tokens: Some(4096),
                system: Some(system_prompt.clone()),
                ..Default::default()
            };

            let stream = match self.provider.complete_stream(request, Some(cancel.clone())).await {
                Ok(s) => s,
                Err(e) => return SpawnOutcome::Failed { reason: e.to_string() },
            };
            tokio::pin!(stream);

            let mut text = String::new();
            let mut tool_calls: Vec<AccumulatedToolCall> = Vec::new();
            let mut current: Option<AccumulatedToolCall> = None;
            let mut done = false;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return SpawnOutcome::Cancelled,
                    delta = stream.next() => {
                        match delta {
                            Some(Ok(StreamDelta::Text(t))) => text.push_str(&t),
                            Some(Ok(StreamDelta::Thinking(_))) => {}
                            Some(Ok(StreamDelta::ToolCallStart { id, name })) => {
                                current = Some(AccumulatedToolCall { id, name, arguments: String::new() });
                            }
                            Some(Ok(StreamDelta::ToolCallDelta { arguments, .. })) => {
                                if let Some(ref mut c) = current {
                                    c.arguments.push_str(&arguments);
                                }
                            }
                            Some(Ok(StreamDelta::ToolCallEnd { .. })) => {
                                if let Some(c) = current.take() {
                                    tool_calls.push(c);
                                }
                            }
                            Some(Ok(StreamDelta::Done { .. })) => { done = true; }
                            Some(Ok(StreamDelta::Error(e))) => return SpawnOutcome::Failed { reason: e },
                            Some(Err(e)) => return SpawnOutcome::Failed { reason: e.to_string() },
                            None => { done = true; }
                        }
                        if done { break; }
                    }
                }
            }

            total_tokens += (text.len() as u64) / 4;
            output.push_str(&text);

            if tool_calls.is_empty() {
                self.lifecycle.progress(agent_id, &format!("iteration {iteration}: final response"));
                return SpawnOutcome::Completed { output, tokens_used: total_tokens, tool_calls: total_tool_calls };
            }

            let blocks: Vec<ContentBlock> = tool_calls
                .iter()
                .map(|tc| ContentBlock::ToolUse {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: tc.parse_arguments().unwrap_or_default(),
                })
                .collect();
            messages.push(LlmMessage::assistant_with_blocks(
                if text.is_empty() { None } else { Some(text.clone()) },
                blocks,
            ));

            let mut results = Vec::new();
            for tc in tool_calls {
                if cancel.is_cancelled() {
                    return SpawnOutcome::Cancelled;
                }
                let args = tc.parse_arguments().unwrap_or_default();

                let decision = self.approval.approve(Some(agent_id), &tc.name, &args).await;
                if !decision.approved {
                    results.push((tc.id.clone(), format!("denied: {}", decision.reason), true));
                    continue;
                }
                if let Err(reason) = self.permissions.check_and_record(agent_id, &tc.name) {
                    results.push((tc.id.clone(), format!("denied: {reason}"), true));
                    continue;
                }

                self.events.publish(Event {
                    id: uuid::Uuid::new_v4().to_string(),
                    event_type: EventType::ToolStart,
                    timestamp_ms: Self::now_ms(),
                    agent_id: Some(agent_id.to_string()),
                    payload: json!({ "tool": tc.name }),
                });
                let call = self.tools.execute_cancellable(&tc.name, args, cancel.clone());
                let result = match tokio::time::timeout(TOOL_CALL_TIMEOUT, call).await {
                    Ok(r) => r,
                    Err(_) => agenticlaw_tools::ToolResult::error(format!(
                        "tool '{}' timed out after {}s",
                        tc.name,
                        TOOL_CALL_TIMEOUT.as_secs()
                    )),
                };
                let is_error = result.is_error();
                self.events.publish(Event {
                    id: uuid::Uuid::new_v4().to_string(),
                    event_type: if is_error { EventType::ToolError } else { EventType::ToolComplete },
                    timestamp_ms: Self::now_ms(),
                    agent_id: Some(agent_id.to_string()),
                    payload: json!({ "tool": tc.name }),
                });

                self.lifecycle.record_tool_call(agent_id);
                total_tool_calls += 1;
                results.push((tc.id.clone(), result.to_content_string(), is_error));
            }

            for (id, content, is_error) in results {
                messages.push(LlmMessage::tool_result(&id, content, is_error));
            }

            self.lifecycle.progress(agent_id, &format!("iteration {iteration}: executed tools"));
        }

        warn!(agent = agent_id, "max iterations exhausted without a final response");
        SpawnOutcome::Failed { reason: "max_iterations exceeded".to_string() }
    }
}

fn render_system_prompt(task: &MiniAgentTask, scoped: &ScopedContext) -> String {
    let mut prompt = format!("You are a mini-agent handling task type '{}'.\n", task.task_type);
    if !scoped.relevant_files.is_empty() {
        prompt.push_str(&format!("Relevant files: {}\n", scoped.relevant_files.join(", ")));
    }
    if !scoped.domain_knowledge.is_empty() {
        prompt.push_str("Known facts:\n");
        for fact in &scoped.domain_knowledge {
            prompt.push_str(&format!("- {fact}\n"));
        }
    }
    if !scoped.parent_context.is_empty() {
        prompt.push_str(&format!("\nContext from the parent turn:\n{}\n", scoped.parent_context));
    }
    debug!(task = %task.id, "rendered mini-agent system prompt");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MemoryScoper;
    use crate::types::{SecurityMode, TaskPriority};
    use agenticlaw_llm::{LlmError, LlmResult, LlmStream};
    use async_trait::async_trait;
    use futures::stream;

    struct StubProvider;

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        fn models(&self) -> &[&str] {
            &["stub-model"]
        }
        async fn complete_stream(&self, _request: LlmRequest, _cancel: Option<CancellationToken>) -> LlmResult<LlmStream> {
            let deltas = vec![
                Ok(StreamDelta::Text("done".to_string())),
                Ok(StreamDelta::Done { stop_reason: Some("end_turn".to_string()), usage: None }),
            ];
            Ok(Box::pin(stream::iter(deltas)))
        }
    }

    fn task() -> MiniAgentTask {
        MiniAgentTask {
            id: "t1".into(),
            task_type: "analysis".into(),
            prompt: "summarize".into(),
            allowed_tools: vec![],
            restricted_tools: vec![],
            max_iterations: 3,
            timeout_ms: 30_000,
            priority: TaskPriority::Normal,
            parent_id: None,
            metadata: json!({}),
        }
    }

    fn scoped() -> ScopedContext {
        let scoper = MemoryScoper::default();
        let ctx = scoper.assemble("q", vec![], vec![], vec![]);
        scoper.scope_for_agent("s1", vec![], vec![], &ctx, 1000)
    }

    #[tokio::test]
    async fn completes_when_model_returns_no_tool_calls() {
        let events = Arc::new(EventBus::default());
        let spawner = AgentSpawner::new(
            Arc::new(StubProvider),
            Arc::new(ToolRegistry::new()),
            Arc::new(LifecycleManager::new(events.clone())),
            Arc::new(PermissionManager::new()),
            Arc::new(ApprovalGate::new(crate::types::ApprovalMode::Default, events.clone())),
            events,
            4,
            "stub-model",
        );
        let outcome = spawner
            .spawn("a1", &task(), SecurityMode::Default.defaults(), scoped())
            .await
            .unwrap();
        assert!(matches!(outcome, SpawnOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn rejects_spawn_beyond_capacity() {
        let events = Arc::new(EventBus::default());
        let spawner = Arc::new(AgentSpawner::new(
            Arc::new(StubProvider),
            Arc::new(ToolRegistry::new()),
            Arc::new(LifecycleManager::new(events.clone())),
            Arc::new(PermissionManager::new()),
            Arc::new(ApprovalGate::new(crate::types::ApprovalMode::Default, events.clone())),
            events,
            1,
            "stub-model",
        ));
        let _permit = spawner.slots.clone().try_acquire_owned().unwrap();
        let err = spawner
            .spawn("a2", &task(), SecurityMode::Default.defaults(), scoped())
            .await
            .unwrap_err();
        assert_eq!(err, "capacity");
    }
}
