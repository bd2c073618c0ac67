//! Orchestrator: executes exactly one step of the agent loop.
//!
//! A step builds the prompt from the recent history window, optionally runs
//! a reasoning pass, asks the model for a decision and acts on it. Every
//! outcome the model should learn from lands in `state.turns`; only caller
//! cancellation is returned as an error.

use chrono::Utc;
use ponder_config::{AgentConfig, ReasoningMode};
use ponder_core::decision::{ActionInput, ModelMessage, ToolCallRequest};
use ponder_core::event::{AgentEvent, EventSink, NoopEventSink};
use ponder_core::state::{AgentState, AgentTurn, ToolCallRecord};
use ponder_core::tool::{ToolExecutionResult, ToolParams, ToolRegistry};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::AgentError;
use crate::llm_communicator::LlmCommunicator;
use crate::loop_detector::LoopDetector;
use crate::prompts;
use crate::reasoning::{ReasoningManager, ReasoningResult};
use crate::tool_executor::ToolExecutor;

/// Tool name recorded for a turn that ran several calls.
pub const MULTI_TOOL_CALL: &str = "multi_tool_call";

/// What the outer loop should do after a step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentStepResult {
    pub continue_loop: bool,
    pub final_output: Option<String>,
    pub error: Option<String>,
}

impl AgentStepResult {
    pub fn proceed() -> Self {
        Self {
            continue_loop: true,
            ..Self::default()
        }
    }

    pub fn finished(final_output: impl Into<String>) -> Self {
        Self {
            continue_loop: false,
            final_output: Some(final_output.into()),
            error: None,
        }
    }

    pub fn stopped(error: impl Into<String>) -> Self {
        Self {
            continue_loop: false,
            final_output: None,
            error: Some(error.into()),
        }
    }
}

pub struct Orchestrator {
    communicator: Arc<LlmCommunicator>,
    executor: ToolExecutor,
    loop_detector: LoopDetector,
    reasoning: ReasoningManager,
    history_window: usize,
    function_calling: bool,
    events: Arc<dyn EventSink>,
}

impl Orchestrator {
    pub fn new(
        communicator: Arc<LlmCommunicator>,
        executor: ToolExecutor,
        loop_detector: LoopDetector,
        reasoning: ReasoningManager,
        config: &AgentConfig,
    ) -> Self {
        Self {
            communicator,
            executor,
            loop_detector,
            reasoning,
            history_window: config.history_window.max(1),
            function_calling: config.function_calling,
            events: Arc::new(NoopEventSink),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn loop_detector(&self) -> &LoopDetector {
        &self.loop_detector
    }

    /// Run one step, appending at most one turn to `state`.
    pub async fn execute_step(
        &self,
        state: &mut AgentState,
        tools: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> Result<AgentStepResult, AgentError> {
        let turn_index = state.next_turn_index();
        let turn_id = AgentTurn::new_id();

        match self.run_step(state, tools, turn_index, &turn_id, cancel).await {
            Ok(result) => Ok(result),
            Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => {
                error!(agent_id = %state.agent_id, turn_index, error = %e, "Step failed");
                let message = format!("Step failed: {e}");
                state.push_error_turn(turn_id, message.clone());
                Ok(AgentStepResult::stopped(message))
            }
        }
    }

    async fn run_step(
        &self,
        state: &mut AgentState,
        tools: &ToolRegistry,
        turn_index: usize,
        turn_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentStepResult, AgentError> {
        let agent_id = state.agent_id.clone();
        let definitions = tools.definitions();

        let reasoning = self.reason(state, tools, turn_index, cancel).await?;
        let messages = prompts::decision_messages(
            &state.goal,
            &definitions,
            state.recent_turns(self.history_window),
            reasoning.as_ref().map(ReasoningResult::prompt_note).as_deref(),
        );

        let decision = if self.function_calling {
            self.communicator
                .call_and_normalize(messages, definitions, &agent_id, turn_index, turn_id, state, cancel)
                .await?
        } else {
            self.communicator
                .call_and_parse(messages, &agent_id, turn_index, turn_id, state, cancel)
                .await?
        };

        // The failure is already recorded; let the next turn retry
        let Some(mut decision) = decision else {
            return Ok(AgentStepResult::proceed());
        };

        if let Some(r) = &reasoning {
            if decision.reasoning_confidence.is_none() {
                decision.reasoning_confidence = Some(r.confidence);
            }
            if decision.conclusion.is_none() {
                decision.conclusion = Some(r.conclusion.clone());
            }
        }
        self.publish_status(&agent_id, &decision);

        debug!(
            agent_id = %agent_id,
            turn_index,
            action = %decision.action,
            "Decision received"
        );

        match decision.action_input.clone() {
            ActionInput::Finish { final_output } => {
                info!(agent_id = %agent_id, turn_index, "Agent finished");
                state.push_turn(turn_id.to_string(), Some(decision), None, None);
                Ok(AgentStepResult::finished(final_output))
            }
            ActionInput::Summary { .. } => {
                state.push_turn(turn_id.to_string(), Some(decision), None, None);
                Ok(AgentStepResult::proceed())
            }
            ActionInput::ToolCall(call) => {
                let run = self
                    .run_tool(&call, tools, &agent_id, turn_index, cancel)
                    .await?;
                state.push_turn(
                    turn_id.to_string(),
                    Some(decision),
                    Some(ToolCallRecord {
                        tool: call.tool.clone(),
                        params: call.params.clone(),
                    }),
                    Some(run.result.clone()),
                );
                self.record_outcomes(&agent_id, std::slice::from_ref(&call), std::slice::from_ref(&run));
                Ok(AgentStepResult::proceed())
            }
            ActionInput::MultiToolCall { calls } => {
                let mut runs = Vec::with_capacity(calls.len());
                for call in &calls {
                    let run = self
                        .run_tool(call, tools, &agent_id, turn_index, cancel)
                        .await?;
                    runs.push(run);
                }
                let results: Vec<ToolExecutionResult> = runs.iter().map(|r| r.result.clone()).collect();
                let (record, combined) = combine_results(&calls, &results);
                state.push_turn(turn_id.to_string(), Some(decision), Some(record), Some(combined));
                self.record_outcomes(&agent_id, &calls, &runs);
                Ok(AgentStepResult::proceed())
            }
        }
    }

    /// The optional reasoning pass. Failures other than cancellation are
    /// logged and skipped.
    async fn reason(
        &self,
        state: &AgentState,
        tools: &ToolRegistry,
        turn_index: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<ReasoningResult>, AgentError> {
        if self.reasoning.mode() == ReasoningMode::None {
            return Ok(None);
        }
        let context = history_context(state.recent_turns(self.history_window));
        let tool_names: Vec<String> = tools.names().into_iter().map(str::to_string).collect();

        match self
            .reasoning
            .reason(&state.goal, &context, &tool_names, &state.agent_id, turn_index, cancel)
            .await
        {
            Ok(result) => Ok(result),
            Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => {
                warn!(agent_id = %state.agent_id, turn_index, error = %e, "Reasoning failed, continuing without it");
                Ok(None)
            }
        }
    }

    /// One tool call behind the loop detector. Nothing is recorded here;
    /// outcomes reach the detector only once the turn is stored.
    async fn run_tool(
        &self,
        call: &ToolCallRequest,
        tools: &ToolRegistry,
        agent_id: &str,
        turn_index: usize,
        cancel: &CancellationToken,
    ) -> Result<ToolRun, AgentError> {
        if self
            .loop_detector
            .detect_repeated_failures(agent_id, &call.tool, &call.params)
        {
            warn!(agent_id, turn_index, tool = %call.tool, "Repeated failure detected, skipping call");
            let mut message = format!(
                "Repeated failure detected: tool '{}' has failed {} times with these parameters. Try a different approach.",
                call.tool,
                self.loop_detector.threshold()
            );
            if let Some(last) = self
                .loop_detector
                .last_failure(agent_id, &call.tool, &call.params)
            {
                message.push_str(&format!(" Last error: {last}"));
            }
            return Ok(ToolRun {
                result: ToolExecutionResult::failed(message, 0),
                executed: false,
            });
        }

        let result = self
            .executor
            .execute(&call.tool, &call.params, tools, agent_id, turn_index, cancel)
            .await?;
        Ok(ToolRun { result, executed: true })
    }

    fn record_outcomes(&self, agent_id: &str, calls: &[ToolCallRequest], runs: &[ToolRun]) {
        for (call, run) in calls.iter().zip(runs).filter(|(_, run)| run.executed) {
            self.loop_detector
                .record_tool_call(agent_id, &call.tool, &call.params, &run.result);
        }
    }

    fn publish_status(&self, agent_id: &str, decision: &ModelMessage) {
        if !decision.has_status() {
            return;
        }
        self.events.publish(AgentEvent::Status {
            agent_id: agent_id.to_string(),
            title: decision.status_title.clone(),
            details: decision.status_details.clone(),
            next_step_hint: decision.next_step_hint.clone(),
            progress_pct: decision.progress_pct,
            timestamp: Utc::now(),
        });
    }
}

/// A tool call's result, and whether the tool actually ran.
struct ToolRun {
    result: ToolExecutionResult,
    executed: bool,
}

/// Fold per-call results into the single record a turn holds.
fn combine_results(calls: &[ToolCallRequest], results: &[ToolExecutionResult]) -> (ToolCallRecord, ToolExecutionResult) {
    let mut params = ToolParams::new();
    params.insert(
        "calls".into(),
        Value::Array(
            calls
                .iter()
                .map(|c| json!({ "tool": c.tool, "params": c.params }))
                .collect(),
        ),
    );

    let outputs: Vec<Value> = calls
        .iter()
        .zip(results)
        .map(|(call, r)| {
            json!({
                "tool": call.tool,
                "success": r.success,
                "output": r.output,
                "error": r.error,
            })
        })
        .collect();
    let errors: Vec<String> = calls
        .iter()
        .zip(results)
        .filter_map(|(call, r)| r.error.as_ref().map(|e| format!("{}: {e}", call.tool)))
        .collect();
    let elapsed_ms = results.iter().map(|r| r.execution_time_ms).sum();

    let combined = if errors.is_empty() {
        ToolExecutionResult::succeeded(Value::Array(outputs), elapsed_ms)
    } else {
        ToolExecutionResult {
            output: Some(Value::Array(outputs)),
            ..ToolExecutionResult::failed(errors.join("; "), elapsed_ms)
        }
    };
    (
        ToolCallRecord {
            tool: MULTI_TOOL_CALL.into(),
            params,
        },
        combined,
    )
}

/// Short plain-text digest of recent turns for the reasoning pass.
fn history_context(turns: &[AgentTurn]) -> String {
    turns
        .iter()
        .map(|turn| {
            let action = match (&turn.tool_call, &turn.llm_message) {
                (Some(call), _) => format!("called {}", call.tool),
                (None, Some(decision)) => decision.action.to_string(),
                (None, None) => "no decision".into(),
            };
            let outcome = turn
                .tool_result
                .as_ref()
                .map(ToolExecutionResult::summary)
                .unwrap_or_default();
            format!("Turn {}: {action}. {outcome}", turn.index)
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingTool, RecordingEventSink, ScriptedLlmClient, ScriptedReply, SlowTool, StaticTool};
    use ponder_config::{ReasoningConfig, TreeConfig};
    use ponder_core::decision::AgentAction;
    use ponder_core::tool::Tool;
    use std::time::Duration;

    fn reply(value: serde_json::Value) -> ScriptedReply {
        ScriptedReply::text(&value.to_string())
    }

    fn tool_call(tool: &str) -> ScriptedReply {
        reply(json!({
            "thoughts": format!("use {tool}"),
            "action": "tool_call",
            "action_input": {"tool": tool, "params": {"x": 1}}
        }))
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::from_tools([
            Arc::new(StaticTool::new("echo", json!("pong"))) as Arc<dyn Tool>,
            Arc::new(FailingTool::new("broken", "disk on fire")),
        ])
    }

    fn orchestrator(client: Arc<ScriptedLlmClient>, reasoning: ReasoningConfig) -> Orchestrator {
        let comm = Arc::new(LlmCommunicator::new(client, Duration::from_secs(1)));
        Orchestrator::new(
            comm.clone(),
            ToolExecutor::new(Duration::from_secs(1)),
            LoopDetector::new(2, 10),
            ReasoningManager::new(comm, &reasoning),
            &AgentConfig::default(),
        )
    }

    #[tokio::test]
    async fn finish_stops_with_output() {
        let client = Arc::new(ScriptedLlmClient::new(vec![reply(json!({
            "thoughts": "easy",
            "action": "finish",
            "action_input": {"final": "42"}
        }))]));
        let orch = orchestrator(client, ReasoningConfig::default());
        let mut state = AgentState::new("a1", "answer");

        let result = orch
            .execute_step(&mut state, &registry(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, AgentStepResult::finished("42"));
        assert_eq!(state.turns.len(), 1);
        assert_eq!(state.turns[0].llm_message.as_ref().unwrap().action, AgentAction::Finish);
    }

    #[tokio::test]
    async fn tool_call_records_a_turn_and_continues() {
        let client = Arc::new(ScriptedLlmClient::new(vec![tool_call("echo")]));
        let orch = orchestrator(client, ReasoningConfig::default());
        let mut state = AgentState::new("a1", "ping");

        let result = orch
            .execute_step(&mut state, &registry(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.continue_loop);
        let turn = &state.turns[0];
        assert_eq!(turn.tool_call.as_ref().unwrap().tool, "echo");
        assert_eq!(turn.tool_result.as_ref().unwrap().output, Some(json!("pong")));
    }

    #[tokio::test]
    async fn invalid_output_continues_with_error_turn() {
        let client = Arc::new(ScriptedLlmClient::new(vec![ScriptedReply::text("I think I'll just chat")]));
        let orch = orchestrator(client, ReasoningConfig::default());
        let mut state = AgentState::new("a1", "goal");

        let result = orch
            .execute_step(&mut state, &registry(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, AgentStepResult::proceed());
        assert!(state.last_error().unwrap().contains("Invalid model output"));
    }

    #[tokio::test]
    async fn loop_detector_short_circuits_repeated_failures() {
        let client = Arc::new(ScriptedLlmClient::repeating(tool_call("broken")));
        let orch = orchestrator(client, ReasoningConfig::default());
        let mut state = AgentState::new("a1", "goal");
        let tools = registry();

        for _ in 0..3 {
            orch.execute_step(&mut state, &tools, &CancellationToken::new())
                .await
                .unwrap();
        }
        assert!(state.turns[1].tool_result.as_ref().unwrap().error.as_ref().unwrap().contains("disk on fire"));
        let third = state.turns[2].tool_result.as_ref().unwrap();
        assert!(third.error.as_ref().unwrap().starts_with("Repeated failure detected"));
        assert!(third.error.as_ref().unwrap().ends_with("Last error: Tool execution failed: broken: disk on fire"));
        assert_eq!(third.execution_time_ms, 0);
    }

    #[tokio::test]
    async fn multi_tool_call_runs_sequentially_in_one_turn() {
        let client = Arc::new(ScriptedLlmClient::new(vec![reply(json!({
            "thoughts": "both",
            "action": "multi_tool_call",
            "action_input": {"tool_calls": [
                {"tool": "echo", "params": {}},
                {"tool": "broken", "params": {}}
            ]}
        }))]));
        let orch = orchestrator(client, ReasoningConfig::default());
        let mut state = AgentState::new("a1", "goal");

        orch.execute_step(&mut state, &registry(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(state.turns.len(), 1);
        let turn = &state.turns[0];
        let record = turn.tool_call.as_ref().unwrap();
        assert_eq!(record.tool, MULTI_TOOL_CALL);
        assert_eq!(record.params["calls"].as_array().unwrap().len(), 2);

        let result = turn.tool_result.as_ref().unwrap();
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().starts_with("broken: "));
        let outputs = result.output.as_ref().unwrap().as_array().unwrap();
        assert_eq!(outputs[0]["output"], json!("pong"));
        assert_eq!(outputs[1]["success"], json!(false));
    }

    #[tokio::test]
    async fn status_fields_are_broadcast() {
        let client = Arc::new(ScriptedLlmClient::new(vec![reply(json!({
            "thoughts": "working",
            "action": "plan",
            "action_input": {"summary": "next"},
            "status_title": "Planning",
            "progress_pct": 40
        }))]));
        let events = Arc::new(RecordingEventSink::default());
        let orch = orchestrator(client, ReasoningConfig::default()).with_events(events.clone());
        let mut state = AgentState::new("a1", "goal");

        orch.execute_step(&mut state, &registry(), &CancellationToken::new())
            .await
            .unwrap();
        let status = events
            .events()
            .into_iter()
            .find_map(|e| match e {
                AgentEvent::Status { title, progress_pct, .. } => Some((title, progress_pct)),
                _ => None,
            })
            .unwrap();
        assert_eq!(status, (Some("Planning".to_string()), Some(40)));
    }

    #[tokio::test]
    async fn reasoning_note_reaches_the_decision_prompt() {
        let client = Arc::new(ScriptedLlmClient::new(vec![
            ScriptedReply::text(r#"{"conclusion": "call echo", "reasoning_confidence": 0.9}"#),
            tool_call("echo"),
        ]));
        let orch = orchestrator(
            client.clone(),
            ReasoningConfig {
                mode: ReasoningMode::ChainOfThought,
                tree: TreeConfig::default(),
            },
        );
        let mut state = AgentState::new("a1", "goal");

        orch.execute_step(&mut state, &registry(), &CancellationToken::new())
            .await
            .unwrap();
        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        let prompt = &requests[1].messages;
        assert!(prompt.iter().any(|m| m.content.contains("call echo (confidence 0.90)")));
        let decision = state.turns[0].llm_message.as_ref().unwrap();
        assert_eq!(decision.reasoning_confidence, Some(0.9));
    }

    #[tokio::test]
    async fn failed_reasoning_is_skipped() {
        let client = Arc::new(ScriptedLlmClient::new(vec![
            ScriptedReply::error(ponder_core::error::LlmError::Network("down".into())),
            tool_call("echo"),
        ]));
        let orch = orchestrator(
            client,
            ReasoningConfig {
                mode: ReasoningMode::ChainOfThought,
                tree: TreeConfig::default(),
            },
        );
        let mut state = AgentState::new("a1", "goal");

        let result = orch
            .execute_step(&mut state, &registry(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.continue_loop);
        assert!(state.turns[0].tool_result.as_ref().unwrap().success);
    }

    #[tokio::test]
    async fn cancellation_leaves_no_turn() {
        let client = Arc::new(ScriptedLlmClient::new(vec![tool_call("echo")]));
        let orch = orchestrator(client, ReasoningConfig::default());
        let mut state = AgentState::new("a1", "goal");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orch.execute_step(&mut state, &registry(), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(state.turns.is_empty());
    }

    #[tokio::test]
    async fn cancelled_multi_call_records_nothing_in_the_detector() {
        let client = Arc::new(ScriptedLlmClient::new(vec![reply(json!({
            "thoughts": "both",
            "action": "multi_tool_call",
            "action_input": {"tool_calls": [
                {"tool": "broken", "params": {"x": 1}},
                {"tool": "slow", "params": {}}
            ]}
        }))]));
        let comm = Arc::new(LlmCommunicator::new(client, Duration::from_secs(1)));
        let orch = Orchestrator::new(
            comm.clone(),
            ToolExecutor::new(Duration::from_secs(5)),
            LoopDetector::new(1, 10),
            ReasoningManager::new(comm, &ReasoningConfig::default()),
            &AgentConfig::default(),
        );
        let tools = ToolRegistry::from_tools([
            Arc::new(FailingTool::new("broken", "disk on fire")) as Arc<dyn Tool>,
            Arc::new(SlowTool::new("slow", Duration::from_secs(5))),
        ]);
        let mut state = AgentState::new("a1", "goal");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = orch.execute_step(&mut state, &tools, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(state.turns.is_empty());
        // The failed first call never made it into a turn, so it must not count.
        let params = json!({"x": 1}).as_object().cloned().unwrap();
        assert!(!orch.loop_detector.detect_repeated_failures("a1", "broken", &params));
    }

    #[test]
    fn history_context_summarizes_turns() {
        let mut state = AgentState::new("a1", "goal");
        state.push_error_turn(AgentTurn::new_id(), "bad json");
        assert_eq!(history_context(&state.turns), "Turn 0: no decision. Error: bad json");
    }
}
