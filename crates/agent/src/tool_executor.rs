//! Tool executor: look up, invoke, time-limit and report one tool call.
//!
//! Every model-facing failure (unknown tool, bad arguments, tool error,
//! panic, timeout) becomes a failed [`ToolExecutionResult`]. Only caller
//! cancellation is returned as an error.

use chrono::Utc;
use ponder_core::event::{AgentEvent, EventSink, NoopEventSink};
use ponder_core::metrics::{MetricsCollector, NoopMetrics};
use ponder_core::tool::{ToolExecutionResult, ToolParams, ToolRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AgentError;

pub struct ToolExecutor {
    timeout: Duration,
    events: Arc<dyn EventSink>,
    metrics: Arc<dyn MetricsCollector>,
}

impl ToolExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            events: Arc::new(NoopEventSink),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `tool_name` with `params`.
    pub async fn execute(
        &self,
        tool_name: &str,
        params: &ToolParams,
        tools: &ToolRegistry,
        agent_id: &str,
        turn_index: usize,
        cancel: &CancellationToken,
    ) -> Result<ToolExecutionResult, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        self.events.publish(AgentEvent::ToolCallStarted {
            agent_id: agent_id.to_string(),
            turn_index,
            tool_name: tool_name.to_string(),
            timestamp: Utc::now(),
        });

        let start = Instant::now();
        let result = match tools.get(tool_name) {
            None => {
                warn!(agent_id, turn_index, tool = tool_name, "Tool not found");
                ToolExecutionResult::failed(
                    format!(
                        "Tool '{tool_name}' not found. Available tools: {}",
                        tools.names().join(", ")
                    ),
                    0,
                )
            }
            Some(tool) => {
                debug!(agent_id, turn_index, tool = tool_name, "Invoking tool");
                let task_params = params.clone();
                let mut handle = tokio::spawn(async move { tool.invoke(task_params).await });

                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        handle.abort();
                        info!(agent_id, turn_index, tool = tool_name, "Tool call cancelled");
                        let elapsed = start.elapsed();
                        self.metrics.record_tool_execution(agent_id, tool_name, elapsed, false);
                        // Close out the started event so listeners never see a dangling call.
                        self.events.publish(AgentEvent::ToolCallCompleted {
                            agent_id: agent_id.to_string(),
                            turn_index,
                            tool_name: tool_name.to_string(),
                            success: false,
                            output: None,
                            error: Some("cancelled".to_string()),
                            duration_ms: elapsed.as_millis() as u64,
                            timestamp: Utc::now(),
                        });
                        return Err(AgentError::Cancelled);
                    }
                    outcome = tokio::time::timeout(self.timeout, &mut handle) => outcome,
                };

                let elapsed_ms = start.elapsed().as_millis() as u64;
                match outcome {
                    Err(_) => {
                        handle.abort();
                        ToolExecutionResult::failed(
                            format!(
                                "Timeout: tool '{tool_name}' did not complete within {}ms",
                                self.timeout.as_millis()
                            ),
                            elapsed_ms,
                        )
                    }
                    Ok(Err(join_err)) => ToolExecutionResult::failed(
                        format!("Tool '{tool_name}' crashed: {join_err}"),
                        elapsed_ms,
                    ),
                    Ok(Ok(Err(tool_err))) => ToolExecutionResult::failed(tool_err.to_string(), elapsed_ms),
                    Ok(Ok(Ok(output))) => ToolExecutionResult::succeeded(output, elapsed_ms),
                }
            }
        };

        let elapsed = start.elapsed();
        self.metrics
            .record_tool_execution(agent_id, tool_name, elapsed, result.success);

        if result.success {
            info!(
                agent_id,
                turn_index,
                tool = tool_name,
                elapsed_ms = result.execution_time_ms,
                "Tool call succeeded"
            );
        } else {
            warn!(
                agent_id,
                turn_index,
                tool = tool_name,
                error = result.error.as_deref().unwrap_or_default(),
                "Tool call failed"
            );
        }

        self.events.publish(AgentEvent::ToolCallCompleted {
            agent_id: agent_id.to_string(),
            turn_index,
            tool_name: tool_name.to_string(),
            success: result.success,
            output: result.output.clone(),
            error: result.error.clone(),
            duration_ms: result.execution_time_ms,
            timestamp: Utc::now(),
        });

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingTool, PanickingTool, RecordingEventSink, SlowTool, StaticTool};
    use serde_json::json;

    fn registry() -> ToolRegistry {
        ToolRegistry::from_tools([
            Arc::new(StaticTool::new("echo", json!("pong"))) as Arc<dyn ponder_core::tool::Tool>,
            Arc::new(FailingTool::new("broken", "disk on fire")),
            Arc::new(SlowTool::new("slow", Duration::from_secs(5))),
            Arc::new(PanickingTool),
        ])
    }

    #[tokio::test]
    async fn success_is_wrapped_and_reported() {
        let events = Arc::new(RecordingEventSink::default());
        let executor = ToolExecutor::new(Duration::from_secs(1)).with_events(events.clone());
        let result = executor
            .execute("echo", &ToolParams::new(), &registry(), "a1", 0, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, Some(json!("pong")));
        assert_eq!(events.types(), vec!["tool_call_started", "tool_call_completed"]);
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failed_result() {
        let executor = ToolExecutor::new(Duration::from_secs(1));
        let result = executor
            .execute("nope", &ToolParams::new(), &registry(), "a1", 0, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.success);
        let err = result.error.unwrap();
        assert!(err.contains("'nope' not found"));
        assert!(err.contains("echo"));
    }

    #[tokio::test]
    async fn tool_error_is_a_failed_result() {
        let executor = ToolExecutor::new(Duration::from_secs(1));
        let result = executor
            .execute("broken", &ToolParams::new(), &registry(), "a1", 0, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("disk on fire"));
    }

    #[tokio::test]
    async fn panic_is_a_failed_result() {
        let executor = ToolExecutor::new(Duration::from_secs(1));
        let result = executor
            .execute("panicky", &ToolParams::new(), &registry(), "a1", 0, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("crashed"));
    }

    #[tokio::test]
    async fn timeout_is_a_failed_result() {
        let executor = ToolExecutor::new(Duration::from_millis(20));
        let result = executor
            .execute("slow", &ToolParams::new(), &registry(), "a1", 0, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Timeout"));
    }

    #[tokio::test]
    async fn cancellation_propagates() {
        let events = Arc::new(RecordingEventSink::default());
        let executor = ToolExecutor::new(Duration::from_secs(10)).with_events(events.clone());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = executor
            .execute("slow", &ToolParams::new(), &registry(), "a1", 0, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(events.types(), vec!["tool_call_started", "tool_call_completed"]);
        match events.events().last() {
            Some(AgentEvent::ToolCallCompleted { success, error, .. }) => {
                assert!(!success);
                assert_eq!(error.as_deref(), Some("cancelled"));
            }
            other => panic!("unexpected last event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn already_cancelled_skips_invocation() {
        let events = Arc::new(RecordingEventSink::default());
        let executor = ToolExecutor::new(Duration::from_secs(1)).with_events(events.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = executor
            .execute("echo", &ToolParams::new(), &registry(), "a1", 0, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(events.types().is_empty());
    }
}
