//! LLM communicator: every model call goes through here.
//!
//! Wraps a `dyn LlmClient` with streaming aggregation, a per-call deadline,
//! caller cancellation, chunk events and metrics. A deadline trip is an
//! ordinary failure (recorded as a failed turn by `call_and_parse`); caller
//! cancellation always surfaces as [`AgentError::Cancelled`].

use chrono::Utc;
use ponder_core::decision::ModelMessage;
use ponder_core::error::LlmError;
use ponder_core::event::{AgentEvent, EventSink, NoopEventSink};
use ponder_core::llm::{
    ChunkReceiver, FunctionSpec, LlmClient, LlmRequest, LlmResponse, StreamChunk,
};
use ponder_core::message::ChatMessage;
use ponder_core::metrics::{MetricsCollector, NoopMetrics};
use ponder_core::state::AgentState;
use ponder_core::tool::ToolParams;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::parser::{ParserLimits, parse_model_output};

/// Fold a chunk stream into one response.
///
/// `on_chunk` sees every non-empty delta in arrival order, then exactly one
/// terminal chunk (`is_final = true`) whose content is the full text.
pub async fn aggregate_stream<F>(mut rx: ChunkReceiver, mut on_chunk: F) -> Result<LlmResponse, LlmError>
where
    F: FnMut(&StreamChunk),
{
    let mut response = LlmResponse::default();
    while let Some(item) = rx.recv().await {
        let chunk = item?;
        response.absorb(&chunk);
        if chunk.is_final {
            break;
        }
        if chunk.content.as_deref().is_some_and(|c| !c.is_empty()) {
            on_chunk(&chunk);
        }
    }

    on_chunk(&StreamChunk {
        content: Some(response.content.clone()),
        is_final: true,
        function_call: response.function_call.clone(),
        usage: response.usage,
    });
    Ok(response)
}

/// Why a single call did not produce a response.
enum CallFailure {
    Cancelled,
    Llm(LlmError),
}

impl From<CallFailure> for AgentError {
    fn from(failure: CallFailure) -> Self {
        match failure {
            CallFailure::Cancelled => AgentError::Cancelled,
            CallFailure::Llm(e) => AgentError::Llm(e),
        }
    }
}

pub struct LlmCommunicator {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    limits: ParserLimits,
    events: Arc<dyn EventSink>,
    metrics: Arc<dyn MetricsCollector>,
}

impl LlmCommunicator {
    pub fn new(client: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            temperature: None,
            max_tokens: None,
            limits: ParserLimits::default(),
            events: Arc::new(NoopEventSink),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_limits(mut self, limits: ParserLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// One streamed call under the deadline and the caller's token.
    async fn stream_call(
        &self,
        mut request: LlmRequest,
        agent_id: &str,
        turn_index: usize,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, CallFailure> {
        if cancel.is_cancelled() {
            return Err(CallFailure::Cancelled);
        }
        if request.temperature.is_none() {
            request.temperature = self.temperature;
        }
        if request.max_tokens.is_none() {
            request.max_tokens = self.max_tokens;
        }

        self.events.publish(AgentEvent::LlmCallStarted {
            agent_id: agent_id.to_string(),
            turn_index,
            timestamp: Utc::now(),
        });
        debug!(
            agent_id,
            turn_index,
            client = self.client.name(),
            messages = request.messages.len(),
            "LLM call starting"
        );

        let start = Instant::now();
        let work = async {
            let rx = self.client.stream(request).await?;
            aggregate_stream(rx, |chunk| {
                self.events.publish(AgentEvent::LlmChunk {
                    agent_id: agent_id.to_string(),
                    turn_index,
                    content: chunk.content.clone().unwrap_or_default(),
                    is_final: chunk.is_final,
                    timestamp: Utc::now(),
                });
            })
            .await
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(agent_id, turn_index, "LLM call cancelled");
                return Err(CallFailure::Cancelled);
            }
            outcome = tokio::time::timeout(self.timeout, work) => outcome,
        };

        let result = match outcome {
            Err(_) => Err(LlmError::Timeout(format!(
                "no response within {}ms",
                self.timeout.as_millis()
            ))),
            Ok(result) => result,
        };

        let elapsed = start.elapsed();
        let success = result.is_ok();
        let usage = result.as_ref().ok().and_then(|r| r.usage);
        self.metrics
            .record_llm_call(agent_id, elapsed, success, usage.as_ref());
        self.events.publish(AgentEvent::LlmCallCompleted {
            agent_id: agent_id.to_string(),
            turn_index,
            success,
            duration_ms: elapsed.as_millis() as u64,
            usage,
            timestamp: Utc::now(),
        });

        match &result {
            Ok(_) => debug!(agent_id, turn_index, elapsed_ms = elapsed.as_millis() as u64, "LLM call completed"),
            Err(e) => warn!(agent_id, turn_index, error = %e, "LLM call failed"),
        }
        result.map_err(CallFailure::Llm)
    }

    /// Native function-calling request, aggregated.
    pub async fn call_with_functions(
        &self,
        messages: Vec<ChatMessage>,
        functions: Vec<FunctionSpec>,
        agent_id: &str,
        turn_index: usize,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, AgentError> {
        let request = LlmRequest::with_functions(messages, functions);
        Ok(self.stream_call(request, agent_id, turn_index, cancel).await?)
    }

    /// Plain text completion. Failures are returned, not recorded.
    pub async fn call_text(
        &self,
        messages: Vec<ChatMessage>,
        agent_id: &str,
        turn_index: usize,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let response = self
            .stream_call(LlmRequest::text(messages), agent_id, turn_index, cancel)
            .await?;
        Ok(response.content)
    }

    /// Ask for a JSON decision and parse it.
    ///
    /// Any failure other than cancellation is appended to `state.turns` as
    /// a failed turn under `turn_id`, and `Ok(None)` is returned.
    pub async fn call_and_parse(
        &self,
        messages: Vec<ChatMessage>,
        agent_id: &str,
        turn_index: usize,
        turn_id: &str,
        state: &mut AgentState,
        cancel: &CancellationToken,
    ) -> Result<Option<ModelMessage>, AgentError> {
        let response = match self
            .stream_call(LlmRequest::text(messages), agent_id, turn_index, cancel)
            .await
        {
            Ok(response) => response,
            Err(CallFailure::Cancelled) => return Err(AgentError::Cancelled),
            Err(CallFailure::Llm(e)) => {
                state.push_error_turn(turn_id.to_string(), describe_llm_failure(&e));
                return Ok(None);
            }
        };

        match parse_model_output(&response.content, Some(&self.limits)) {
            Ok(decision) => Ok(Some(decision)),
            Err(e) => {
                warn!(agent_id, turn_index, error = %e, "Model output rejected");
                state.push_error_turn(
                    turn_id.to_string(),
                    format!("Invalid model output: {e}"),
                );
                Ok(None)
            }
        }
    }

    /// Function-calling counterpart of [`call_and_parse`](Self::call_and_parse).
    ///
    /// A native function call is normalized into a tool-call decision; a
    /// text answer is parsed with the JSON protocol.
    #[allow(clippy::too_many_arguments)]
    pub async fn call_and_normalize(
        &self,
        messages: Vec<ChatMessage>,
        functions: Vec<FunctionSpec>,
        agent_id: &str,
        turn_index: usize,
        turn_id: &str,
        state: &mut AgentState,
        cancel: &CancellationToken,
    ) -> Result<Option<ModelMessage>, AgentError> {
        let request = LlmRequest::with_functions(messages, functions);
        let response = match self.stream_call(request, agent_id, turn_index, cancel).await {
            Ok(response) => response,
            Err(CallFailure::Cancelled) => return Err(AgentError::Cancelled),
            Err(CallFailure::Llm(e)) => {
                state.push_error_turn(turn_id.to_string(), describe_llm_failure(&e));
                return Ok(None);
            }
        };

        if let Some(decision) = normalize_function_call(&response, turn_index) {
            return Ok(Some(decision));
        }
        match parse_model_output(&response.content, Some(&self.limits)) {
            Ok(decision) => Ok(Some(decision)),
            Err(e) => {
                warn!(agent_id, turn_index, error = %e, "Model output rejected");
                state.push_error_turn(
                    turn_id.to_string(),
                    format!("Invalid model output: {e}"),
                );
                Ok(None)
            }
        }
    }
}

fn describe_llm_failure(e: &LlmError) -> String {
    match e {
        LlmError::Timeout(detail) => format!("Timeout: LLM call timed out ({detail})"),
        other => format!("LLM call failed: {other}"),
    }
}

/// Turn a native function call into an equivalent tool-call decision.
///
/// Returns `None` when the response carries no function call. Malformed
/// argument JSON degrades to empty parameters.
pub fn normalize_function_call(response: &LlmResponse, turn_index: usize) -> Option<ModelMessage> {
    let call = response.function_call.as_ref()?;
    let name = call.name.trim();
    if name.is_empty() {
        return None;
    }

    let params = match serde_json::from_str::<serde_json::Value>(&call.arguments) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => {
            if !call.arguments.trim().is_empty() {
                debug!(turn_index, tool = name, "Ignoring malformed function arguments");
            }
            ToolParams::new()
        }
    };

    let thoughts = match response.content.trim() {
        "" => format!("Calling {name} (turn {turn_index})"),
        text => text.to_string(),
    };
    Some(ModelMessage::tool_call(thoughts, name, params))
}
