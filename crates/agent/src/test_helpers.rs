//! Shared test doubles for the agent engine.

use async_trait::async_trait;
use ponder_core::error::{LlmError, ToolError};
use ponder_core::event::{AgentEvent, EventSink};
use ponder_core::llm::{ChunkReceiver, FunctionCall, LlmClient, LlmRequest, StreamChunk, Usage};
use ponder_core::tool::{Tool, ToolParams};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// One canned model reply.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    chunks: Vec<String>,
    function_call: Option<FunctionCall>,
    error: Option<LlmError>,
    delay: Option<Duration>,
}

impl ScriptedReply {
    /// The whole text in one delta.
    pub fn text(text: &str) -> Self {
        Self::chunked(text, 1)
    }

    /// The text split into `pieces` roughly equal deltas.
    pub fn chunked(text: &str, pieces: usize) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let size = chars.len().div_ceil(pieces.max(1)).max(1);
        Self {
            chunks: chars.chunks(size).map(|c| c.iter().collect()).collect(),
            function_call: None,
            error: None,
            delay: None,
        }
    }

    /// A native function call with no text.
    pub fn function_call(name: &str, arguments: &str) -> Self {
        Self {
            chunks: Vec::new(),
            function_call: Some(FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            }),
            error: None,
            delay: None,
        }
    }

    /// `stream()` fails with this error.
    pub fn error(error: LlmError) -> Self {
        Self {
            chunks: Vec::new(),
            function_call: None,
            error: Some(error),
            delay: None,
        }
    }

    /// Sleep before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A client that returns a sequence of scripted replies.
///
/// Each call to `stream` takes the next reply in the queue. When the queue
/// is empty it answers with `fallback` if one is set, otherwise it fails.
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: Option<ScriptedReply>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same reply.
    pub fn repeating(reply: ScriptedReply) -> Self {
        Self {
            fallback: Some(reply),
            ..Self::new(Vec::new())
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: LlmRequest) -> Result<ChunkReceiver, LlmError> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| LlmError::NotConfigured("no more scripted replies".into()))?;

        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = reply.error {
            return Err(error);
        }

        let (tx, rx) = mpsc::channel(reply.chunks.len() + 2);
        for chunk in reply.chunks {
            let _ = tx.send(Ok(StreamChunk::delta(chunk))).await;
        }
        if let Some(fc) = reply.function_call {
            let _ = tx
                .send(Ok(StreamChunk {
                    function_call: Some(fc),
                    ..StreamChunk::default()
                }))
                .await;
        }
        let _ = tx
            .send(Ok(StreamChunk::done(Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }))))
            .await;
        Ok(rx)
    }
}

/// Keeps every published event.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<AgentEvent>>,
}

impl RecordingEventSink {
    pub fn events(&self) -> Vec<AgentEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(AgentEvent::event_type)
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: AgentEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn empty_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Always returns the same output.
pub struct StaticTool {
    name: String,
    output: Value,
}

impl StaticTool {
    pub fn new(name: &str, output: Value) -> Self {
        Self {
            name: name.into(),
            output,
        }
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Returns a fixed value"
    }
    fn parameters_schema(&self) -> Value {
        empty_schema()
    }
    async fn invoke(&self, _params: ToolParams) -> Result<Value, ToolError> {
        Ok(self.output.clone())
    }
}

/// Always fails with the same reason.
pub struct FailingTool {
    name: String,
    reason: String,
}

impl FailingTool {
    pub fn new(name: &str, reason: &str) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn parameters_schema(&self) -> Value {
        empty_schema()
    }
    async fn invoke(&self, _params: ToolParams) -> Result<Value, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason: self.reason.clone(),
        })
    }
}

/// Sleeps before answering.
pub struct SlowTool {
    name: String,
    delay: Duration,
}

impl SlowTool {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Takes a while"
    }
    fn parameters_schema(&self) -> Value {
        empty_schema()
    }
    async fn invoke(&self, _params: ToolParams) -> Result<Value, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(Value::String("finally".into()))
    }
}

/// Panics when invoked.
pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "panicky"
    }
    fn description(&self) -> &str {
        "Panics"
    }
    fn parameters_schema(&self) -> Value {
        empty_schema()
    }
    async fn invoke(&self, _params: ToolParams) -> Result<Value, ToolError> {
        panic!("tool blew up");
    }
}
