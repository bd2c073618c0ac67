//! LLM client trait: the abstraction over model backends.
//!
//! A client knows how to send a message list to a model and stream the
//! response back as chunks. Concrete HTTP clients live outside this
//! workspace; the engine only ever talks to `dyn LlmClient`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::LlmError;
use crate::message::ChatMessage;

/// How the model is asked to answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Free text (the JSON decision protocol is carried inside the text).
    #[default]
    Text,
    /// Native function calling.
    FunctionCall,
}

/// A function definition sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// The function (tool) name
    pub name: String,

    /// Description of what the function does
    pub description: String,

    /// JSON Schema describing the parameters
    pub parameters: serde_json::Value,
}

/// A request to an LLM client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The conversation messages
    pub messages: Vec<ChatMessage>,

    /// Text or native function calling
    #[serde(default)]
    pub response_type: ResponseType,

    /// Functions the model may call (only used with `ResponseType::FunctionCall`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionSpec>,

    /// Temperature (0.0 = deterministic)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Provider-specific options, passed through untouched
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl LlmRequest {
    /// A plain text request over the given messages.
    pub fn text(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            response_type: ResponseType::Text,
            functions: Vec::new(),
            temperature: None,
            max_tokens: None,
            options: serde_json::Map::new(),
        }
    }

    /// A function-calling request over the given messages.
    pub fn with_functions(messages: Vec<ChatMessage>, functions: Vec<FunctionSpec>) -> Self {
        Self {
            response_type: ResponseType::FunctionCall,
            functions,
            ..Self::text(messages)
        }
    }
}

/// A native function call returned by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function to invoke
    pub name: String,

    /// Arguments as raw JSON text (may be malformed)
    pub arguments: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
///
/// `content` is a delta. The last chunk of a stream has `is_final` set and
/// usually carries `usage`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub is_final: bool,

    /// Partial function call (name on the first delta, arguments appended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// A content delta.
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A terminal chunk.
    pub fn done(usage: Option<Usage>) -> Self {
        Self {
            is_final: true,
            usage,
            ..Self::default()
        }
    }
}

/// A complete (aggregated) response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The full generated text
    pub content: String,

    /// Native function call, if the model made one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model responded, when the client reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl LlmResponse {
    /// Fold one streaming chunk into this response.
    pub fn absorb(&mut self, chunk: &StreamChunk) {
        if let Some(text) = &chunk.content {
            self.content.push_str(text);
        }
        if let Some(fc) = &chunk.function_call {
            match &mut self.function_call {
                Some(existing) => {
                    if existing.name.is_empty() {
                        existing.name = fc.name.clone();
                    }
                    existing.arguments.push_str(&fc.arguments);
                }
                None => self.function_call = Some(fc.clone()),
            }
        }
        // Later usage wins; providers report cumulative totals.
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
    }
}

/// Stream of chunks produced by [`LlmClient::stream`].
pub type ChunkReceiver = mpsc::Receiver<Result<StreamChunk, LlmError>>;

/// The core LLM client trait.
///
/// Every backend implements `stream()`. The engine consumes the receiver on
/// a single task; dropping it abandons the request.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// A human-readable name for this client (e.g., "openai", "scripted").
    fn name(&self) -> &str;

    /// Send a request and get a stream of response chunks.
    async fn stream(&self, request: LlmRequest) -> Result<ChunkReceiver, LlmError>;

    /// Send a request and get the aggregated response.
    ///
    /// Default implementation drains `stream()`.
    async fn call(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut rx = self.stream(request).await?;
        let mut response = LlmResponse::default();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            response.absorb(&chunk);
            if chunk.is_final {
                break;
            }
        }
        Ok(response)
    }
}
