//! # Ponder Core
//!
//! Domain types, collaborator traits, and error definitions for the Ponder
//! agent engine. This crate holds no engine logic. It defines the model
//! that the engine and every collaborator implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator (LLM client, tool, state store, event sink, metrics
//! collector) is a trait here; implementations live in the other crates.

pub mod decision;
pub mod error;
pub mod event;
pub mod llm;
pub mod message;
pub mod metrics;
pub mod state;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use decision::{ActionInput, AgentAction, ModelMessage, ToolCallRequest};
pub use error::{Error, LlmError, Result, StateError, ToolError};
pub use event::{AgentEvent, EventBus, EventSink, NoopEventSink};
pub use llm::{
    ChunkReceiver, FunctionCall, FunctionSpec, LlmClient, LlmRequest, LlmResponse, ResponseType,
    StreamChunk, Usage,
};
pub use message::{ChatMessage, Role};
pub use metrics::{MetricsCollector, NoopMetrics};
pub use state::{AgentState, AgentTurn, StateStore, ToolCallRecord};
pub use tool::{Tool, ToolExecutionResult, ToolParams, ToolRegistry};
