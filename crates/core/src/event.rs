//! Agent lifecycle events: fire-and-forget notifications for observers.
//!
//! The engine calls [`EventSink::publish`] at run, step, LLM-call, tool-call
//! and status points. Delivery is the sink's business; publishing never
//! blocks and never fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::llm::Usage;

/// All events emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    RunStarted {
        agent_id: String,
        goal: String,
        timestamp: DateTime<Utc>,
    },

    RunCompleted {
        agent_id: String,
        succeeded: bool,
        turns: usize,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    StepStarted {
        agent_id: String,
        turn_index: usize,
        timestamp: DateTime<Utc>,
    },

    StepCompleted {
        agent_id: String,
        turn_index: usize,
        continue_loop: bool,
        timestamp: DateTime<Utc>,
    },

    LlmCallStarted {
        agent_id: String,
        turn_index: usize,
        timestamp: DateTime<Utc>,
    },

    /// One streamed fragment. The terminal chunk carries the full text.
    LlmChunk {
        agent_id: String,
        turn_index: usize,
        content: String,
        is_final: bool,
        timestamp: DateTime<Utc>,
    },

    LlmCallCompleted {
        agent_id: String,
        turn_index: usize,
        success: bool,
        duration_ms: u64,
        usage: Option<Usage>,
        timestamp: DateTime<Utc>,
    },

    ToolCallStarted {
        agent_id: String,
        turn_index: usize,
        tool_name: String,
        timestamp: DateTime<Utc>,
    },

    ToolCallCompleted {
        agent_id: String,
        turn_index: usize,
        tool_name: String,
        success: bool,
        output: Option<serde_json::Value>,
        error: Option<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Status broadcast taken from a decision's status fields.
    Status {
        agent_id: String,
        title: Option<String>,
        details: Option<String>,
        next_step_hint: Option<String>,
        progress_pct: Option<u8>,
        timestamp: DateTime<Utc>,
    },

    /// Tree-of-thoughts exploration progress.
    ReasoningProgress {
        agent_id: String,
        strategy: String,
        depth: usize,
        nodes_explored: usize,
        timestamp: DateTime<Utc>,
    },
}

impl AgentEvent {
    /// Event name, e.g. for SSE or log fields.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::RunCompleted { .. } => "run_completed",
            Self::StepStarted { .. } => "step_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::LlmCallStarted { .. } => "llm_call_started",
            Self::LlmChunk { .. } => "llm_chunk",
            Self::LlmCallCompleted { .. } => "llm_call_completed",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ToolCallCompleted { .. } => "tool_call_completed",
            Self::Status { .. } => "status",
            Self::ReasoningProgress { .. } => "reasoning_progress",
        }
    }
}

/// Receiver of engine events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: AgentEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: AgentEvent) {}
}

/// A broadcast-based event bus.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<AgentEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AgentEvent>> {
        self.sender.subscribe()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: AgentEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
