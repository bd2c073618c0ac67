//! Persistent agent state and the store trait that holds it.
//!
//! `AgentState.turns` is the authoritative history of a run: append-only,
//! ordered by `index`, never rewritten in place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::ModelMessage;
use crate::error::StateError;
use crate::tool::{ToolExecutionResult, ToolParams};

/// The tool invocation a turn performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    #[serde(default)]
    pub params: ToolParams,
}

/// One turn of the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTurn {
    /// 0-based position in `AgentState.turns`
    pub index: usize,

    /// Unique per turn; correlates errors and events
    pub turn_id: String,

    /// The parsed decision (None when parsing or the LLM call failed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_message: Option<ModelMessage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolExecutionResult>,

    pub created_utc: DateTime<Utc>,
}

impl AgentTurn {
    /// A fresh turn id.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Whether this turn recorded a failure.
    pub fn is_error(&self) -> bool {
        self.tool_result.as_ref().is_some_and(|r| !r.success)
    }
}

/// Everything persisted for one agent id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,

    /// Set once; refreshed only while blank
    #[serde(default)]
    pub goal: String,

    #[serde(default)]
    pub turns: Vec<AgentTurn>,

    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl AgentState {
    pub fn new(agent_id: impl Into<String>, goal: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            goal: goal.into(),
            turns: Vec::new(),
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Index the next appended turn will get.
    pub fn next_turn_index(&self) -> usize {
        self.turns.len()
    }

    /// Append a turn, assigning its index. Returns the index.
    pub fn push_turn(
        &mut self,
        turn_id: String,
        llm_message: Option<ModelMessage>,
        tool_call: Option<ToolCallRecord>,
        tool_result: Option<ToolExecutionResult>,
    ) -> usize {
        let index = self.next_turn_index();
        self.turns.push(AgentTurn {
            index,
            turn_id,
            llm_message,
            tool_call,
            tool_result,
            created_utc: Utc::now(),
        });
        self.updated_utc = Utc::now();
        index
    }

    /// Append a turn that only records an error.
    pub fn push_error_turn(&mut self, turn_id: String, error: impl Into<String>) -> usize {
        self.push_turn(
            turn_id,
            None,
            None,
            Some(ToolExecutionResult::failed(error, 0)),
        )
    }

    /// The most recent turn-level error message, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .filter_map(|t| t.tool_result.as_ref())
            .find(|r| !r.success)
            .and_then(|r| r.error.as_deref())
    }

    /// The last `n` turns, oldest first.
    pub fn recent_turns(&self, n: usize) -> &[AgentTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }
}

/// The state store trait.
///
/// Implementations: in-memory (tests, ephemeral agents) and file-backed.
/// Must be safe to call from concurrent runs of different agent ids.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    /// Load state for an agent, or `None` if nothing is stored.
    async fn load(&self, agent_id: &str) -> Result<Option<AgentState>, StateError>;

    /// Persist state for an agent (last writer wins).
    async fn save(&self, agent_id: &str, state: &AgentState) -> Result<(), StateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_turn_assigns_monotonic_indices() {
        let mut state = AgentState::new("a1", "goal");
        assert_eq!(state.push_turn(AgentTurn::new_id(), None, None, None), 0);
        assert_eq!(state.push_error_turn(AgentTurn::new_id(), "boom"), 1);
        assert_eq!(state.turns[1].index, 1);
        assert!(state.turns[1].is_error());
    }

    #[test]
    fn last_error_prefers_most_recent() {
        let mut state = AgentState::new("a1", "goal");
        state.push_error_turn(AgentTurn::new_id(), "first");
        state.push_turn(
            AgentTurn::new_id(),
            None,
            None,
            Some(ToolExecutionResult::succeeded(serde_json::json!(1), 0)),
        );
        state.push_error_turn(AgentTurn::new_id(), "second");
        assert_eq!(state.last_error(), Some("second"));
    }

    #[test]
    fn recent_turns_window() {
        let mut state = AgentState::new("a1", "goal");
        for _ in 0..5 {
            state.push_turn(AgentTurn::new_id(), None, None, None);
        }
        let window = state.recent_turns(2);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].index, 3);
        assert_eq!(state.recent_turns(10).len(), 5);
    }
}
