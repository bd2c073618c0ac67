//! Error types for the agent engine.

use ponder_core::error::{LlmError, StateError};
use thiserror::Error;

/// Errors that escape a run or a step.
///
/// Model-facing failures (bad decisions, tool errors, timeouts) never show
/// up here; they are recorded as failed turns.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Operation cancelled")]
    Cancelled,

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("State store error: {0}")]
    State(#[from] StateError),

    #[error("Reasoning tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Protocol violations found while parsing a model decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Model output is empty")]
    Empty,

    #[error("Model output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Model output must be a JSON object")]
    NotAnObject,

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Field '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("Field '{field}' exceeds the maximum length of {limit} characters (got {actual})")]
    TooLong {
        field: &'static str,
        limit: usize,
        actual: usize,
    },

    #[error(
        "Invalid action '{0}'; expected one of plan, tool_call, multi_tool_call, finish, retry"
    )]
    InvalidAction(String),

    #[error("Invalid entry {index} in action_input.tool_calls: {reason}")]
    InvalidToolCall { index: usize, reason: String },
}

/// Misuse of the reasoning-tree API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Tree already has a root node")]
    RootAlreadyExists,

    #[error("Tree has no root node")]
    MissingRoot,

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Parent node not found: {0}")]
    ParentNotFound(String),

    #[error("Node {node_id} is at the maximum depth of {max_depth}")]
    MaxDepthExceeded { node_id: String, max_depth: usize },

    #[error("Tree is at capacity ({max_nodes} nodes)")]
    AtCapacity { max_nodes: usize },

    #[error("Path contains pruned node {0}")]
    PrunedNodeInPath(String),
}
