//! The model's structured decision for one turn.
//!
//! A `ModelMessage` is produced by the output parser from the raw LLM text,
//! never constructed from partial data: either every required field is
//! present and valid, or there is no decision and the turn records an error.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::tool::ToolParams;

/// Maximum length of a status title broadcast to observers.
pub const STATUS_TITLE_MAX: usize = 60;
/// Maximum length of status details broadcast to observers.
pub const STATUS_DETAILS_MAX: usize = 160;
/// Maximum length of a next-step hint broadcast to observers.
pub const NEXT_STEP_HINT_MAX: usize = 60;

/// What the model wants to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAction {
    Plan,
    ToolCall,
    MultiToolCall,
    Finish,
    Retry,
}

impl AgentAction {
    pub const ALL: [AgentAction; 5] = [
        AgentAction::Plan,
        AgentAction::ToolCall,
        AgentAction::MultiToolCall,
        AgentAction::Finish,
        AgentAction::Retry,
    ];

    /// Wire name used in the JSON protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::ToolCall => "tool_call",
            Self::MultiToolCall => "multi_tool_call",
            Self::Finish => "finish",
            Self::Retry => "retry",
        }
    }
}

impl std::fmt::Display for AgentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool: String,
    #[serde(default)]
    pub params: ToolParams,
}

/// The action-specific payload of a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionInput {
    ToolCall(ToolCallRequest),
    MultiToolCall { calls: Vec<ToolCallRequest> },
    Finish { final_output: String },
    /// Plan and Retry carry an optional summary.
    Summary { summary: Option<String> },
}

/// A parsed, validated model decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub thoughts: String,
    pub action: AgentAction,
    pub action_input: ActionInput,

    // Status broadcast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_pct: Option<u8>,

    // Reasoning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    // Tree of thoughts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl ModelMessage {
    /// A decision with only the required fields set.
    pub fn new(thoughts: impl Into<String>, action: AgentAction, action_input: ActionInput) -> Self {
        Self {
            thoughts: thoughts.into(),
            action,
            action_input,
            status_title: None,
            status_details: None,
            next_step_hint: None,
            progress_pct: None,
            reasoning_confidence: None,
            reasoning_type: None,
            reasoning: None,
            insights: Vec::new(),
            conclusion: None,
            is_valid: None,
            error: None,
            thought: None,
            thought_type: None,
            score: None,
            children: Vec::new(),
        }
    }

    pub fn tool_call(thoughts: impl Into<String>, tool: impl Into<String>, params: ToolParams) -> Self {
        Self::new(
            thoughts,
            AgentAction::ToolCall,
            ActionInput::ToolCall(ToolCallRequest {
                tool: tool.into(),
                params,
            }),
        )
    }

    pub fn finish(thoughts: impl Into<String>, final_output: impl Into<String>) -> Self {
        Self::new(
            thoughts,
            AgentAction::Finish,
            ActionInput::Finish {
                final_output: final_output.into(),
            },
        )
    }

    /// The final answer, if this is a Finish decision.
    pub fn final_output(&self) -> Option<&str> {
        match &self.action_input {
            ActionInput::Finish { final_output } => Some(final_output),
            _ => None,
        }
    }

    /// Every tool call this decision requests, in order.
    pub fn tool_calls(&self) -> Vec<&ToolCallRequest> {
        match &self.action_input {
            ActionInput::ToolCall(call) => vec![call],
            ActionInput::MultiToolCall { calls } => calls.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Whether any status-broadcast field is set.
    pub fn has_status(&self) -> bool {
        self.status_title.is_some()
            || self.status_details.is_some()
            || self.next_step_hint.is_some()
            || self.progress_pct.is_some()
    }

    /// Render back into the wire protocol (used when replaying history to the model).
    pub fn to_protocol_json(&self) -> serde_json::Value {
        let action_input = match &self.action_input {
            ActionInput::ToolCall(call) => json!({ "tool": call.tool, "params": call.params }),
            ActionInput::MultiToolCall { calls } => json!({
                "tool_calls": calls
                    .iter()
                    .map(|c| json!({ "tool": c.tool, "params": c.params }))
                    .collect::<Vec<_>>()
            }),
            ActionInput::Finish { final_output } => json!({ "final": final_output }),
            ActionInput::Summary { summary } => json!({ "summary": summary }),
        };
        json!({
            "thoughts": self.thoughts,
            "action": self.action.as_str(),
            "action_input": action_input,
        })
    }
}
