//! Prompt construction for decisions and reasoning.

use ponder_core::llm::FunctionSpec;
use ponder_core::message::ChatMessage;
use ponder_core::state::AgentTurn;

/// The decision protocol the model must follow.
const PROTOCOL: &str = r#"You are an autonomous agent working toward a goal using tools.

Reply with exactly ONE JSON object and nothing else:
{
  "thoughts": "your reasoning for this step (required, non-empty)",
  "action": "tool_call" | "multi_tool_call" | "finish" | "plan" | "retry",
  "action_input": { ... },
  "status_title": "optional short status (max 60 chars)",
  "status_details": "optional details (max 160 chars)",
  "next_step_hint": "optional hint (max 60 chars)",
  "progress_pct": 0-100
}

action_input by action:
- tool_call:       {"tool": "<name>", "params": {...}}
- multi_tool_call: {"tool_calls": [{"tool": "<name>", "params": {...}}, ...]}
- finish:          {"final": "<the final answer>"}
- plan / retry:    {"summary": "<what you will do next>"}

Use finish as soon as the goal is met. If a tool failed, read the error and
change your approach instead of repeating the same call."#;

fn render_tools(tools: &[FunctionSpec]) -> String {
    if tools.is_empty() {
        return "No tools are available.".into();
    }
    let mut out = String::from("Available tools:\n");
    for tool in tools {
        out.push_str(&format!(
            "- {}: {}\n  parameters: {}\n",
            tool.name, tool.description, tool.parameters
        ));
    }
    out
}

/// System prompt for the JSON decision protocol.
pub fn decision_system_prompt(tools: &[FunctionSpec]) -> String {
    format!("{PROTOCOL}\n\n{}", render_tools(tools))
}

/// Replay recent turns as conversation messages.
///
/// Decisions become assistant messages in protocol form; tool results and
/// recorded errors become tool messages the model can react to.
pub fn history_messages(turns: &[AgentTurn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() * 2);
    for turn in turns {
        if let Some(decision) = &turn.llm_message {
            messages.push(ChatMessage::assistant(decision.to_protocol_json().to_string()));
        }
        if let Some(result) = &turn.tool_result {
            let label = match (&turn.tool_call, turn.llm_message.is_some()) {
                (Some(call), _) => format!("Result of {} (turn {})", call.tool, turn.index),
                (None, true) => format!("Result (turn {})", turn.index),
                (None, false) => format!("Error (turn {})", turn.index),
            };
            let mut content = format!("{label}: {}", result.summary());
            if !result.success && turn.llm_message.is_none() {
                content.push_str("\nRespond with a single valid JSON decision.");
            }
            messages.push(ChatMessage::tool(content));
        }
    }
    messages
}

/// Full message list for one decision call.
pub fn decision_messages(
    goal: &str,
    tools: &[FunctionSpec],
    recent: &[AgentTurn],
    reasoning_note: Option<&str>,
) -> Vec<ChatMessage> {
    let mut messages = vec![
        ChatMessage::system(decision_system_prompt(tools)),
        ChatMessage::user(format!("Goal: {goal}")),
    ];
    messages.extend(history_messages(recent));
    if let Some(note) = reasoning_note {
        messages.push(ChatMessage::user(format!(
            "Reasoning notes for this step:\n{note}"
        )));
    }
    if !recent.is_empty() {
        messages.push(ChatMessage::user("Decide the next action."));
    }
    messages
}

/// Chain-of-thought request.
pub fn chain_of_thought_messages(goal: &str, context: &str, tools: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "Think step by step about how to reach the goal. Reply with one JSON object: \
             {\"reasoning\": \"step-by-step analysis\", \"insights\": [\"...\"], \
             \"conclusion\": \"what to do next\", \"reasoning_confidence\": 0.0-1.0}",
        ),
        ChatMessage::user(format!(
            "Goal: {goal}\nAvailable tools: {}\nContext:\n{}",
            list_or_none(tools),
            or_none(context)
        )),
    ]
}

/// Request for the root thought of a reasoning tree.
pub fn root_thought_messages(goal: &str, context: &str, tools: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You explore approaches to a goal as a tree of thoughts. Propose the single best \
             starting thought. Reply with one JSON object: \
             {\"thought\": \"...\", \"thought_type\": \"hypothesis\"}",
        ),
        ChatMessage::user(format!(
            "Goal: {goal}\nAvailable tools: {}\nContext:\n{}",
            list_or_none(tools),
            or_none(context)
        )),
    ]
}

/// Request for `count` follow-up thoughts extending `path`.
pub fn expand_thought_messages(goal: &str, path: &[String], count: usize) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You explore approaches to a goal as a tree of thoughts. Given the chain of \
             thoughts so far, propose {count} distinct next thoughts. Reply with one JSON \
             object: {{\"children\": [{{\"thought\": \"...\", \"thought_type\": \
             \"analysis|hypothesis|alternative|refinement\"}}]}}"
        )),
        ChatMessage::user(format!("Goal: {goal}\nThoughts so far:\n{}", numbered(path))),
    ]
}

/// Request to score a chain of thoughts.
pub fn evaluate_thought_messages(goal: &str, path: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "Rate how promising the last thought is for reaching the goal, given the chain \
             leading to it. Reply with one JSON object: {\"score\": 0.0-1.0, \"reasoning\": \"...\"}",
        ),
        ChatMessage::user(format!("Goal: {goal}\nThoughts:\n{}", numbered(path))),
    ]
}

/// Request to turn the best path into a conclusion.
pub fn synthesis_messages(goal: &str, path: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "Summarize the reasoning chain into a concrete conclusion about what to do next. \
             Reply with one JSON object: {\"conclusion\": \"...\", \"insights\": [\"...\"]}",
        ),
        ChatMessage::user(format!("Goal: {goal}\nBest reasoning path:\n{}", numbered(path))),
    ]
}

fn numbered(path: &[String]) -> String {
    path.iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {t}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".into()
    } else {
        items.join(", ")
    }
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() { "(none)" } else { text }
}
