//! Model-output parser: turns raw LLM text into a validated decision.
//!
//! The protocol is one JSON object:
//!
//! ```json
//! {
//!   "thoughts": "why",
//!   "action": "tool_call | multi_tool_call | finish | plan | retry",
//!   "action_input": { "tool": "...", "params": {} }
//! }
//! ```
//!
//! `action_input` depends on the action: `{tool, params}` for a tool call,
//! `{tool_calls: [{tool, params}, ..]}` for several, `{final}` to finish and
//! `{summary}` for plan/retry. Status and reasoning fields are optional and
//! parsed leniently; required fields are not.

use ponder_config::ParserConfig;
use ponder_core::decision::{
    ActionInput, AgentAction, ModelMessage, NEXT_STEP_HINT_MAX, STATUS_DETAILS_MAX,
    STATUS_TITLE_MAX, ToolCallRequest,
};
use ponder_core::tool::ToolParams;
use serde_json::{Map, Value};

use crate::error::ParseError;

/// Optional maximum lengths, in characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserLimits {
    pub max_thoughts_len: Option<usize>,
    pub max_final_len: Option<usize>,
    pub max_summary_len: Option<usize>,
}

impl From<&ParserConfig> for ParserLimits {
    fn from(config: &ParserConfig) -> Self {
        Self {
            max_thoughts_len: config.max_thoughts_len,
            max_final_len: config.max_final_len,
            max_summary_len: config.max_summary_len,
        }
    }
}

/// Strip formatting artifacts (BOM, markdown fences, surrounding prose)
/// so an embedded JSON object can still be recovered.
pub fn clean_llm_output(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('\u{feff}').trim();

    if serde_json::from_str::<Value>(trimmed).is_ok() {
        return trimmed.to_string();
    }

    if let Some(inner) = fenced_block(trimmed)
        && serde_json::from_str::<Value>(inner).is_ok()
    {
        return inner.to_string();
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

/// Contents of the first ``` fenced block, without the language tag.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip the language tag line ("json", "JSON", ...)
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Lenient extraction of a JSON object from model text.
pub fn extract_json_object(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(&clean_llm_output(raw)) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Map an action name to an [`AgentAction`], ignoring case, `_`, `-` and spaces.
pub fn parse_action(s: &str) -> Option<AgentAction> {
    let normalized: String = s
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect();
    match normalized.as_str() {
        "plan" => Some(AgentAction::Plan),
        "toolcall" => Some(AgentAction::ToolCall),
        "multitoolcall" => Some(AgentAction::MultiToolCall),
        "finish" => Some(AgentAction::Finish),
        "retry" => Some(AgentAction::Retry),
        _ => None,
    }
}

/// Parse and validate one decision.
pub fn parse_model_output(
    raw: &str,
    limits: Option<&ParserLimits>,
) -> Result<ModelMessage, ParseError> {
    let limits = limits.copied().unwrap_or_default();
    let cleaned = clean_llm_output(raw);
    if cleaned.is_empty() {
        return Err(ParseError::Empty);
    }

    let value: Value =
        serde_json::from_str(&cleaned).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(ParseError::NotAnObject);
    };

    let thoughts = required_str(&obj, "thoughts")?;
    check_len("thoughts", thoughts, limits.max_thoughts_len)?;

    let action_name = match obj.get("action") {
        None | Some(Value::Null) => return Err(ParseError::MissingField("action")),
        Some(Value::String(s)) => s,
        Some(_) => {
            return Err(ParseError::WrongType {
                field: "action",
                expected: "a string",
            });
        }
    };
    let action =
        parse_action(action_name).ok_or_else(|| ParseError::InvalidAction(action_name.clone()))?;

    let input = match obj.get("action_input") {
        None | Some(Value::Null) => return Err(ParseError::MissingField("action_input")),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(ParseError::WrongType {
                field: "action_input",
                expected: "an object",
            });
        }
    };

    let action_input = match action {
        AgentAction::ToolCall => ActionInput::ToolCall(parse_tool_call(input)?),
        AgentAction::MultiToolCall => ActionInput::MultiToolCall {
            calls: parse_tool_calls(input)?,
        },
        AgentAction::Finish => {
            let final_output = match input.get("final") {
                None | Some(Value::Null) => {
                    return Err(ParseError::MissingField("action_input.final"));
                }
                Some(Value::String(s)) => s.clone(),
                Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
                Some(_) => {
                    return Err(ParseError::WrongType {
                        field: "action_input.final",
                        expected: "a string",
                    });
                }
            };
            if final_output.trim().is_empty() {
                return Err(ParseError::EmptyField("action_input.final"));
            }
            check_len("action_input.final", &final_output, limits.max_final_len)?;
            ActionInput::Finish { final_output }
        }
        AgentAction::Plan | AgentAction::Retry => {
            let summary = optional_str(input, "summary");
            if let Some(s) = &summary {
                check_len("action_input.summary", s, limits.max_summary_len)?;
            }
            ActionInput::Summary { summary }
        }
    };

    let mut msg = ModelMessage::new(thoughts, action, action_input);
    apply_optional_fields(&mut msg, &obj);
    Ok(msg)
}

fn required_str<'a>(obj: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, ParseError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(ParseError::MissingField(field)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ParseError::EmptyField(field)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ParseError::WrongType {
            field,
            expected: "a string",
        }),
    }
}

fn check_len(field: &'static str, value: &str, limit: Option<usize>) -> Result<(), ParseError> {
    if let Some(limit) = limit {
        let actual = value.chars().count();
        if actual > limit {
            return Err(ParseError::TooLong {
                field,
                limit,
                actual,
            });
        }
    }
    Ok(())
}

/// `params` may be absent (empty map), an object, or a JSON-encoded object string.
fn params_from(value: Option<&Value>) -> Result<ToolParams, String> {
    match value {
        None | Some(Value::Null) => Ok(ToolParams::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(ToolParams::new()),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err("params must be an object".into()),
        },
        Some(_) => Err("params must be an object".into()),
    }
}

fn parse_tool_call(input: &Map<String, Value>) -> Result<ToolCallRequest, ParseError> {
    let tool = match input.get("tool") {
        None | Some(Value::Null) => return Err(ParseError::MissingField("action_input.tool")),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(ParseError::EmptyField("action_input.tool"));
        }
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => {
            return Err(ParseError::WrongType {
                field: "action_input.tool",
                expected: "a string",
            });
        }
    };
    let params = params_from(input.get("params")).map_err(|_| ParseError::WrongType {
        field: "action_input.params",
        expected: "an object",
    })?;
    Ok(ToolCallRequest { tool, params })
}

fn parse_tool_calls(input: &Map<String, Value>) -> Result<Vec<ToolCallRequest>, ParseError> {
    let entries = match input.get("tool_calls") {
        None | Some(Value::Null) => {
            return Err(ParseError::MissingField("action_input.tool_calls"));
        }
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(ParseError::WrongType {
                field: "action_input.tool_calls",
                expected: "an array",
            });
        }
    };
    if entries.is_empty() {
        return Err(ParseError::EmptyField("action_input.tool_calls"));
    }

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let invalid = |reason: &str| ParseError::InvalidToolCall {
                index,
                reason: reason.to_string(),
            };
            let obj = entry.as_object().ok_or_else(|| invalid("expected an object"))?;
            let tool = obj
                .get("tool")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| invalid("missing 'tool'"))?;
            let params = params_from(obj.get("params")).map_err(|e| invalid(&e))?;
            Ok(ToolCallRequest {
                tool: tool.to_string(),
                params,
            })
        })
        .collect()
}

fn optional_str(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn truncate_chars(s: String, max: usize) -> String {
    if s.chars().count() <= max {
        s
    } else {
        s.chars().take(max).collect()
    }
}

fn unit_interval(obj: &Map<String, Value>, field: &str) -> Option<f64> {
    obj.get(field)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

fn string_list(obj: &Map<String, Value>, field: &str) -> Vec<String> {
    obj.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o.get("thought").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn apply_optional_fields(msg: &mut ModelMessage, obj: &Map<String, Value>) {
    msg.status_title = optional_str(obj, "status_title").map(|s| truncate_chars(s, STATUS_TITLE_MAX));
    msg.status_details =
        optional_str(obj, "status_details").map(|s| truncate_chars(s, STATUS_DETAILS_MAX));
    msg.next_step_hint =
        optional_str(obj, "next_step_hint").map(|s| truncate_chars(s, NEXT_STEP_HINT_MAX));
    msg.progress_pct = obj
        .get("progress_pct")
        .and_then(Value::as_f64)
        .filter(|p| (0.0..=100.0).contains(p))
        .map(|p| p.round() as u8);

    msg.reasoning_confidence = unit_interval(obj, "reasoning_confidence");
    msg.reasoning_type = optional_str(obj, "reasoning_type");
    msg.reasoning = optional_str(obj, "reasoning");
    msg.insights = string_list(obj, "insights");
    msg.conclusion = optional_str(obj, "conclusion");
    msg.is_valid = obj.get("is_valid").and_then(Value::as_bool);
    msg.error = optional_str(obj, "error");

    msg.thought = optional_str(obj, "thought");
    msg.thought_type = optional_str(obj, "thought_type");
    msg.score = unit_interval(obj, "score");
    msg.children = string_list(obj, "children");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> Result<ModelMessage, ParseError> {
        parse_model_output(&v.to_string(), None)
    }

    #[test]
    fn tool_call_roundtrips_required_fields() {
        let msg = parse(json!({
            "thoughts": "add the numbers",
            "action": "tool_call",
            "action_input": {"tool": "calculator", "params": {"operation": "add", "a": 2, "b": 2}}
        }))
        .unwrap();
        assert_eq!(msg.thoughts, "add the numbers");
        assert_eq!(msg.action, AgentAction::ToolCall);
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, "calculator");
        assert_eq!(calls[0].params["a"], 2);
    }

    #[test]
    fn finish_roundtrips_final() {
        let msg = parse(json!({
            "thoughts": "done",
            "action": "finish",
            "action_input": {"final": "4"}
        }))
        .unwrap();
        assert_eq!(msg.final_output(), Some("4"));
    }

    #[test]
    fn numeric_final_is_stringified() {
        let msg = parse(json!({
            "thoughts": "done",
            "action": "Finish",
            "action_input": {"final": 4}
        }))
        .unwrap();
        assert_eq!(msg.final_output(), Some("4"));
    }

    #[test]
    fn missing_thoughts_rejected() {
        let err = parse(json!({"action": "finish", "action_input": {"final": "x"}})).unwrap_err();
        assert_eq!(err, ParseError::MissingField("thoughts"));
    }

    #[test]
    fn blank_thoughts_rejected() {
        let err = parse(json!({"thoughts": "  ", "action": "finish", "action_input": {"final": "x"}}))
            .unwrap_err();
        assert_eq!(err, ParseError::EmptyField("thoughts"));
    }

    #[test]
    fn unknown_action_rejected() {
        let err = parse(json!({"thoughts": "t", "action": "dance", "action_input": {}})).unwrap_err();
        assert_eq!(err, ParseError::InvalidAction("dance".into()));
        assert!(err.to_string().contains("dance"));
    }

    #[test]
    fn tool_call_without_tool_rejected() {
        let err = parse(json!({"thoughts": "t", "action": "tool_call", "action_input": {"params": {}}}))
            .unwrap_err();
        assert_eq!(err, ParseError::MissingField("action_input.tool"));
    }

    #[test]
    fn absent_params_become_empty_map() {
        let msg = parse(json!({"thoughts": "t", "action": "tool_call", "action_input": {"tool": "clock"}}))
            .unwrap();
        assert!(msg.tool_calls()[0].params.is_empty());
    }

    #[test]
    fn stringified_params_accepted() {
        let msg = parse(json!({
            "thoughts": "t",
            "action": "tool_call",
            "action_input": {"tool": "calculator", "params": "{\"a\": 1}"}
        }))
        .unwrap();
        assert_eq!(msg.tool_calls()[0].params["a"], 1);
    }

    #[test]
    fn multi_tool_call_parsed_in_order() {
        let msg = parse(json!({
            "thoughts": "two things",
            "action": "multi_tool_call",
            "action_input": {"tool_calls": [
                {"tool": "a", "params": {"x": 1}},
                {"tool": "b"}
            ]}
        }))
        .unwrap();
        let names: Vec<_> = msg.tool_calls().iter().map(|c| c.tool.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn multi_tool_call_bad_entry_rejected() {
        let err = parse(json!({
            "thoughts": "t",
            "action": "multi_tool_call",
            "action_input": {"tool_calls": [{"tool": "a"}, {"params": {}}]}
        }))
        .unwrap_err();
        assert!(matches!(err, ParseError::InvalidToolCall { index: 1, .. }));
    }

    #[test]
    fn status_fields_truncated_to_caps() {
        let long = "x".repeat(500);
        let msg = parse(json!({
            "thoughts": "t",
            "action": "plan",
            "action_input": {"summary": "s"},
            "status_title": long,
            "status_details": long,
            "next_step_hint": long
        }))
        .unwrap();
        assert_eq!(msg.status_title.unwrap().chars().count(), STATUS_TITLE_MAX);
        assert_eq!(msg.status_details.unwrap().chars().count(), STATUS_DETAILS_MAX);
        assert_eq!(msg.next_step_hint.unwrap().chars().count(), NEXT_STEP_HINT_MAX);
    }

    #[test]
    fn progress_out_of_range_dropped() {
        let base = |p: Value| {
            parse(json!({
                "thoughts": "t", "action": "retry", "action_input": {}, "progress_pct": p
            }))
            .unwrap()
            .progress_pct
        };
        assert_eq!(base(json!(40)), Some(40));
        assert_eq!(base(json!(100)), Some(100));
        assert_eq!(base(json!(101)), None);
        assert_eq!(base(json!(-1)), None);
        assert_eq!(base(json!("50")), None);
    }

    #[test]
    fn limits_enforced() {
        let limits = ParserLimits {
            max_thoughts_len: Some(5),
            ..Default::default()
        };
        let raw = json!({"thoughts": "far too long", "action": "finish", "action_input": {"final": "x"}})
            .to_string();
        let err = parse_model_output(&raw, Some(&limits)).unwrap_err();
        assert!(matches!(err, ParseError::TooLong { field: "thoughts", limit: 5, .. }));

        let limits = ParserLimits {
            max_final_len: Some(2),
            ..Default::default()
        };
        let raw = json!({"thoughts": "t", "action": "finish", "action_input": {"final": "abc"}})
            .to_string();
        assert!(parse_model_output(&raw, Some(&limits)).is_err());
    }

    #[test]
    fn fenced_output_recovered() {
        let raw = "Sure! Here is my decision:\n```json\n{\"thoughts\": \"t\", \"action\": \"finish\", \"action_input\": {\"final\": \"ok\"}}\n```\nHope that helps.";
        let msg = parse_model_output(raw, None).unwrap();
        assert_eq!(msg.final_output(), Some("ok"));
    }

    #[test]
    fn embedded_object_recovered() {
        let raw = "I think {\"thoughts\": \"t\", \"action\": \"finish\", \"action_input\": {\"final\": \"ok\"}} is right";
        assert!(parse_model_output(raw, None).is_ok());
    }

    #[test]
    fn garbage_is_invalid_json() {
        assert!(matches!(
            parse_model_output("no json here", None),
            Err(ParseError::InvalidJson(_))
        ));
        assert_eq!(parse_model_output("   ", None), Err(ParseError::Empty));
        assert_eq!(parse_model_output("[1, 2]", None), Err(ParseError::NotAnObject));
    }

    #[test]
    fn reasoning_and_tree_fields_parsed() {
        let msg = parse(json!({
            "thoughts": "t",
            "action": "plan",
            "action_input": {},
            "reasoning_confidence": 1.7,
            "insights": ["a", 3, "b"],
            "is_valid": true,
            "thought": "idea",
            "score": 0.4,
            "children": ["c1", {"thought": "c2"}]
        }))
        .unwrap();
        assert_eq!(msg.reasoning_confidence, Some(1.0));
        assert_eq!(msg.insights, vec!["a", "b"]);
        assert_eq!(msg.is_valid, Some(true));
        assert_eq!(msg.thought.as_deref(), Some("idea"));
        assert_eq!(msg.score, Some(0.4));
        assert_eq!(msg.children, vec!["c1", "c2"]);
    }

    #[test]
    fn action_names_are_format_insensitive() {
        assert_eq!(parse_action("ToolCall"), Some(AgentAction::ToolCall));
        assert_eq!(parse_action("multi-tool-call"), Some(AgentAction::MultiToolCall));
        assert_eq!(parse_action("FINISH"), Some(AgentAction::Finish));
        assert_eq!(parse_action("tool call"), Some(AgentAction::ToolCall));
        assert_eq!(parse_action("stop"), None);
    }

    #[test]
    fn extract_object_is_lenient() {
        let map = extract_json_object("prefix {\"conclusion\": \"yes\"} suffix").unwrap();
        assert_eq!(map["conclusion"], "yes");
        assert!(extract_json_object("plain text").is_none());
    }
}
