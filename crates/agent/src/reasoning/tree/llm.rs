//! LLM-backed thought generation and evaluation.
//!
//! Replies are parsed leniently: a reply that is not the requested JSON
//! still yields something usable (the raw text as a thought, a neutral
//! score) rather than failing the search.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::model::ThoughtType;
use super::strategies::{GeneratedThought, NodeEvaluator, ThoughtGenerator};
use crate::error::AgentError;
use crate::llm_communicator::LlmCommunicator;
use crate::parser::{clean_llm_output, extract_json_object};
use crate::prompts;

/// Score used when the evaluator's reply carries no usable number.
pub const NEUTRAL_SCORE: f64 = 0.5;

pub struct LlmThoughtGenerator {
    communicator: Arc<LlmCommunicator>,
    agent_id: String,
    turn_index: usize,
}

impl LlmThoughtGenerator {
    pub fn new(communicator: Arc<LlmCommunicator>, agent_id: impl Into<String>, turn_index: usize) -> Self {
        Self {
            communicator,
            agent_id: agent_id.into(),
            turn_index,
        }
    }
}

#[async_trait]
impl ThoughtGenerator for LlmThoughtGenerator {
    async fn generate_root(
        &self,
        goal: &str,
        context: &str,
        tools: &[String],
        cancel: &CancellationToken,
    ) -> Result<GeneratedThought, AgentError> {
        let reply = self
            .communicator
            .call_text(
                prompts::root_thought_messages(goal, context, tools),
                &self.agent_id,
                self.turn_index,
                cancel,
            )
            .await?;

        let parsed = extract_json_object(&reply)
            .and_then(|obj| thought_from_object(&obj, ThoughtType::Hypothesis));
        Ok(parsed.unwrap_or_else(|| {
            let text = clean_llm_output(&reply);
            let text = if text.is_empty() { goal.to_string() } else { text };
            GeneratedThought::new(text, ThoughtType::Hypothesis)
        }))
    }

    async fn generate_children(
        &self,
        goal: &str,
        path: &[String],
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<GeneratedThought>, AgentError> {
        let reply = self
            .communicator
            .call_text(
                prompts::expand_thought_messages(goal, path, count),
                &self.agent_id,
                self.turn_index,
                cancel,
            )
            .await?;
        let children = parse_children(&reply, count);
        debug!(
            agent_id = %self.agent_id,
            depth = path.len(),
            requested = count,
            generated = children.len(),
            "Generated thoughts"
        );
        Ok(children)
    }
}

pub struct LlmNodeEvaluator {
    communicator: Arc<LlmCommunicator>,
    agent_id: String,
    turn_index: usize,
}

impl LlmNodeEvaluator {
    pub fn new(communicator: Arc<LlmCommunicator>, agent_id: impl Into<String>, turn_index: usize) -> Self {
        Self {
            communicator,
            agent_id: agent_id.into(),
            turn_index,
        }
    }
}

#[async_trait]
impl NodeEvaluator for LlmNodeEvaluator {
    async fn evaluate(&self, goal: &str, path: &[String], cancel: &CancellationToken) -> Result<f64, AgentError> {
        let reply = self
            .communicator
            .call_text(
                prompts::evaluate_thought_messages(goal, path),
                &self.agent_id,
                self.turn_index,
                cancel,
            )
            .await?;
        Ok(parse_score(&reply).unwrap_or_else(|| {
            debug!(agent_id = %self.agent_id, "Evaluation reply had no score");
            NEUTRAL_SCORE
        }))
    }
}

fn thought_from_object(obj: &Map<String, Value>, default_type: ThoughtType) -> Option<GeneratedThought> {
    let text = obj.get("thought").and_then(Value::as_str)?.trim();
    if text.is_empty() {
        return None;
    }
    let thought_type = obj
        .get("thought_type")
        .and_then(Value::as_str)
        .map(ThoughtType::parse)
        .unwrap_or(default_type);
    Some(GeneratedThought::new(text, thought_type))
}

/// Children from `{"children": [...]}`, where entries are strings or
/// `{thought, thought_type}` objects. Falls back to one thought per
/// non-empty line of the reply.
pub fn parse_children(reply: &str, count: usize) -> Vec<GeneratedThought> {
    let from_json = extract_json_object(reply)
        .and_then(|obj| obj.get("children").and_then(Value::as_array).cloned())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.trim().is_empty() => {
                        Some(GeneratedThought::new(s.trim(), ThoughtType::Analysis))
                    }
                    Value::Object(obj) => thought_from_object(obj, ThoughtType::Analysis),
                    _ => None,
                })
                .collect::<Vec<_>>()
        });

    let mut children = match from_json {
        Some(children) if !children.is_empty() => children,
        _ => reply
            .lines()
            .map(|l| l.trim().trim_start_matches(['-', '*']).trim())
            .filter(|l| !l.is_empty() && !l.starts_with('{') && !l.starts_with('}') && !l.starts_with("```"))
            .map(|l| GeneratedThought::new(l, ThoughtType::Analysis))
            .collect(),
    };
    children.truncate(count);
    children
}

/// The `score` field (number or numeric string), clamped to [0, 1].
pub fn parse_score(reply: &str) -> Option<f64> {
    let obj = extract_json_object(reply)?;
    let score = match obj.get("score")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    score.is_finite().then(|| score.clamp(0.0, 1.0))
}
