use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AgentError;
use crate::llm_communicator::LlmCommunicator;
use crate::parser::{clean_llm_output, extract_json_object};
use crate::prompts;

/// Confidence assigned when the reply is not the requested JSON.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct ChainOfThoughtOutcome {
    pub reasoning: Option<String>,
    pub insights: Vec<String>,
    pub conclusion: String,
    pub confidence: f64,
}

/// Single-call step-by-step reasoning.
pub struct ChainOfThought {
    communicator: Arc<LlmCommunicator>,
}

impl ChainOfThought {
    pub fn new(communicator: Arc<LlmCommunicator>) -> Self {
        Self { communicator }
    }

    pub async fn reason(
        &self,
        goal: &str,
        context: &str,
        tools: &[String],
        agent_id: &str,
        turn_index: usize,
        cancel: &CancellationToken,
    ) -> Result<ChainOfThoughtOutcome, AgentError> {
        let reply = self
            .communicator
            .call_text(
                prompts::chain_of_thought_messages(goal, context, tools),
                agent_id,
                turn_index,
                cancel,
            )
            .await?;
        let outcome = parse_chain_of_thought(&reply);
        debug!(
            agent_id,
            turn_index,
            confidence = outcome.confidence,
            insights = outcome.insights.len(),
            "Chain-of-thought reasoning complete"
        );
        Ok(outcome)
    }
}

/// Lenient parse of a chain-of-thought reply.
pub fn parse_chain_of_thought(reply: &str) -> ChainOfThoughtOutcome {
    let Some(obj) = extract_json_object(reply) else {
        return ChainOfThoughtOutcome {
            reasoning: None,
            insights: Vec::new(),
            conclusion: clean_llm_output(reply),
            confidence: FALLBACK_CONFIDENCE,
        };
    };

    let text = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let reasoning = text("reasoning");
    let conclusion = text("conclusion")
        .or_else(|| reasoning.clone())
        .unwrap_or_else(|| clean_llm_output(reply));
    let insights = obj
        .get("insights")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o.get("thought").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    let confidence = obj
        .get("reasoning_confidence")
        .or_else(|| obj.get("confidence"))
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(FALLBACK_CONFIDENCE);

    ChainOfThoughtOutcome {
        reasoning,
        insights,
        conclusion,
        confidence,
    }
}
