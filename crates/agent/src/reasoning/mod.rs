//! Reasoning manager: an optional thinking pass before each decision.
//!
//! The configured [`ReasoningMode`] picks the pass: none, a single
//! chain-of-thought call, or a tree-of-thoughts search. Its conclusion is
//! handed to the decision prompt as a note.

pub mod chain_of_thought;
pub mod tree;

use ponder_config::{ReasoningConfig, ReasoningMode};
use ponder_core::event::EventSink;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::llm_communicator::LlmCommunicator;
use chain_of_thought::ChainOfThought;
use tree::TreeOfThoughtsEngine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningResult {
    pub mode: ReasoningMode,
    pub conclusion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insights: Vec<String>,
    /// In [0, 1].
    pub confidence: f64,
    pub nodes_explored: usize,
    pub max_depth_reached: usize,
    /// Thought texts along the best path (tree mode only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub best_path: Vec<String>,
}

impl ReasoningResult {
    /// Rendering for the decision prompt.
    pub fn prompt_note(&self) -> String {
        let mut note = format!("{} (confidence {:.2})", self.conclusion, self.confidence);
        if !self.insights.is_empty() {
            note.push_str("\nInsights:");
            for insight in &self.insights {
                note.push_str("\n- ");
                note.push_str(insight);
            }
        }
        note
    }
}

pub struct ReasoningManager {
    mode: ReasoningMode,
    chain: ChainOfThought,
    tree: TreeOfThoughtsEngine,
}

impl ReasoningManager {
    pub fn new(communicator: Arc<LlmCommunicator>, config: &ReasoningConfig) -> Self {
        Self {
            mode: config.mode,
            chain: ChainOfThought::new(communicator.clone()),
            tree: TreeOfThoughtsEngine::new(communicator, config.tree.clone()),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.tree = self.tree.with_events(events);
        self
    }

    pub fn mode(&self) -> ReasoningMode {
        self.mode
    }

    /// Run the configured pass. `Ok(None)` when reasoning is off.
    pub async fn reason(
        &self,
        goal: &str,
        context: &str,
        tools: &[String],
        agent_id: &str,
        turn_index: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<ReasoningResult>, AgentError> {
        match self.mode {
            ReasoningMode::None => Ok(None),
            ReasoningMode::ChainOfThought => {
                let outcome = self
                    .chain
                    .reason(goal, context, tools, agent_id, turn_index, cancel)
                    .await?;
                Ok(Some(ReasoningResult {
                    mode: self.mode,
                    conclusion: outcome.conclusion,
                    reasoning: outcome.reasoning,
                    insights: outcome.insights,
                    confidence: outcome.confidence,
                    nodes_explored: 0,
                    max_depth_reached: 0,
                    best_path: Vec::new(),
                }))
            }
            ReasoningMode::TreeOfThoughts => {
                let outcome = self
                    .tree
                    .reason(goal, context, tools, agent_id, turn_index, cancel)
                    .await?;
                Ok(Some(ReasoningResult {
                    mode: self.mode,
                    confidence: outcome.confidence(),
                    conclusion: outcome.conclusion,
                    reasoning: None,
                    insights: outcome.insights,
                    nodes_explored: outcome.exploration.nodes_explored,
                    max_depth_reached: outcome.exploration.max_depth_reached,
                    best_path: outcome.best_thoughts,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedLlmClient, ScriptedReply};
    use ponder_config::TreeConfig;
    use std::time::Duration;

    fn manager(mode: ReasoningMode, client: Arc<ScriptedLlmClient>) -> ReasoningManager {
        let comm = Arc::new(LlmCommunicator::new(client, Duration::from_secs(1)));
        ReasoningManager::new(
            comm,
            &ReasoningConfig {
                mode,
                tree: TreeConfig {
                    max_depth: 1,
                    max_nodes: 4,
                    ..TreeConfig::default()
                },
            },
        )
    }

    #[tokio::test]
    async fn none_mode_makes_no_calls() {
        let client = Arc::new(ScriptedLlmClient::new(vec![]));
        let result = manager(ReasoningMode::None, client.clone())
            .reason("goal", "", &[], "a1", 0, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn chain_of_thought_uses_one_call() {
        let client = Arc::new(ScriptedLlmClient::new(vec![ScriptedReply::text(
            r#"{"conclusion": "add", "reasoning_confidence": 0.8}"#,
        )]));
        let result = manager(ReasoningMode::ChainOfThought, client.clone())
            .reason("goal", "", &[], "a1", 0, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.conclusion, "add");
        assert_eq!(result.confidence, 0.8);
        assert_eq!(client.call_count(), 1);
        assert_eq!(result.prompt_note(), "add (confidence 0.80)");
    }

    #[tokio::test]
    async fn tree_mode_reports_exploration_stats() {
        let client = Arc::new(ScriptedLlmClient::repeating(ScriptedReply::text(
            r#"{"thought": "t", "children": ["x", "y", "z"], "score": 0.7, "conclusion": "go"}"#,
        )));
        let result = manager(ReasoningMode::TreeOfThoughts, client)
            .reason("goal", "", &[], "a1", 0, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.mode, ReasoningMode::TreeOfThoughts);
        assert_eq!(result.conclusion, "go");
        assert_eq!(result.nodes_explored, 4);
        assert_eq!(result.max_depth_reached, 1);
        assert!((result.confidence - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cancellation_propagates() {
        let client = Arc::new(ScriptedLlmClient::repeating(ScriptedReply::text("{}")));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = manager(ReasoningMode::TreeOfThoughts, client)
            .reason("goal", "", &[], "a1", 0, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
