use ponder_config::TreeConfig;
use ponder_core::event::{EventSink, NoopEventSink};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::llm::{LlmNodeEvaluator, LlmThoughtGenerator};
use super::model::ReasoningTree;
use super::strategies::{
    ExplorationResult, ExploreContext, NodeEvaluator, ThoughtGenerator, explore, strategy_for,
};
use crate::error::AgentError;
use crate::llm_communicator::LlmCommunicator;
use crate::parser::{clean_llm_output, extract_json_object};
use crate::prompts;

/// What one tree-of-thoughts pass produced.
#[derive(Debug, Clone)]
pub struct TreeOutcome {
    pub tree: ReasoningTree,
    pub exploration: ExplorationResult,
    /// Thought texts along the best path, root first.
    pub best_thoughts: Vec<String>,
    pub conclusion: String,
    pub insights: Vec<String>,
}

impl TreeOutcome {
    /// Confidence is the best path's score.
    pub fn confidence(&self) -> f64 {
        self.exploration.best_path_score
    }
}

pub struct TreeOfThoughtsEngine {
    communicator: Arc<LlmCommunicator>,
    config: TreeConfig,
    events: Arc<dyn EventSink>,
}

impl TreeOfThoughtsEngine {
    pub fn new(communicator: Arc<LlmCommunicator>, config: TreeConfig) -> Self {
        Self {
            communicator,
            config,
            events: Arc::new(NoopEventSink),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Root, explore, synthesize, complete. Generation and evaluation go
    /// through the LLM.
    pub async fn reason(
        &self,
        goal: &str,
        context: &str,
        tools: &[String],
        agent_id: &str,
        turn_index: usize,
        cancel: &CancellationToken,
    ) -> Result<TreeOutcome, AgentError> {
        let generator = LlmThoughtGenerator::new(self.communicator.clone(), agent_id, turn_index);
        let evaluator = LlmNodeEvaluator::new(self.communicator.clone(), agent_id, turn_index);
        self.reason_with(&generator, &evaluator, goal, context, tools, agent_id, turn_index, cancel)
            .await
    }

    /// [`reason`](Self::reason) with caller-supplied generation and evaluation.
    #[allow(clippy::too_many_arguments)]
    pub async fn reason_with(
        &self,
        generator: &dyn ThoughtGenerator,
        evaluator: &dyn NodeEvaluator,
        goal: &str,
        context: &str,
        tools: &[String],
        agent_id: &str,
        turn_index: usize,
        cancel: &CancellationToken,
    ) -> Result<TreeOutcome, AgentError> {
        let config = &self.config;
        let mut tree = ReasoningTree::new(config.max_depth, config.max_nodes, config.strategy);

        let root = generator.generate_root(goal, context, tools, cancel).await?;
        tree.create_root(root.thought, root.thought_type)?;

        let strategy = strategy_for(config.strategy);
        let ctx = ExploreContext {
            goal,
            config,
            generator,
            evaluator,
            events: self.events.as_ref(),
            agent_id,
            cancel,
        };
        let exploration = explore(strategy.as_ref(), &mut tree, &ctx).await?;

        let best_thoughts = tree.thoughts(&exploration.best_path);
        let (conclusion, insights) = self
            .synthesize(goal, &best_thoughts, agent_id, turn_index, cancel)
            .await?;
        tree.complete(exploration.best_path.clone())?;

        info!(
            agent_id,
            turn_index,
            strategy = %config.strategy,
            nodes_explored = exploration.nodes_explored,
            max_depth = exploration.max_depth_reached,
            confidence = exploration.best_path_score,
            elapsed_ms = exploration.execution_time_ms,
            "Tree-of-thoughts reasoning complete"
        );

        Ok(TreeOutcome {
            tree,
            exploration,
            best_thoughts,
            conclusion,
            insights,
        })
    }

    /// One LLM call turning the best path into a conclusion. A failed call
    /// falls back to the deepest thought on the path.
    async fn synthesize(
        &self,
        goal: &str,
        path: &[String],
        agent_id: &str,
        turn_index: usize,
        cancel: &CancellationToken,
    ) -> Result<(String, Vec<String>), AgentError> {
        let fallback = path.last().cloned().unwrap_or_default();
        let reply = match self
            .communicator
            .call_text(prompts::synthesis_messages(goal, path), agent_id, turn_index, cancel)
            .await
        {
            Ok(reply) => reply,
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(e) => {
                warn!(agent_id, turn_index, error = %e, "Synthesis failed, using best thought");
                return Ok((fallback, Vec::new()));
            }
        };

        let Some(obj) = extract_json_object(&reply) else {
            let text = clean_llm_output(&reply);
            return Ok((if text.is_empty() { fallback } else { text }, Vec::new()));
        };
        let conclusion = obj
            .get("conclusion")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or(fallback);
        let insights = obj
            .get("insights")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok((conclusion, insights))
    }
}
