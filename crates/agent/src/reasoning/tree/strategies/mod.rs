//! Exploration strategies over a [`ReasoningTree`].
//!
//! Every strategy shares one contract: start from an existing root, never
//! evaluate more than `max_nodes` nodes, evaluate a node before deciding
//! whether to expand it, prune anything scoring under the threshold, and
//! check the caller's token once per iteration. The reported best path
//! always ends at an explored leaf (see [`ReasoningTree::best_leaf`]).

mod beam_search;
mod best_first;
mod breadth_first;
mod depth_first;
mod monte_carlo;

pub use beam_search::BeamSearch;
pub use best_first::BestFirst;
pub use breadth_first::BreadthFirst;
pub use depth_first::DepthFirst;
pub use monte_carlo::MonteCarlo;

use async_trait::async_trait;
use chrono::Utc;
use ponder_config::{ExplorationStrategyKind, TreeConfig};
use ponder_core::event::{AgentEvent, EventSink};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::model::{ReasoningTree, ThoughtType};
use crate::error::{AgentError, TreeError};

/// A thought proposed by the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedThought {
    pub thought: String,
    pub thought_type: ThoughtType,
}

impl GeneratedThought {
    pub fn new(thought: impl Into<String>, thought_type: ThoughtType) -> Self {
        Self {
            thought: thought.into(),
            thought_type,
        }
    }
}

/// Proposes thoughts.
#[async_trait]
pub trait ThoughtGenerator: Send + Sync {
    /// The starting thought for `goal`.
    async fn generate_root(
        &self,
        goal: &str,
        context: &str,
        tools: &[String],
        cancel: &CancellationToken,
    ) -> Result<GeneratedThought, AgentError>;

    /// Up to `count` thoughts extending the chain `path`.
    async fn generate_children(
        &self,
        goal: &str,
        path: &[String],
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<GeneratedThought>, AgentError>;
}

/// Scores the last thought of a chain in [0, 1].
#[async_trait]
pub trait NodeEvaluator: Send + Sync {
    async fn evaluate(&self, goal: &str, path: &[String], cancel: &CancellationToken) -> Result<f64, AgentError>;
}

/// Everything a strategy needs besides the tree.
pub struct ExploreContext<'a> {
    pub goal: &'a str,
    pub config: &'a TreeConfig,
    pub generator: &'a dyn ThoughtGenerator,
    pub evaluator: &'a dyn NodeEvaluator,
    pub events: &'a dyn EventSink,
    pub agent_id: &'a str,
    pub cancel: &'a CancellationToken,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplorationResult {
    pub success: bool,
    /// Node ids from the root to the best explored leaf.
    pub best_path: Vec<String>,
    pub best_path_score: f64,
    pub nodes_explored: usize,
    pub max_depth_reached: usize,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

/// Bookkeeping shared by all strategies.
#[derive(Debug)]
pub struct SearchTracker {
    kind: ExplorationStrategyKind,
    nodes_explored: usize,
    max_depth_reached: usize,
    started: Instant,
}

impl SearchTracker {
    fn new(kind: ExplorationStrategyKind) -> Self {
        Self {
            kind,
            nodes_explored: 0,
            max_depth_reached: 0,
            started: Instant::now(),
        }
    }

    pub fn nodes_explored(&self) -> usize {
        self.nodes_explored
    }

    /// Score of the best explored leaf so far.
    pub fn best_leaf_score(&self, tree: &ReasoningTree) -> Option<f64> {
        tree.best_leaf().map(|(_, score)| score)
    }

    /// True once the explored-node ceiling is hit.
    pub fn exhausted(&self, tree: &ReasoningTree) -> bool {
        self.nodes_explored >= tree.max_nodes
    }

    /// Score `id` and prune it if it falls under the threshold. Returns the
    /// score, or `None` when the node is or became pruned.
    pub async fn evaluate(
        &mut self,
        tree: &mut ReasoningTree,
        ctx: &ExploreContext<'_>,
        id: &str,
    ) -> Result<Option<f64>, AgentError> {
        let node = tree
            .node(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))?;
        if node.is_pruned() {
            return Ok(None);
        }
        if node.is_evaluated() {
            return Ok(Some(node.score));
        }
        let depth = node.depth;
        let is_root = node.parent_id.is_none();

        let path = tree.path_to(id)?;
        let score = ctx
            .evaluator
            .evaluate(ctx.goal, &tree.thoughts(&path), ctx.cancel)
            .await?;
        tree.set_score(id, score)?;
        let score = tree.node(id).map(|n| n.score).unwrap_or_default();

        self.nodes_explored += 1;
        self.max_depth_reached = self.max_depth_reached.max(depth);

        if !is_root && score < ctx.config.prune_threshold {
            let pruned = tree.prune(id)?;
            debug!(strategy = %self.kind, depth, score, pruned, "Pruned thought");
            return Ok(None);
        }
        Ok(Some(score))
    }

    /// Generate children for `id` (bounded by the branching factor and the
    /// remaining room in the tree). Returns the new ids in generation order.
    pub async fn expand(
        &mut self,
        tree: &mut ReasoningTree,
        ctx: &ExploreContext<'_>,
        id: &str,
    ) -> Result<Vec<String>, AgentError> {
        if !tree.can_expand(id) {
            return Ok(Vec::new());
        }
        let room = tree.max_nodes.saturating_sub(tree.len());
        let count = ctx.config.branching_factor.min(room);
        if count == 0 {
            return Ok(Vec::new());
        }

        let path = tree.path_to(id)?;
        let generated = ctx
            .generator
            .generate_children(ctx.goal, &tree.thoughts(&path), count, ctx.cancel)
            .await?;

        let mut ids = Vec::with_capacity(generated.len());
        for thought in generated.into_iter().take(count) {
            match tree.add_child(id, thought.thought, thought.thought_type) {
                Ok(child) => ids.push(child),
                Err(TreeError::AtCapacity { .. }) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(ids)
    }

    /// Publish a progress event. Purely observational.
    pub fn report(&self, ctx: &ExploreContext<'_>, depth: usize) {
        ctx.events.publish(AgentEvent::ReasoningProgress {
            agent_id: ctx.agent_id.to_string(),
            strategy: self.kind.as_str().to_string(),
            depth,
            nodes_explored: self.nodes_explored,
            timestamp: Utc::now(),
        });
    }

    fn finish(self, tree: &ReasoningTree, outcome: Result<(), AgentError>) -> Result<ExplorationResult, AgentError> {
        let error = match outcome {
            Ok(()) => None,
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(e) => {
                warn!(strategy = %self.kind, error = %e, "Exploration stopped early");
                Some(e.to_string())
            }
        };

        let (best_path, best_path_score) = match tree.best_leaf() {
            Some((id, score)) => (tree.path_to(&id)?, score),
            None => (Vec::new(), 0.0),
        };
        Ok(ExplorationResult {
            success: !best_path.is_empty(),
            best_path,
            best_path_score,
            nodes_explored: self.nodes_explored,
            max_depth_reached: self.max_depth_reached,
            execution_time_ms: self.started.elapsed().as_millis() as u64,
            error,
        })
    }
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), AgentError> {
    if cancel.is_cancelled() {
        Err(AgentError::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
pub trait ExplorationStrategy: Send + Sync {
    fn kind(&self) -> ExplorationStrategyKind;

    /// Walk the tree from its root, recording progress in `tracker`.
    async fn search(
        &self,
        tree: &mut ReasoningTree,
        ctx: &ExploreContext<'_>,
        tracker: &mut SearchTracker,
    ) -> Result<(), AgentError>;
}

/// The strategy implementation for `kind`.
pub fn strategy_for(kind: ExplorationStrategyKind) -> Box<dyn ExplorationStrategy> {
    match kind {
        ExplorationStrategyKind::BestFirst => Box::new(BestFirst),
        ExplorationStrategyKind::BreadthFirst => Box::new(BreadthFirst),
        ExplorationStrategyKind::DepthFirst => Box::new(DepthFirst),
        ExplorationStrategyKind::BeamSearch => Box::new(BeamSearch),
        ExplorationStrategyKind::MonteCarlo => Box::new(MonteCarlo),
    }
}

/// Run `strategy` over `tree`.
///
/// Generator or evaluator failures end the search early and are reported in
/// [`ExplorationResult::error`]; cancellation and a missing root are errors.
pub async fn explore(
    strategy: &dyn ExplorationStrategy,
    tree: &mut ReasoningTree,
    ctx: &ExploreContext<'_>,
) -> Result<ExplorationResult, AgentError> {
    if tree.root_id().is_none() {
        return Err(TreeError::MissingRoot.into());
    }
    let mut tracker = SearchTracker::new(strategy.kind());
    let outcome = strategy.search(tree, ctx, &mut tracker).await;
    let result = tracker.finish(tree, outcome)?;
    debug!(
        strategy = %strategy.kind(),
        nodes_explored = result.nodes_explored,
        max_depth = result.max_depth_reached,
        best_score = result.best_path_score,
        elapsed_ms = result.execution_time_ms,
        "Exploration finished"
    );
    Ok(result)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::test_helpers::RecordingEventSink;
    use ponder_core::event::NoopEventSink;

    #[tokio::test]
    async fn every_strategy_respects_the_node_ceiling() {
        for kind in ExplorationStrategyKind::ALL {
            let config = TreeConfig {
                max_nodes: 7,
                ..config(kind)
            };
            let evaluator = TableEvaluator::new(0.5, &[]);
            let cancel = CancellationToken::new();
            let mut tree = rooted_tree(&config);
            let ctx = context(&config, &evaluator, &NoopEventSink, &cancel);

            let result = explore(strategy_for(kind).as_ref(), &mut tree, &ctx).await.unwrap();
            assert!(result.nodes_explored <= 7, "{kind}: {}", result.nodes_explored);
            assert!(tree.len() <= 7, "{kind}");
            assert!(result.success, "{kind}");
        }
    }

    #[tokio::test]
    async fn every_strategy_returns_a_root_anchored_path() {
        for kind in ExplorationStrategyKind::ALL {
            let config = config(kind);
            let evaluator = TableEvaluator::new(0.5, &[("r.1", 0.9), ("r.1.0", 0.95)]);
            let cancel = CancellationToken::new();
            let mut tree = rooted_tree(&config);
            let ctx = context(&config, &evaluator, &NoopEventSink, &cancel);

            let result = explore(strategy_for(kind).as_ref(), &mut tree, &ctx).await.unwrap();
            assert_eq!(result.best_path.first().map(String::as_str), tree.root_id(), "{kind}");
            let depths: Vec<usize> = result
                .best_path
                .iter()
                .map(|id| tree.node(id).unwrap().depth)
                .collect();
            assert!(depths.iter().enumerate().all(|(i, d)| *d == i), "{kind}: {depths:?}");
            assert!(result.max_depth_reached <= config.max_depth);
        }
    }

    #[tokio::test]
    async fn a_strong_root_does_not_cut_the_best_path_short() {
        for kind in ExplorationStrategyKind::ALL {
            let config = config(kind);
            let evaluator = TableEvaluator::new(0.5, &[("r", 0.95)]);
            let cancel = CancellationToken::new();
            let mut tree = rooted_tree(&config);
            let ctx = context(&config, &evaluator, &NoopEventSink, &cancel);

            let result = explore(strategy_for(kind).as_ref(), &mut tree, &ctx).await.unwrap();
            assert!(result.best_path.len() > 1, "{kind}: {:?}", best_thoughts(&tree, &result));
            let last = result.best_path.last().unwrap();
            assert!(tree.is_explored_leaf(last), "{kind}");
            assert!((result.best_path_score - 0.5).abs() < 1e-9, "{kind}");
        }
    }

    #[tokio::test]
    async fn pruned_nodes_never_appear_in_the_best_path() {
        for kind in ExplorationStrategyKind::ALL {
            let config = config(kind);
            let evaluator = TableEvaluator::new(0.1, &[("r.0", 0.5)]);
            let cancel = CancellationToken::new();
            let mut tree = rooted_tree(&config);
            let ctx = context(&config, &evaluator, &NoopEventSink, &cancel);

            let result = explore(strategy_for(kind).as_ref(), &mut tree, &ctx).await.unwrap();
            assert!(result.best_path.iter().all(|id| !tree.is_pruned(id)), "{kind}");
            tree.complete(result.best_path.clone()).unwrap();
        }
    }

    #[tokio::test]
    async fn cancellation_is_honored_between_iterations() {
        for kind in ExplorationStrategyKind::ALL {
            let config = config(kind);
            let evaluator = TableEvaluator::new(0.5, &[]);
            let cancel = CancellationToken::new();
            cancel.cancel();
            let mut tree = rooted_tree(&config);
            let ctx = context(&config, &evaluator, &NoopEventSink, &cancel);

            let err = explore(strategy_for(kind).as_ref(), &mut tree, &ctx).await.unwrap_err();
            assert!(err.is_cancelled(), "{kind}");
        }
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let config = config(ExplorationStrategyKind::BestFirst);
        let evaluator = TableEvaluator::new(0.5, &[]);
        let cancel = CancellationToken::new();
        let mut tree = ReasoningTree::new(3, 20, ExplorationStrategyKind::BestFirst);
        let ctx = context(&config, &evaluator, &NoopEventSink, &cancel);
        let err = explore(&BestFirst, &mut tree, &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::Tree(TreeError::MissingRoot)));
    }

    #[tokio::test]
    async fn progress_is_reported() {
        let config = config(ExplorationStrategyKind::BreadthFirst);
        let evaluator = TableEvaluator::new(0.5, &[]);
        let cancel = CancellationToken::new();
        let events = RecordingEventSink::default();
        let mut tree = rooted_tree(&config);
        let ctx = context(&config, &evaluator, &events, &cancel);

        explore(&BreadthFirst, &mut tree, &ctx).await.unwrap();
        assert!(events.types().iter().all(|t| *t == "reasoning_progress"));
        assert!(!events.types().is_empty());
    }

    #[test]
    fn factory_is_exhaustive() {
        for kind in ExplorationStrategyKind::ALL {
            assert_eq!(strategy_for(kind).kind(), kind);
        }
    }
}
