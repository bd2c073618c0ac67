use async_trait::async_trait;
use ponder_config::ExplorationStrategyKind;

use super::{ExploreContext, ExplorationStrategy, SearchTracker, check_cancelled};
use crate::error::AgentError;
use crate::reasoning::tree::model::ReasoningTree;

/// Level-synchronous search that carries only the `beam_width` best
/// children of each level forward. The rest stay in the tree untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeamSearch;

#[async_trait]
impl ExplorationStrategy for BeamSearch {
    fn kind(&self) -> ExplorationStrategyKind {
        ExplorationStrategyKind::BeamSearch
    }

    async fn search(
        &self,
        tree: &mut ReasoningTree,
        ctx: &ExploreContext<'_>,
        tracker: &mut SearchTracker,
    ) -> Result<(), AgentError> {
        let beam_width = ctx.config.beam_width.max(1);
        let root = tree.root_id().map(str::to_string).unwrap_or_default();

        check_cancelled(ctx.cancel)?;
        if tracker.evaluate(tree, ctx, &root).await?.is_none() {
            return Ok(());
        }

        let mut beam = vec![root];
        let mut depth = 0;
        'levels: while !beam.is_empty() {
            let mut scored: Vec<(String, f64)> = Vec::new();
            for id in &beam {
                check_cancelled(ctx.cancel)?;
                if tracker.exhausted(tree) {
                    break 'levels;
                }
                for child in tracker.expand(tree, ctx, id).await? {
                    if tracker.exhausted(tree) {
                        break;
                    }
                    if let Some(score) = tracker.evaluate(tree, ctx, &child).await? {
                        scored.push((child, score));
                    }
                }
            }

            depth += 1;
            tracker.report(ctx, depth);

            // Stable sort keeps generation order among equal scores
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));
            scored.truncate(beam_width);
            beam = scored.into_iter().map(|(id, _)| id).collect();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::explore;
    use super::super::test_support::*;
    use super::*;
    use ponder_config::TreeConfig;
    use ponder_core::event::NoopEventSink;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn keeps_only_the_top_children() {
        let config = TreeConfig {
            beam_width: 1,
            ..config(ExplorationStrategyKind::BeamSearch)
        };
        let evaluator = TableEvaluator::new(0.5, &[("r.1", 0.9), ("r.1.2", 0.8)]);
        let cancel = CancellationToken::new();
        let mut tree = rooted_tree(&config);
        let ctx = context(&config, &evaluator, &NoopEventSink, &cancel);

        let result = explore(&BeamSearch, &mut tree, &ctx).await.unwrap();
        // Only r.1 was expanded at depth 1, only r.1.2 at depth 2
        assert!(!evaluator.calls().iter().any(|c| c.starts_with("r.0.") || c.starts_with("r.2.")));
        assert!(evaluator.calls().contains(&"r.1.2.0".to_string()));
        assert_eq!(result.nodes_explored, 10);
        // r.1 outscores everything but has children; the path runs to the
        // deepest of the tied leaves under it
        assert_eq!(best_thoughts(&tree, &result), vec!["r", "r.1", "r.1.2", "r.1.2.0"]);
        assert!((result.best_path_score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn default_width_expands_a_full_level() {
        let config = config(ExplorationStrategyKind::BeamSearch);
        let evaluator = TableEvaluator::new(0.5, &[]);
        let cancel = CancellationToken::new();
        let mut tree = rooted_tree(&config);
        let ctx = context(&config, &evaluator, &NoopEventSink, &cancel);

        let result = explore(&BeamSearch, &mut tree, &ctx).await.unwrap();
        // root + 3 + 9, then the capacity of 20 cuts level three short
        assert_eq!(result.nodes_explored, 20);
        assert_eq!(result.max_depth_reached, 3);
    }
}
