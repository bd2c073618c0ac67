use async_trait::async_trait;
use ponder_config::ExplorationStrategyKind;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::{ExploreContext, ExplorationStrategy, SearchTracker, check_cancelled};
use crate::error::AgentError;
use crate::reasoning::tree::model::ReasoningTree;

/// Frontier entry: highest score first, earlier discovery on ties.
#[derive(Debug)]
struct Candidate {
    score: f64,
    seq: Reverse<u64>,
    id: String,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Priority-queue search with two early stops: a leaf (a node that can no
/// longer be expanded) above `early_stop_score`, or a best leaf above
/// `good_enough_score` once `good_enough_min_nodes` nodes have been
/// explored.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestFirst;

#[async_trait]
impl ExplorationStrategy for BestFirst {
    fn kind(&self) -> ExplorationStrategyKind {
        ExplorationStrategyKind::BestFirst
    }

    async fn search(
        &self,
        tree: &mut ReasoningTree,
        ctx: &ExploreContext<'_>,
        tracker: &mut SearchTracker,
    ) -> Result<(), AgentError> {
        let config = ctx.config;
        let root = tree.root_id().map(str::to_string).unwrap_or_default();

        check_cancelled(ctx.cancel)?;
        let Some(root_score) = tracker.evaluate(tree, ctx, &root).await? else {
            return Ok(());
        };

        let mut seq = 0u64;
        let mut frontier = BinaryHeap::new();
        frontier.push(Candidate {
            score: root_score,
            seq: Reverse(seq),
            id: root,
        });

        while let Some(Candidate { id, .. }) = frontier.pop() {
            check_cancelled(ctx.cancel)?;
            if tracker.exhausted(tree) {
                break;
            }
            if tree.is_pruned(&id) {
                continue;
            }

            let depth = tree.node(&id).map(|n| n.depth).unwrap_or_default();
            let children = tracker.expand(tree, ctx, &id).await?;
            for child in children {
                if tracker.exhausted(tree) {
                    break;
                }
                let Some(score) = tracker.evaluate(tree, ctx, &child).await? else {
                    continue;
                };

                // Nothing can grow under it, so it ends its chain
                let is_leaf = !tree.can_expand(&child);
                if is_leaf && score > config.early_stop_score {
                    tracker.report(ctx, depth + 1);
                    return Ok(());
                }
                seq += 1;
                frontier.push(Candidate {
                    score,
                    seq: Reverse(seq),
                    id: child,
                });
            }
            tracker.report(ctx, depth + 1);

            if tracker.nodes_explored() >= config.good_enough_min_nodes
                && tracker
                    .best_leaf_score(tree)
                    .is_some_and(|s| s > config.good_enough_score)
            {
                break;
            }
        }
        Ok(())
    }
}
