use async_trait::async_trait;
use ponder_config::ExplorationStrategyKind;
use std::collections::VecDeque;

use super::{ExploreContext, ExplorationStrategy, SearchTracker, check_cancelled};
use crate::error::AgentError;
use crate::reasoning::tree::model::ReasoningTree;

/// Level-order search over a FIFO queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreadthFirst;

#[async_trait]
impl ExplorationStrategy for BreadthFirst {
    fn kind(&self) -> ExplorationStrategyKind {
        ExplorationStrategyKind::BreadthFirst
    }

    async fn search(
        &self,
        tree: &mut ReasoningTree,
        ctx: &ExploreContext<'_>,
        tracker: &mut SearchTracker,
    ) -> Result<(), AgentError> {
        let mut queue: VecDeque<String> = tree.root_id().map(str::to_string).into_iter().collect();

        while let Some(id) = queue.pop_front() {
            check_cancelled(ctx.cancel)?;
            if tracker.exhausted(tree) {
                break;
            }
            if tracker.evaluate(tree, ctx, &id).await?.is_none() {
                continue;
            }

            let depth = tree.node(&id).map(|n| n.depth).unwrap_or_default();
            queue.extend(tracker.expand(tree, ctx, &id).await?);
            tracker.report(ctx, depth);
        }
        Ok(())
    }
}
