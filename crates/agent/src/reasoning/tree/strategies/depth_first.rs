use async_trait::async_trait;
use ponder_config::ExplorationStrategyKind;

use super::{ExploreContext, ExplorationStrategy, SearchTracker, check_cancelled};
use crate::error::AgentError;
use crate::reasoning::tree::model::ReasoningTree;

/// Explicit-stack depth-first search. Children are pushed in reverse so the
/// first generated child is explored first.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthFirst;

#[async_trait]
impl ExplorationStrategy for DepthFirst {
    fn kind(&self) -> ExplorationStrategyKind {
        ExplorationStrategyKind::DepthFirst
    }

    async fn search(
        &self,
        tree: &mut ReasoningTree,
        ctx: &ExploreContext<'_>,
        tracker: &mut SearchTracker,
    ) -> Result<(), AgentError> {
        let mut stack: Vec<String> = tree.root_id().map(str::to_string).into_iter().collect();

        while let Some(id) = stack.pop() {
            check_cancelled(ctx.cancel)?;
            if tracker.exhausted(tree) {
                break;
            }
            if tracker.evaluate(tree, ctx, &id).await?.is_none() {
                continue;
            }

            let depth = tree.node(&id).map(|n| n.depth).unwrap_or_default();
            let children = tracker.expand(tree, ctx, &id).await?;
            stack.extend(children.into_iter().rev());
            tracker.report(ctx, depth);
        }
        Ok(())
    }
}
