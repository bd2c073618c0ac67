use async_trait::async_trait;
use ponder_config::ExplorationStrategyKind;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{ExploreContext, ExplorationStrategy, SearchTracker, check_cancelled};
use crate::error::AgentError;
use crate::reasoning::tree::model::ReasoningTree;

/// Independent random walks from the root.
///
/// At each step the walk continues with `continue_probability` into a
/// uniformly chosen live child, generating children on first visit.
/// `seed` makes the walks reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonteCarlo;

#[async_trait]
impl ExplorationStrategy for MonteCarlo {
    fn kind(&self) -> ExplorationStrategyKind {
        ExplorationStrategyKind::MonteCarlo
    }

    async fn search(
        &self,
        tree: &mut ReasoningTree,
        ctx: &ExploreContext<'_>,
        tracker: &mut SearchTracker,
    ) -> Result<(), AgentError> {
        let config = ctx.config;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let root = tree.root_id().map(str::to_string).unwrap_or_default();

        check_cancelled(ctx.cancel)?;
        if tracker.evaluate(tree, ctx, &root).await?.is_none() {
            return Ok(());
        }

        for _ in 0..config.monte_carlo_walks {
            let mut current = root.clone();
            let mut depth = 0;
            loop {
                check_cancelled(ctx.cancel)?;
                if rng.random::<f64>() >= config.continue_probability {
                    break;
                }

                let mut children = tree.live_children(&current);
                if children.is_empty() {
                    if tracker.exhausted(tree) {
                        break;
                    }
                    for child in tracker.expand(tree, ctx, &current).await? {
                        if tracker.exhausted(tree) {
                            break;
                        }
                        tracker.evaluate(tree, ctx, &child).await?;
                    }
                    // Unevaluated leftovers from a capped batch are not walkable
                    children = tree
                        .live_children(&current)
                        .into_iter()
                        .filter(|c| tree.node(c).is_some_and(|n| n.is_evaluated()))
                        .collect();
                }
                if children.is_empty() {
                    break;
                }

                current = children.swap_remove(rng.random_range(0..children.len()));
                depth += 1;
            }
            tracker.report(ctx, depth);
        }
        Ok(())
    }
}
