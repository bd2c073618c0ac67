//! Tree-of-thoughts reasoning: an arena tree, pluggable exploration
//! strategies, and the engine that drives them through the LLM.

pub mod engine;
pub mod llm;
pub mod model;
pub mod strategies;

pub use engine::{TreeOfThoughtsEngine, TreeOutcome};
pub use llm::{LlmNodeEvaluator, LlmThoughtGenerator};
pub use model::{NodeState, ReasoningTree, ThoughtNode, ThoughtType};
pub use strategies::{
    ExplorationResult, ExplorationStrategy, ExploreContext, GeneratedThought, NodeEvaluator,
    ThoughtGenerator, explore, strategy_for,
};
