//! The agent engine.
//!
//! Each turn follows a **Reason → Decide → Act → Record** cycle:
//!
//! 1. **Reason** (optional): chain-of-thought or a tree-of-thoughts search
//! 2. **Decide**: ask the LLM for the next action as protocol JSON (or a
//!    native function call) and parse it
//! 3. **Act**: run the requested tool(s) with timeout and panic isolation,
//!    or finish with the final output
//! 4. **Record**: append the turn to the agent's state and persist it
//!
//! The loop ends when the model finishes, a step stops the run, the turn
//! budget is spent, or the caller cancels.

pub mod agent;
pub mod error;
pub mod llm_communicator;
pub mod loop_detector;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod reasoning;
pub mod tool_executor;

#[cfg(test)]
mod test_helpers;

pub use agent::{Agent, AgentBuilder, AgentResult};
pub use error::{AgentError, ParseError, TreeError};
pub use llm_communicator::LlmCommunicator;
pub use loop_detector::LoopDetector;
pub use orchestrator::{AgentStepResult, Orchestrator};
pub use parser::{ParserLimits, parse_model_output};
pub use reasoning::tree::{
    ExplorationResult, ExplorationStrategy, NodeEvaluator, ReasoningTree, ThoughtGenerator,
    TreeOfThoughtsEngine,
};
pub use reasoning::{ReasoningManager, ReasoningResult};
pub use tool_executor::ToolExecutor;
