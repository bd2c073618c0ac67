//! Metrics collector trait.
//!
//! The engine reports timings, outcomes and token usage at fixed points;
//! aggregation is the collector's job.

use std::time::Duration;

use crate::llm::Usage;

pub trait MetricsCollector: Send + Sync {
    /// One LLM call finished (successfully or not).
    fn record_llm_call(&self, agent_id: &str, duration: Duration, success: bool, usage: Option<&Usage>);

    /// One tool invocation finished.
    fn record_tool_execution(&self, agent_id: &str, tool_name: &str, duration: Duration, success: bool);

    /// One agent step finished.
    fn record_turn(&self, agent_id: &str, turn_index: usize, duration: Duration);

    /// A whole run finished.
    fn record_run(&self, agent_id: &str, turns: usize, succeeded: bool, duration: Duration);
}

/// Discards every measurement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsCollector for NoopMetrics {
    fn record_llm_call(&self, _: &str, _: Duration, _: bool, _: Option<&Usage>) {}
    fn record_tool_execution(&self, _: &str, _: &str, _: Duration, _: bool) {}
    fn record_turn(&self, _: &str, _: usize, _: Duration) {}
    fn record_run(&self, _: &str, _: usize, _: bool, _: Duration) {}
}
