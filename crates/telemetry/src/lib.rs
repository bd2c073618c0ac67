//! Execution tracing and usage accounting for Ponder agents.
//!
//! Provides span-based tracing of every agent action (LLM calls, tool
//! executions, turns, runs) behind the core `MetricsCollector` trait.

pub mod engine;
pub mod model;

pub use engine::TelemetryEngine;
pub use model::{Span, SpanKind, Trace, UsageSnapshot};
