//! Thread-safe telemetry engine: collects spans per agent run and keeps
//! running totals for usage reports.

use crate::model::*;
use ponder_core::llm::Usage;
use ponder_core::metrics::MetricsCollector;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Completed traces kept before the oldest are dropped.
const MAX_TRACES: usize = 5_000;

/// The core telemetry engine.
///
/// Thread-safe via `RwLock`; one engine can be shared by many agents.
/// Spans are grouped into one trace per agent run: the first measurement
/// for an agent opens a trace and `record_run` closes it.
pub struct TelemetryEngine {
    /// All recorded traces (most recent last).
    traces: RwLock<Vec<Trace>>,
    /// Agent id → id of its open trace.
    open: RwLock<HashMap<String, String>>,
    /// Running totals.
    totals: RwLock<UsageSnapshot>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl TelemetryEngine {
    pub fn new() -> Self {
        Self {
            traces: RwLock::new(Vec::new()),
            open: RwLock::new(HashMap::new()),
            totals: RwLock::new(UsageSnapshot::default()),
        }
    }

    // ── Trace management ──────────────────────────────────────────────

    /// Id of the agent's open trace, starting one if needed.
    fn trace_for(&self, agent_id: &str) -> String {
        if let Some(id) = read(&self.open).get(agent_id) {
            return id.clone();
        }

        let trace = Trace::new(agent_id);
        let id = trace.id.clone();
        {
            let mut traces = write(&self.traces);
            if traces.len() >= MAX_TRACES {
                // Drop the oldest completed traces first
                let drain_count = MAX_TRACES / 10;
                let mut removed = 0;
                traces.retain(|t| {
                    if removed >= drain_count || t.ended_at.is_none() {
                        return true;
                    }
                    removed += 1;
                    false
                });
            }
            traces.push(trace);
        }
        write(&self.open).insert(agent_id.to_string(), id.clone());
        id
    }

    /// Record a completed span in the agent's open trace and update totals.
    pub fn record_span(&self, agent_id: &str, span: Span) {
        {
            let mut totals = write(&self.totals);
            let failed = span.success == Some(false);
            totals.total_input_tokens += span.input_tokens.unwrap_or(0) as u64;
            totals.total_output_tokens += span.output_tokens.unwrap_or(0) as u64;
            match span.kind {
                SpanKind::LlmCall => {
                    totals.llm_calls += 1;
                    totals.llm_failures += failed as u64;
                }
                SpanKind::ToolExecution => {
                    totals.tool_executions += 1;
                    totals.tool_failures += failed as u64;
                }
                SpanKind::Turn => totals.turns += 1,
                SpanKind::Run => {
                    totals.runs += 1;
                    totals.runs_succeeded += (!failed) as u64;
                }
            }
        }

        let trace_id = self.trace_for(agent_id);
        let mut traces = write(&self.traces);
        if let Some(trace) = traces.iter_mut().find(|t| t.id == trace_id) {
            trace.add_span(span);
        }
    }

    /// Close the agent's open trace, if any.
    pub fn end_trace(&self, agent_id: &str) {
        let Some(trace_id) = write(&self.open).remove(agent_id) else {
            return;
        };
        let mut traces = write(&self.traces);
        if let Some(trace) = traces.iter_mut().find(|t| t.id == trace_id) {
            trace.end();
        }
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Get a specific trace by ID.
    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        read(&self.traces).iter().find(|t| t.id == trace_id).cloned()
    }

    /// List recent traces (most recent first).
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        read(&self.traces).iter().rev().take(limit).cloned().collect()
    }

    /// Every trace recorded for one agent, oldest first.
    pub fn traces_for_agent(&self, agent_id: &str) -> Vec<Trace> {
        read(&self.traces)
            .iter()
            .filter(|t| t.agent_id == agent_id)
            .cloned()
            .collect()
    }

    /// Total number of traces recorded.
    pub fn trace_count(&self) -> usize {
        read(&self.traces).len()
    }

    /// Get a real-time usage snapshot.
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        let mut snapshot = read(&self.totals).clone();
        snapshot.trace_count = self.trace_count() as u64;
        snapshot
    }
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector for TelemetryEngine {
    fn record_llm_call(&self, agent_id: &str, duration: Duration, success: bool, usage: Option<&Usage>) {
        let mut span = Span::completed(SpanKind::LlmCall, "llm", duration, success);
        if let Some(usage) = usage {
            span.record_tokens(usage.prompt_tokens, usage.completion_tokens);
        }
        self.record_span(agent_id, span);
    }

    fn record_tool_execution(&self, agent_id: &str, tool_name: &str, duration: Duration, success: bool) {
        self.record_span(
            agent_id,
            Span::completed(SpanKind::ToolExecution, tool_name, duration, success),
        );
    }

    fn record_turn(&self, agent_id: &str, turn_index: usize, duration: Duration) {
        let mut span = Span::completed(SpanKind::Turn, format!("turn-{turn_index}"), duration, true);
        span.metadata
            .insert("turn_index".into(), serde_json::json!(turn_index));
        self.record_span(agent_id, span);
    }

    fn record_run(&self, agent_id: &str, turns: usize, succeeded: bool, duration: Duration) {
        let mut span = Span::completed(SpanKind::Run, "run", duration, succeeded);
        span.metadata.insert("turns".into(), serde_json::json!(turns));
        self.record_span(agent_id, span);
        self.end_trace(agent_id);

        tracing::debug!(
            agent_id,
            turns,
            succeeded,
            elapsed_ms = duration.as_millis() as u64,
            "Run recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_engine() -> TelemetryEngine {
        TelemetryEngine::new()
    }

    fn usage(prompt: u32, completion: u32) -> Usage {
        Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }

    #[test]
    fn llm_call_updates_totals() {
        let engine = make_engine();
        engine.record_llm_call("a1", Duration::from_millis(40), true, Some(&usage(1000, 500)));
        engine.record_llm_call("a1", Duration::from_millis(40), false, None);

        let snapshot = engine.usage_snapshot();
        assert_eq!(snapshot.total_tokens(), 1500);
        assert_eq!(snapshot.llm_calls, 2);
        assert_eq!(snapshot.llm_failures, 1);
        assert_eq!(snapshot.trace_count, 1);
    }

    #[test]
    fn run_closes_trace() {
        let engine = make_engine();
        engine.record_tool_execution("a1", "calculator", Duration::from_millis(3), true);
        engine.record_turn("a1", 0, Duration::from_millis(10));
        engine.record_run("a1", 1, true, Duration::from_millis(12));

        let traces = engine.traces_for_agent("a1");
        assert_eq!(traces.len(), 1);
        let trace = &traces[0];
        assert!(trace.ended_at.is_some());
        assert_eq!(trace.count(SpanKind::ToolExecution), 1);
        assert_eq!(trace.count(SpanKind::Turn), 1);
        assert_eq!(trace.count(SpanKind::Run), 1);

        // Next measurement opens a fresh trace
        engine.record_turn("a1", 0, Duration::from_millis(10));
        assert_eq!(engine.traces_for_agent("a1").len(), 2);
    }

    #[test]
    fn agents_get_separate_traces() {
        let engine = make_engine();
        engine.record_turn("a1", 0, Duration::ZERO);
        engine.record_turn("a2", 0, Duration::ZERO);
        engine.record_turn("a1", 1, Duration::ZERO);

        assert_eq!(engine.trace_count(), 2);
        assert_eq!(engine.traces_for_agent("a1")[0].spans.len(), 2);
        assert_eq!(engine.usage_snapshot().turns, 3);
    }

    #[test]
    fn run_outcomes_counted() {
        let engine = make_engine();
        engine.record_run("a1", 3, true, Duration::ZERO);
        engine.record_run("a2", 10, false, Duration::ZERO);

        let snapshot = engine.usage_snapshot();
        assert_eq!(snapshot.runs, 2);
        assert_eq!(snapshot.runs_succeeded, 1);
    }

    #[test]
    fn recent_traces_most_recent_first() {
        let engine = make_engine();
        for i in 0..5 {
            engine.record_run(&format!("agent-{i}"), 1, true, Duration::ZERO);
        }

        let recent = engine.recent_traces(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].agent_id, "agent-4");
        assert_eq!(recent[2].agent_id, "agent-2");
        assert!(engine.get_trace(&recent[0].id).is_some());
    }

    #[tokio::test]
    async fn concurrent_agents_share_engine() {
        let engine = Arc::new(make_engine());
        let mut handles = Vec::new();
        for i in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                let agent = format!("agent-{i}");
                for turn in 0..5 {
                    engine.record_turn(&agent, turn, Duration::from_millis(1));
                }
                engine.record_run(&agent, 5, true, Duration::from_millis(5));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let snapshot = engine.usage_snapshot();
        assert_eq!(snapshot.turns, 40);
        assert_eq!(snapshot.runs, 8);
        assert_eq!(snapshot.trace_count, 8);
    }
}
