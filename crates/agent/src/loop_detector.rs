//! Repeated-failure detection for tool calls.
//!
//! Keeps a bounded, per-agent history of tool calls keyed by a structural
//! signature (tool name + canonical parameters). When the same signature
//! has failed `threshold` times inside the window, the orchestrator stops
//! re-invoking it. Failure messages are kept so the short-circuit can still
//! report what the tool last said.

use ponder_config::LoopDetectionConfig;
use ponder_core::tool::{ToolExecutionResult, ToolParams};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct CallRecord {
    signature: String,
    success: bool,
    error: Option<String>,
}

#[derive(Debug)]
pub struct LoopDetector {
    threshold: usize,
    history_size: usize,
    history: Mutex<HashMap<String, VecDeque<CallRecord>>>,
}

impl LoopDetector {
    pub fn new(threshold: usize, history_size: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            history_size: history_size.max(1),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &LoopDetectionConfig) -> Self {
        Self::new(config.failure_threshold, config.history_size)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Append a call outcome to the agent's history, evicting the oldest
    /// entry once the window is full.
    pub fn record_tool_call(&self, agent_id: &str, tool_name: &str, params: &ToolParams, result: &ToolExecutionResult) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let entries = history.entry(agent_id.to_string()).or_default();
        entries.push_back(CallRecord {
            signature: signature(tool_name, params),
            success: result.success,
            error: if result.success { None } else { result.error.clone() },
        });
        while entries.len() > self.history_size {
            entries.pop_front();
        }
    }

    /// True when this exact call has failed at least `threshold` times
    /// within the recent window.
    pub fn detect_repeated_failures(&self, agent_id: &str, tool_name: &str, params: &ToolParams) -> bool {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = history.get(agent_id) else {
            return false;
        };
        let sig = signature(tool_name, params);
        let failures = entries
            .iter()
            .filter(|r| !r.success && r.signature == sig)
            .count();
        failures >= self.threshold
    }

    /// The most recent failure message recorded for this exact call.
    pub fn last_failure(&self, agent_id: &str, tool_name: &str, params: &ToolParams) -> Option<String> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let sig = signature(tool_name, params);
        history
            .get(agent_id)?
            .iter()
            .rev()
            .filter(|r| !r.success && r.signature == sig)
            .find_map(|r| r.error.clone())
    }

    /// Forget everything recorded for one agent.
    pub fn clear(&self, agent_id: &str) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(agent_id);
    }
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self::from_config(&LoopDetectionConfig::default())
    }
}

/// `tool:{canonical params}` with object keys sorted at every level.
fn signature(tool_name: &str, params: &ToolParams) -> String {
    let mut out = String::with_capacity(tool_name.len() + 32);
    out.push_str(tool_name);
    out.push(':');
    write_canonical_object(params, &mut out);
    out
}

fn write_canonical_object(map: &serde_json::Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(&map[key.as_str()], out);
    }
    out.push('}');
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
