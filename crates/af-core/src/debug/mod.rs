//! Debug types: per-node execution records and debugger snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ExecutionState: one history record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Running,
    Success,
    Error,
    Paused,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Success | NodeStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Running => "running",
            NodeStatus::Success => "success",
            NodeStatus::Error => "error",
            NodeStatus::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionState {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: NodeStatus,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// Milliseconds between the `running` record and this one.
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub resource_usage: Option<ResourceUsage>,
}

impl ExecutionState {
    pub fn new(node_id: impl Into<String>, status: NodeStatus) -> Self {
        Self {
            node_id: node_id.into(),
            timestamp: Utc::now(),
            status,
            input: None,
            output: None,
            error: None,
            duration_ms: None,
            resource_usage: None,
        }
    }

    pub fn with_input(mut self, input: Option<serde_json::Value>) -> Self {
        self.input = input;
        self
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceUsage {
    #[serde(default)]
    pub memory_bytes: Option<u64>,
    #[serde(default)]
    pub cpu_percent: Option<f64>,
}

// ---------------------------------------------------------------------------
// Breakpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakpointConfig {
    pub node_id: String,
    pub enabled: bool,
    /// Boolean expression evaluated against the debug context.
    #[serde(default)]
    pub condition: Option<String>,
}

impl BreakpointConfig {
    pub fn new(node_id: impl Into<String>, condition: Option<String>) -> Self {
        Self {
            node_id: node_id.into(),
            enabled: true,
            condition,
        }
    }
}

// ---------------------------------------------------------------------------
// Debugger snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebuggerState {
    pub is_debugging: bool,
    pub is_paused: bool,
    pub current_node_id: Option<String>,
    pub breakpoints: Vec<BreakpointConfig>,
    pub execution_history: Vec<ExecutionState>,
    pub time_travel_index: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_builder_and_wire_names() {
        let state = ExecutionState::new("n1", NodeStatus::Success)
            .with_output(serde_json::json!({"ok": true}))
            .with_duration(12);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["duration_ms"], 12);
        assert!(state.status.is_terminal());
        assert!(!NodeStatus::Paused.is_terminal());
    }
}
