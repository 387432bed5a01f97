//! Execution types: run results, streaming updates, and executor replies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Execution status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl ExecutionStatus {
    /// Terminal statuses are final: a run never leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Cancelled
                | ExecutionStatus::Timeout
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Execution mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Blocking,
    Deferred,
    Streaming,
}

// ---------------------------------------------------------------------------
// ExecutionResult: one per run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub node_results: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metrics: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ExecutionResult {
    /// A freshly started run.
    pub fn running(execution_id: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            execution_id: execution_id.into(),
            status: ExecutionStatus::Running,
            start_time,
            end_time: None,
            results: None,
            node_results: None,
            error: None,
            metrics: None,
        }
    }

    /// Move to `status` unless the run already reached a terminal status.
    ///
    /// Returns false when the transition was refused. The first terminal
    /// transition stamps `end_time` if the executor did not provide one.
    pub fn transition(&mut self, status: ExecutionStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if status.is_terminal() && self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
        self.status = status;
        true
    }

    /// Transition to `failed` and record the message.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        let changed = self.transition(ExecutionStatus::Failed);
        if changed {
            self.error = Some(message.into());
        }
        changed
    }

    /// Record the payload for one node, creating the map on first use.
    pub fn set_node_result(&mut self, node_id: &str, value: serde_json::Value) {
        self.node_results
            .get_or_insert_with(Default::default)
            .insert(node_id.to_string(), value);
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}

// ---------------------------------------------------------------------------
// ExecutionUpdate: one streamed progress event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    WorkflowStart,
    NodeStart,
    NodeComplete,
    NodeError,
    WorkflowComplete,
    WorkflowError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionUpdate {
    pub execution_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type", alias = "update_type")]
    pub update_type: UpdateType,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ExecutionUpdate {
    pub fn new(
        execution_id: impl Into<String>,
        update_type: UpdateType,
        data: serde_json::Value,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            timestamp: Utc::now(),
            update_type,
            data,
        }
    }

    /// Node the update refers to, for the `node_*` update types.
    pub fn node_id(&self) -> Option<&str> {
        self.data.get("node_id").and_then(|v| v.as_str())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.update_type,
            UpdateType::WorkflowComplete | UpdateType::WorkflowError
        )
    }
}

// ---------------------------------------------------------------------------
// Executor replies
// ---------------------------------------------------------------------------

/// Handle returned by a deferred run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AsyncExecution {
    pub execution_id: String,
    pub status_endpoint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
    #[serde(default)]
    pub warnings: Vec<serde_json::Value>,
    #[serde(default)]
    pub suggestions: Vec<serde_json::Value>,
    #[serde(default)]
    pub security: Option<SecurityAssessment>,
    #[serde(default)]
    pub performance: Option<PerformanceEstimate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityAssessment {
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub issues: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceEstimate {
    #[serde(default)]
    pub estimated_duration_ms: Option<u64>,
    #[serde(default)]
    pub complexity: Option<String>,
    #[serde(default)]
    pub node_count: Option<usize>,
    #[serde(default)]
    pub bottlenecks: Vec<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_is_final() {
        let mut result = ExecutionResult::running("x", Utc::now());
        assert!(result.transition(ExecutionStatus::Completed));
        let end = result.end_time;
        assert!(end.is_some());

        for later in [
            ExecutionStatus::Running,
            ExecutionStatus::Failed,
            ExecutionStatus::Cancelled,
            ExecutionStatus::Timeout,
        ] {
            assert!(!result.transition(later));
            assert_eq!(result.status, ExecutionStatus::Completed);
        }
        assert!(!result.fail("late"));
        assert!(result.error.is_none());
        assert_eq!(result.end_time, end);
    }

    #[test]
    fn non_terminal_transitions_allowed() {
        let mut result = ExecutionResult::running("x", Utc::now());
        assert!(result.transition(ExecutionStatus::Pending));
        assert!(result.transition(ExecutionStatus::Running));
        assert!(result.end_time.is_none());
        assert!(result.fail("boom"));
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn update_wire_format() {
        let update: ExecutionUpdate = serde_json::from_value(serde_json::json!({
            "execution_id": "run-1",
            "timestamp": "2025-01-01T00:00:00Z",
            "type": "node_complete",
            "data": {"node_id": "n1", "output": 3}
        }))
        .unwrap();
        assert_eq!(update.update_type, UpdateType::NodeComplete);
        assert_eq!(update.node_id(), Some("n1"));
        assert!(!update.is_terminal());

        let aliased: ExecutionUpdate = serde_json::from_value(serde_json::json!({
            "execution_id": "run-1",
            "update_type": "workflow_error"
        }))
        .unwrap();
        assert!(aliased.is_terminal());
        assert!(aliased.data.is_null());
    }

    #[test]
    fn result_from_executor_reply() {
        let result: ExecutionResult = serde_json::from_value(serde_json::json!({
            "execution_id": "run-2",
            "status": "completed",
            "start_time": "2025-01-01T00:00:00Z",
            "end_time": "2025-01-01T00:00:01.500Z",
            "results": {"answer": 42}
        }))
        .unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.duration_ms(), Some(1500));
        assert!(result.node_results.is_none());
    }
}
