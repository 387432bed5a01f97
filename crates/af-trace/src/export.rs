//! Record export.

use crate::TraceError;
use af_core::debug::ExecutionState;

/// Export records to a pretty-printed JSON array.
pub fn export_json(states: &[ExecutionState]) -> Result<String, TraceError> {
    serde_json::to_string_pretty(states).map_err(|e| TraceError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::debug::NodeStatus;

    #[test]
    fn exports_wire_names() {
        let json = export_json(&[ExecutionState::new("n1", NodeStatus::Success).with_duration(3)])
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["node_id"], "n1");
        assert_eq!(parsed[0]["status"], "success");
        assert_eq!(parsed[0]["duration_ms"], 3);
    }
}
