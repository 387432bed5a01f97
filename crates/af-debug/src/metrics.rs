//! Performance metrics: recomputed on demand from the execution history.

use af_core::debug::{ExecutionState, NodeStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate over the terminal (`success` / `error`) records of a history.
///
/// Rates are percentages in `0.0..=100.0`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetrics {
    pub total_executions: usize,
    pub total_duration_ms: i64,
    pub average_duration_ms: f64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub node_metrics: BTreeMap<String, NodeMetrics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeMetrics {
    pub execution_count: usize,
    pub total_duration_ms: i64,
    pub average_duration_ms: f64,
    pub success_rate: f64,
}

#[derive(Default)]
struct Tally {
    count: usize,
    successes: usize,
    duration_ms: i64,
}

impl Tally {
    fn add(&mut self, state: &ExecutionState) {
        self.count += 1;
        if state.status == NodeStatus::Success {
            self.successes += 1;
        }
        self.duration_ms += state.duration_ms.unwrap_or(0);
    }

    fn average(&self) -> f64 {
        ratio(self.duration_ms as f64, self.count)
    }

    fn success_rate(&self) -> f64 {
        ratio(self.successes as f64 * 100.0, self.count)
    }
}

fn ratio(numerator: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        numerator / count as f64
    }
}

impl PerformanceMetrics {
    pub fn from_history(history: &[ExecutionState]) -> Self {
        let mut overall = Tally::default();
        let mut per_node: BTreeMap<String, Tally> = BTreeMap::new();

        for state in history.iter().filter(|s| s.status.is_terminal()) {
            overall.add(state);
            per_node.entry(state.node_id.clone()).or_default().add(state);
        }

        let success_rate = overall.success_rate();
        Self {
            total_executions: overall.count,
            total_duration_ms: overall.duration_ms,
            average_duration_ms: overall.average(),
            success_rate,
            error_rate: if overall.count == 0 {
                0.0
            } else {
                100.0 - success_rate
            },
            node_metrics: per_node
                .into_iter()
                .map(|(node_id, tally)| {
                    let metrics = NodeMetrics {
                        execution_count: tally.count,
                        total_duration_ms: tally.duration_ms,
                        average_duration_ms: tally.average(),
                        success_rate: tally.success_rate(),
                    };
                    (node_id, metrics)
                })
                .collect(),
        }
    }
}
