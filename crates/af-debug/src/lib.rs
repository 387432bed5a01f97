//! af-debug: Interactive debugger layered over node-by-node execution.

pub mod breakpoints;
pub mod condition;
pub mod coordinator;
pub mod gate;
pub mod history;
pub mod metrics;

pub use coordinator::DebugCoordinator;
pub use gate::{PauseGate, PauseHandle};
pub use metrics::PerformanceMetrics;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("condition syntax error at {position}: {message}")]
    ConditionSyntax { position: usize, message: String },
    #[error("condition evaluation failed: {0}")]
    ConditionEval(String),
    #[error("history index {index} out of range (len {len})")]
    InvalidIndex { index: usize, len: usize },
}
