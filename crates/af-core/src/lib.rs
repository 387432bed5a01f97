//! af-core: Shared types for AgentFlow
//!
//! This crate has zero internal crate dependencies and defines the
//! canonical types used across all other af-* crates.

pub mod debug;
pub mod execution;
pub mod graph;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::debug::{
        BreakpointConfig, DebuggerState, ExecutionState, NodeStatus, ResourceUsage,
    };
    pub use crate::execution::{
        AsyncExecution, ExecutionMode, ExecutionResult, ExecutionStatus, ExecutionUpdate,
        UpdateType, ValidationReport,
    };
    pub use crate::graph::{EdgeDefinition, NodeDefinition, Position, WorkflowDefinition};
}
