//! Remote executor contract.

use crate::RunnerError;
use af_core::execution::{
    AsyncExecution, ExecutionMode, ExecutionResult, ExecutionStatus, ValidationReport,
};
use af_core::graph::WorkflowDefinition;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Raw body chunks of a streaming execution.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, RunnerError>> + Send>>;

/// Body of an `/execute` or `/execute-async` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub workflow_data: WorkflowDefinition,
    pub input_data: serde_json::Map<String, serde_json::Value>,
    pub execution_mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl ExecuteRequest {
    pub fn new(
        workflow: WorkflowDefinition,
        input: serde_json::Map<String, serde_json::Value>,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            workflow_data: workflow,
            input_data: input,
            execution_mode: mode,
            timeout_seconds: None,
        }
    }
}

/// The service that actually runs workflows.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run to completion and return the final result.
    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionResult, RunnerError>;

    /// Start a run and return immediately.
    async fn execute_async(&self, request: &ExecuteRequest)
        -> Result<AsyncExecution, RunnerError>;

    /// Start a run and return its `data: <json>` record stream.
    async fn execute_stream(&self, request: &ExecuteRequest) -> Result<ByteStream, RunnerError>;

    /// Request cancellation. `Ok(true)` means the executor acknowledged it.
    async fn cancel(&self, execution_id: &str) -> Result<bool, RunnerError>;

    async fn status(&self, execution_id: &str) -> Result<ExecutionStatus, RunnerError>;

    async fn validate(&self, workflow: &WorkflowDefinition)
        -> Result<ValidationReport, RunnerError>;

    async fn templates(&self) -> Result<serde_json::Value, RunnerError>;

    async fn statistics(&self) -> Result<serde_json::Value, RunnerError>;
}
