//! af-runner: Execution orchestrator over a remote workflow executor, with
//! streaming ingestion, retry with backoff, and a local step-wise walk.

pub mod callbacks;
pub mod config;
pub mod executor;
pub mod http;
pub mod local;
pub mod orchestrator;
pub mod retry;

pub use callbacks::ExecutionCallbacks;
pub use config::{ExecutorConfig, OrchestratorConfig};
pub use executor::{ExecuteRequest, RemoteExecutor};
pub use http::HttpExecutor;
pub use local::{EchoExecutor, NodeExecutor};
pub use orchestrator::{Orchestrator, RunOptions, RunOutcome};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("executor returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("executor reported failure: {0}")]
    Remote(String),
    #[error("invalid executor reply: {0}")]
    Decode(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("stream closed before the workflow finished")]
    StreamClosed,
    #[error("run {execution_id} failed: {message}")]
    RunFailed {
        execution_id: String,
        message: String,
    },
    #[error("scheduling error: {0}")]
    Scheduling(String),
    #[error("node execution failed: node={node_id}, error={message}")]
    NodeExecution { node_id: String, message: String },
    #[error("configuration error: {0}")]
    Config(String),
}
