//! Execution callbacks for UI collaborators.

use crate::RunnerError;
use af_core::execution::{ExecutionResult, ExecutionUpdate};
use std::fmt;
use std::sync::Arc;

type StartFn = Arc<dyn Fn(&str) + Send + Sync>;
type CompleteFn = Arc<dyn Fn(&ExecutionResult) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&RunnerError) + Send + Sync>;
type UpdateFn = Arc<dyn Fn(&ExecutionUpdate) + Send + Sync>;

/// Optional hooks invoked by the orchestrator. Unset hooks are skipped.
#[derive(Clone, Default)]
pub struct ExecutionCallbacks {
    on_start: Option<StartFn>,
    on_complete: Option<CompleteFn>,
    on_error: Option<ErrorFn>,
    on_update: Option<UpdateFn>,
}

impl ExecutionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_execution_start(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    pub fn on_execution_complete(
        mut self,
        f: impl Fn(&ExecutionResult) + Send + Sync + 'static,
    ) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn on_execution_error(mut self, f: impl Fn(&RunnerError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_streaming_update(
        mut self,
        f: impl Fn(&ExecutionUpdate) + Send + Sync + 'static,
    ) -> Self {
        self.on_update = Some(Arc::new(f));
        self
    }

    pub(crate) fn started(&self, execution_id: &str) {
        if let Some(f) = &self.on_start {
            f(execution_id);
        }
    }

    pub(crate) fn completed(&self, result: &ExecutionResult) {
        if let Some(f) = &self.on_complete {
            f(result);
        }
    }

    pub(crate) fn failed(&self, error: &RunnerError) {
        if let Some(f) = &self.on_error {
            f(error);
        }
    }

    pub(crate) fn update(&self, update: &ExecutionUpdate) {
        if let Some(f) = &self.on_update {
            f(update);
        }
    }
}

impl fmt::Debug for ExecutionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionCallbacks")
            .field("on_execution_start", &self.on_start.is_some())
            .field("on_execution_complete", &self.on_complete.is_some())
            .field("on_execution_error", &self.on_error.is_some())
            .field("on_streaming_update", &self.on_update.is_some())
            .finish()
    }
}
