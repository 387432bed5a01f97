//! Execution orchestrator: drives runs against a [`RemoteExecutor`] in
//! blocking, deferred or streaming mode, and local step-wise walks.

use crate::callbacks::ExecutionCallbacks;
use crate::config::OrchestratorConfig;
use crate::executor::{ExecuteRequest, RemoteExecutor};
use crate::local::{self, NodeExecutor};
use crate::retry::{compute_delay, should_retry};
use crate::RunnerError;
use af_core::debug::{ExecutionState, NodeStatus};
use af_core::execution::{
    AsyncExecution, ExecutionMode, ExecutionResult, ExecutionStatus, ExecutionUpdate, UpdateType,
    ValidationReport,
};
use af_core::graph::WorkflowDefinition;
use af_debug::DebugCoordinator;
use chrono::Utc;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Runs kept in [`Orchestrator::execution_history`].
const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub mode: ExecutionMode,
    pub timeout: Option<Duration>,
}

impl RunOptions {
    pub fn mode(mode: ExecutionMode) -> Self {
        Self {
            mode,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(ExecutionResult),
    Deferred(AsyncExecution),
}

#[derive(Debug, Default)]
struct OrchestratorState {
    executing: bool,
    retry_count: u32,
    current: Option<ExecutionResult>,
    history: VecDeque<ExecutionResult>,
    streaming_updates: Vec<ExecutionUpdate>,
    local_run: Option<(String, Arc<AtomicBool>)>,
}

impl OrchestratorState {
    /// Make `result` current and keep the history entry for its id in sync.
    fn remember(&mut self, result: ExecutionResult) {
        match self
            .history
            .iter()
            .position(|r| r.execution_id == result.execution_id)
        {
            Some(pos) => self.history[pos] = result.clone(),
            None => {
                self.history.push_front(result.clone());
                self.history.truncate(HISTORY_LIMIT);
            }
        }
        self.current = Some(result);
    }

    /// The tracked result for `execution_id`, started now if not tracked yet.
    fn current_mut(&mut self, execution_id: &str) -> &mut ExecutionResult {
        let tracked = matches!(&self.current, Some(current) if current.execution_id == execution_id);
        if !tracked {
            return self
                .current
                .insert(ExecutionResult::running(execution_id, Utc::now()));
        }
        self.current.as_mut().expect("current checked above")
    }
}

pub struct Orchestrator {
    executor: Arc<dyn RemoteExecutor>,
    debugger: Option<Arc<DebugCoordinator>>,
    callbacks: ExecutionCallbacks,
    config: OrchestratorConfig,
    state: RwLock<OrchestratorState>,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: OrchestratorConfig) -> Self {
        Self {
            executor,
            debugger: None,
            callbacks: ExecutionCallbacks::default(),
            config,
            state: RwLock::new(OrchestratorState::default()),
        }
    }

    /// Attach a debug session. Streamed node updates are forwarded to it
    /// while debugging is active, and local walks run through it.
    pub fn with_debugger(mut self, debugger: Arc<DebugCoordinator>) -> Self {
        self.debugger = Some(debugger);
        self
    }

    pub fn with_callbacks(mut self, callbacks: ExecutionCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn debugger(&self) -> Option<&Arc<DebugCoordinator>> {
        self.debugger.as_ref()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Run a workflow on the remote executor.
    ///
    /// Failures are retried with exponential backoff when `auto_retry` is
    /// enabled; the final failure is reported to `on_execution_error` once.
    ///
    /// `on_execution_start` fires once the execution id is known: after the
    /// remote returns for a blocking run, on acceptance for a deferred run,
    /// and on the first update of a streamed run.
    pub async fn run(
        &self,
        workflow: &WorkflowDefinition,
        input: Map<String, Value>,
        options: RunOptions,
    ) -> Result<RunOutcome, RunnerError> {
        let prior = {
            let mut s = self.state.write().await;
            s.executing = true;
            s.retry_count = 0;
            s.streaming_updates.clear();
            s.current.as_ref().map(|c| c.execution_id.clone())
        };

        let mut request = ExecuteRequest::new(workflow.clone(), input, options.mode);
        request.timeout_seconds = options.timeout.map(|t| t.as_secs().max(1));
        tracing::info!(workflow = %workflow.id, mode = ?options.mode, "starting run");

        let outcome = loop {
            match self.attempt(&request, options.timeout).await {
                Ok(outcome) => break Ok(outcome),
                Err(e) => {
                    self.abandon_current(&e, prior.as_deref()).await;
                    match self.next_retry_delay().await {
                        Some((attempt, delay)) => {
                            tracing::warn!(attempt, ?delay, "run failed, retrying: {e}");
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::error!(workflow = %workflow.id, "run failed: {e}");
                            self.callbacks.failed(&e);
                            break Err(e);
                        }
                    }
                }
            }
        };

        self.state.write().await.executing = false;
        outcome
    }

    async fn attempt(
        &self,
        request: &ExecuteRequest,
        timeout: Option<Duration>,
    ) -> Result<RunOutcome, RunnerError> {
        let work = self.dispatch(request);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| RunnerError::Timeout(limit))?,
            None => work.await,
        }
    }

    async fn dispatch(&self, request: &ExecuteRequest) -> Result<RunOutcome, RunnerError> {
        match request.execution_mode {
            ExecutionMode::Blocking => {
                let result = self.executor.execute(request).await?;
                self.callbacks.started(&result.execution_id);
                self.publish(result).await.map(RunOutcome::Completed)
            }
            ExecutionMode::Deferred => {
                let accepted = self.executor.execute_async(request).await?;
                tracing::info!(execution_id = %accepted.execution_id, "run accepted");
                self.state
                    .write()
                    .await
                    .remember(ExecutionResult::running(&accepted.execution_id, Utc::now()));
                self.callbacks.started(&accepted.execution_id);
                Ok(RunOutcome::Deferred(accepted))
            }
            ExecutionMode::Streaming => self.stream(request).await.map(RunOutcome::Completed),
        }
    }

    async fn stream(&self, request: &ExecuteRequest) -> Result<ExecutionResult, RunnerError> {
        let chunks = self.executor.execute_stream(request).await?;
        let mut updates = Box::pin(af_stream::decode_stream::<_, _, _, ExecutionUpdate>(chunks));

        while let Some(update) = updates.next().await {
            let update = update.map_err(|e| RunnerError::Transport(e.to_string()))?;
            if let Some(finished) = self.apply_update(update).await {
                return self.publish(finished).await;
            }
        }

        // Closed without a terminal update; a cancelled run still counts.
        let current = self.state.read().await.current.clone();
        match current {
            Some(result) if result.status.is_terminal() => self.publish(result).await,
            _ => Err(RunnerError::StreamClosed),
        }
    }

    /// Fold one streamed update into the current result. Returns the result
    /// once a terminal update arrives.
    async fn apply_update(&self, update: ExecutionUpdate) -> Option<ExecutionResult> {
        tracing::debug!(
            execution_id = %update.execution_id,
            update_type = ?update.update_type,
            node_id = update.node_id().unwrap_or(""),
            "update"
        );
        self.callbacks.update(&update);

        let (starting, finished) = {
            let mut s = self.state.write().await;
            s.streaming_updates.push(update.clone());

            let starting = update.update_type == UpdateType::WorkflowStart
                || s.current
                    .as_ref()
                    .map_or(true, |c| c.execution_id != update.execution_id);
            if starting {
                s.current = Some(ExecutionResult::running(&update.execution_id, update.timestamp));
            }
            let current = s.current_mut(&update.execution_id);
            match update.update_type {
                UpdateType::WorkflowStart | UpdateType::NodeStart => {}
                UpdateType::NodeComplete => {
                    if let Some(node_id) = update.node_id() {
                        let output = update.data.get("output").unwrap_or(&update.data).clone();
                        current.set_node_result(node_id, output);
                    }
                }
                UpdateType::NodeError => {
                    if let Some(node_id) = update.node_id() {
                        current.set_node_result(
                            node_id,
                            serde_json::json!({ "error": error_message(&update.data) }),
                        );
                    }
                }
                UpdateType::WorkflowComplete => {
                    if !current.status.is_terminal() {
                        let results = update.data.get("results").unwrap_or(&update.data);
                        current.results = results.as_object().cloned();
                        current.end_time = Some(update.timestamp);
                        current.transition(ExecutionStatus::Completed);
                    }
                }
                UpdateType::WorkflowError => {
                    if !current.status.is_terminal() {
                        current.end_time = Some(update.timestamp);
                        current.fail(error_message(&update.data));
                    }
                }
            }
            (starting, update.is_terminal().then(|| current.clone()))
        };

        if starting {
            self.callbacks.started(&update.execution_id);
        }
        self.forward_to_debugger(&update).await;
        finished
    }

    async fn forward_to_debugger(&self, update: &ExecutionUpdate) {
        let Some(debugger) = &self.debugger else {
            return;
        };
        let Some(node_id) = update.node_id() else {
            return;
        };
        if !debugger.is_debugging().await {
            return;
        }

        let data = &update.data;
        let mut state = match update.update_type {
            UpdateType::NodeStart => ExecutionState::new(node_id, NodeStatus::Running),
            UpdateType::NodeComplete => {
                let state = ExecutionState::new(node_id, NodeStatus::Success);
                match data.get("output") {
                    Some(output) => state.with_output(output.clone()),
                    None => state,
                }
            }
            UpdateType::NodeError => {
                ExecutionState::new(node_id, NodeStatus::Error).with_error(error_message(data))
            }
            _ => return,
        }
        .with_input(data.get("input").cloned());
        if let Some(ms) = data.get("duration_ms").and_then(Value::as_i64) {
            state = state.with_duration(ms);
        }
        state.timestamp = update.timestamp;
        debugger.record_state(state).await;
    }

    /// Store a finished result and notify. Failed and timed-out runs become
    /// [`RunnerError::RunFailed`].
    async fn publish(&self, result: ExecutionResult) -> Result<ExecutionResult, RunnerError> {
        self.state.write().await.remember(result.clone());
        tracing::info!(
            execution_id = %result.execution_id,
            status = %result.status,
            duration_ms = result.duration_ms().unwrap_or(0),
            "run finished"
        );
        match result.status {
            ExecutionStatus::Completed => {
                self.callbacks.completed(&result);
                Ok(result)
            }
            ExecutionStatus::Failed | ExecutionStatus::Timeout => Err(RunnerError::RunFailed {
                execution_id: result.execution_id.clone(),
                message: result
                    .error
                    .clone()
                    .unwrap_or_else(|| result.status.to_string()),
            }),
            _ => Ok(result),
        }
    }

    /// Close out a run this attempt started and left running. `prior` is
    /// the run that was current before, which is left alone.
    async fn abandon_current(&self, error: &RunnerError, prior: Option<&str>) {
        let mut s = self.state.write().await;
        let Some(mut current) = s.current.clone() else {
            return;
        };
        if current.status.is_terminal() || Some(current.execution_id.as_str()) == prior {
            return;
        }
        if matches!(error, RunnerError::Timeout(_)) {
            current.transition(ExecutionStatus::Timeout);
            current.error = Some(error.to_string());
        } else {
            current.fail(error.to_string());
        }
        s.remember(current);
    }

    async fn next_retry_delay(&self) -> Option<(u32, Duration)> {
        let mut s = self.state.write().await;
        if !should_retry(&self.config, s.retry_count) {
            return None;
        }
        s.retry_count += 1;
        Some((s.retry_count, compute_delay(&self.config, s.retry_count)))
    }

    /// Walk the workflow locally, one node at a time, through the attached
    /// debugger (or a private one).
    pub async fn run_local(
        &self,
        workflow: &WorkflowDefinition,
        input: Map<String, Value>,
        executor: &dyn NodeExecutor,
    ) -> Result<ExecutionResult, RunnerError> {
        let execution_id = Uuid::new_v4().to_string();
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut s = self.state.write().await;
            s.executing = true;
            s.local_run = Some((execution_id.clone(), cancelled.clone()));
            s.current = Some(ExecutionResult::running(&execution_id, Utc::now()));
        }
        tracing::info!(execution_id = %execution_id, workflow = %workflow.id, "starting local walk");
        self.callbacks.started(&execution_id);

        let debugger = self
            .debugger
            .clone()
            .unwrap_or_else(|| Arc::new(DebugCoordinator::new()));
        let walked = local::walk(&execution_id, workflow, &input, executor, &debugger, &cancelled).await;

        let outcome = match walked {
            Ok(report) => {
                self.state.write().await.remember(report.result.clone());
                match report.failure {
                    Some(e) => Err(e),
                    None => {
                        if report.result.status == ExecutionStatus::Completed {
                            self.callbacks.completed(&report.result);
                        }
                        Ok(report.result)
                    }
                }
            }
            Err(e) => {
                let mut s = self.state.write().await;
                if let Some(mut current) = s.current.clone() {
                    current.fail(e.to_string());
                    s.remember(current);
                }
                Err(e)
            }
        };

        {
            let mut s = self.state.write().await;
            s.executing = false;
            s.local_run = None;
        }
        if let Err(e) = &outcome {
            tracing::error!(execution_id = %execution_id, "local walk failed: {e}");
            self.callbacks.failed(e);
        }
        outcome
    }

    // -----------------------------------------------------------------------
    // Control and pass-through queries
    // -----------------------------------------------------------------------

    /// Request cancellation. A local walk with this id stops before its next
    /// node; otherwise the remote executor is asked and, on acknowledgement,
    /// the tracked run moves to `cancelled`.
    pub async fn cancel(&self, execution_id: &str) -> Result<bool, RunnerError> {
        {
            let s = self.state.read().await;
            if let Some((id, flag)) = &s.local_run {
                if id == execution_id {
                    flag.store(true, Ordering::SeqCst);
                    tracing::info!(execution_id, "local walk cancellation requested");
                    return Ok(true);
                }
            }
        }

        let acknowledged = self.executor.cancel(execution_id).await?;
        if acknowledged {
            self.settle_current(execution_id, ExecutionStatus::Cancelled).await;
        } else {
            tracing::warn!(execution_id, "cancellation not acknowledged");
        }
        Ok(acknowledged)
    }

    /// Fetch the remote status of a run. A terminal status is applied to
    /// the tracked run with that id.
    pub async fn get_status(&self, execution_id: &str) -> Result<ExecutionStatus, RunnerError> {
        let status = self.executor.status(execution_id).await?;
        if status.is_terminal() {
            self.settle_current(execution_id, status).await;
        }
        Ok(status)
    }

    async fn settle_current(&self, execution_id: &str, status: ExecutionStatus) {
        let mut s = self.state.write().await;
        let Some(mut current) = s
            .current
            .clone()
            .filter(|c| c.execution_id == execution_id)
        else {
            return;
        };
        if current.transition(status) {
            tracing::info!(execution_id, %status, "run settled");
            s.remember(current);
        }
    }

    pub async fn validate(
        &self,
        workflow: &WorkflowDefinition,
    ) -> Result<ValidationReport, RunnerError> {
        self.executor.validate(workflow).await
    }

    pub async fn templates(&self) -> Result<Value, RunnerError> {
        self.executor.templates().await
    }

    pub async fn statistics(&self) -> Result<Value, RunnerError> {
        self.executor.statistics().await
    }

    pub async fn is_executing(&self) -> bool {
        self.state.read().await.executing
    }

    pub async fn current_execution(&self) -> Option<ExecutionResult> {
        self.state.read().await.current.clone()
    }

    /// Most recent first, at most ten runs.
    pub async fn execution_history(&self) -> Vec<ExecutionResult> {
        self.state.read().await.history.iter().cloned().collect()
    }

    pub async fn streaming_updates(&self) -> Vec<ExecutionUpdate> {
        self.state.read().await.streaming_updates.clone()
    }

    pub async fn retry_count(&self) -> u32 {
        self.state.read().await.retry_count
    }
}

fn error_message(data: &Value) -> String {
    match data.get("error") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "unknown error".into(),
    }
}
