//! Debug Coordinator: wraps node execution with breakpoints, pausing and
//! history recording.
//!
//! One coordinator per debug session; share it through an `Arc`. All state
//! lives behind a single lock that is never held across node work or a
//! pause, so readers always observe a consistent snapshot.

use crate::breakpoints::BreakpointRegistry;
use crate::condition;
use crate::gate::{PauseGate, PauseHandle};
use crate::history::ExecutionHistory;
use crate::metrics::PerformanceMetrics;
use crate::DebugError;
use af_core::debug::{BreakpointConfig, DebuggerState, ExecutionState, NodeStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt::Display;
use std::future::Future;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct DebugSession {
    debugging: bool,
    paused: bool,
    /// Set by a step; the next terminal record re-enables `paused`.
    stepping: bool,
    current_node: Option<String>,
    breakpoints: BreakpointRegistry,
    history: ExecutionHistory,
    /// Bumped whenever the history is reset; a node started in an older
    /// epoch does not record its outcome into the new one.
    epoch: u64,
}

impl DebugSession {
    fn reset(&mut self) {
        self.history.clear();
        self.paused = false;
        self.stepping = false;
        self.current_node = None;
        self.epoch += 1;
    }

    /// JSON object breakpoint conditions are evaluated against.
    fn context(&self, node_id: &str, input: Option<&Value>) -> Value {
        let mut outputs = Map::new();
        let mut errors = Map::new();
        for state in self.history.entries() {
            match state.status {
                NodeStatus::Success => {
                    outputs.insert(
                        state.node_id.clone(),
                        state.output.clone().unwrap_or(Value::Null),
                    );
                }
                NodeStatus::Error => {
                    errors.insert(
                        state.node_id.clone(),
                        state.error.clone().map(Value::String).unwrap_or(Value::Null),
                    );
                }
                _ => {}
            }
        }
        json!({
            "node_id": node_id,
            "input": input.cloned().unwrap_or(Value::Null),
            "outputs": outputs,
            "errors": errors,
            "step": self.history.len(),
            "last": self.history.last(),
        })
    }

    fn should_pause(&self, node_id: &str, input: Option<&Value>) -> bool {
        let Some(bp) = self.breakpoints.active(node_id) else {
            return false;
        };
        let Some(cond) = bp.condition.as_deref() else {
            return true;
        };
        match condition::evaluate(cond, &self.context(node_id, input)) {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(node_id, condition = cond, "breakpoint condition failed, pausing: {e}");
                true
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct DebugCoordinator {
    session: RwLock<DebugSession>,
    gate: PauseGate,
}

impl DebugCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    // -- session lifecycle --------------------------------------------------

    /// Start honoring breakpoints with an empty history.
    pub async fn start_debugging(&self) {
        let mut s = self.session.write().await;
        s.reset();
        s.debugging = true;
        tracing::info!("debugging started");
    }

    /// Stop honoring breakpoints, clear the history and release any
    /// suspended node.
    pub async fn stop_debugging(&self) {
        {
            let mut s = self.session.write().await;
            s.reset();
            s.debugging = false;
        }
        let released = self.gate.release_all();
        tracing::info!(released, "debugging stopped");
    }

    /// Clear history, time travel and pause state; keep breakpoints and the
    /// debugging flag.
    pub async fn restart(&self) {
        self.session.write().await.reset();
        let released = self.gate.release_all();
        tracing::info!(released, "debug session restarted");
    }

    pub async fn is_debugging(&self) -> bool {
        self.session.read().await.debugging
    }

    pub async fn is_paused(&self) -> bool {
        self.session.read().await.paused
    }

    // -- breakpoints --------------------------------------------------------

    pub async fn add_breakpoint(&self, node_id: &str, condition: Option<String>) {
        if let Some(cond) = condition.as_deref() {
            // An unparsable condition is kept: evaluation failure pauses.
            if let Err(e) = condition::Condition::parse(cond) {
                tracing::warn!(node_id, condition = cond, "breakpoint condition does not parse: {e}");
            }
        }
        self.session.write().await.breakpoints.add(node_id, condition);
    }

    pub async fn remove_breakpoint(&self, node_id: &str) -> bool {
        self.session.write().await.breakpoints.remove(node_id).is_some()
    }

    /// Returns the breakpoint's new enabled state.
    pub async fn toggle_breakpoint(&self, node_id: &str) -> bool {
        self.session.write().await.breakpoints.toggle(node_id)
    }

    pub async fn breakpoints(&self) -> Vec<BreakpointConfig> {
        self.session.read().await.breakpoints.list()
    }

    pub async fn should_pause_at_node(&self, node_id: &str) -> bool {
        self.session.read().await.should_pause(node_id, None)
    }

    // -- execution ----------------------------------------------------------

    /// Run `work` for `node_id`, recording a `running` record and then a
    /// `success` or `error` record.
    ///
    /// Waits first while a user pause is pending, and suspends after the
    /// `running` record when debugging and a breakpoint matches. A pause
    /// requested while `work` runs holds the terminal record until the
    /// session is continued. The work's error is returned unchanged.
    pub async fn execute_node<F, Fut, T, E>(
        &self,
        node_id: &str,
        input: Option<Value>,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize,
        E: Display,
    {
        loop {
            let handle = {
                let s = self.session.read().await;
                if !s.paused {
                    break;
                }
                self.gate.wait()
            };
            tracing::debug!(node_id, "waiting for resume before node");
            handle.await;
        }

        let (epoch, started, breakpoint) = {
            let mut s = self.session.write().await;
            let running = ExecutionState::new(node_id, NodeStatus::Running).with_input(input.clone());
            let started = running.timestamp;
            s.current_node = Some(node_id.to_string());
            s.history.push(running);

            let breakpoint = if s.debugging && s.should_pause(node_id, input.as_ref()) {
                s.paused = true;
                tracing::info!(node_id, "paused at breakpoint");
                Some(self.gate.wait())
            } else {
                None
            };
            (s.epoch, started, breakpoint)
        };

        if let Some(handle) = breakpoint {
            handle.await;
            tracing::debug!(node_id, "resumed");
        }

        let result = work().await;

        let finished = Utc::now();
        let duration_ms = (finished - started).num_milliseconds();
        let mut terminal = match &result {
            Ok(output) => ExecutionState::new(node_id, NodeStatus::Success)
                .with_output(serde_json::to_value(output).unwrap_or(Value::Null)),
            Err(e) => {
                tracing::warn!(node_id, duration_ms, "node failed: {e}");
                ExecutionState::new(node_id, NodeStatus::Error).with_error(e.to_string())
            }
        }
        .with_input(input)
        .with_duration(duration_ms);
        terminal.timestamp = finished;

        loop {
            let handle = {
                let mut s = self.session.write().await;
                if s.epoch != epoch {
                    tracing::debug!(node_id, "session reset while node ran, outcome not recorded");
                    break;
                }
                if !s.paused {
                    s.history.push(terminal);
                    if s.stepping {
                        s.stepping = false;
                        s.paused = true;
                        tracing::info!(node_id, "paused after step");
                    }
                    break;
                }
                self.gate.wait()
            };
            tracing::debug!(node_id, "waiting for resume before recording outcome");
            handle.await;
        }

        result
    }

    /// Append an externally observed record (e.g. from a remote stream).
    pub async fn record_state(&self, state: ExecutionState) {
        let mut s = self.session.write().await;
        if state.status == NodeStatus::Running {
            s.current_node = Some(state.node_id.clone());
        }
        s.history.push(state);
    }

    // -- pause / resume -----------------------------------------------------

    /// Request a pause before the next node. The handle resolves once
    /// execution is continued.
    pub async fn pause(&self) -> PauseHandle {
        let mut s = self.session.write().await;
        s.paused = true;
        tracing::info!("pause requested");
        self.gate.wait()
    }

    pub async fn continue_execution(&self) {
        {
            let mut s = self.session.write().await;
            s.paused = false;
            s.stepping = false;
        }
        let released = self.gate.release_all();
        tracing::debug!(released, "execution continued");
    }

    /// Resume the oldest suspended node only. Once a node records its
    /// outcome the session pauses again, holding the next node before its
    /// `running` record.
    pub async fn step_over(&self) {
        {
            let mut s = self.session.write().await;
            s.paused = false;
            s.stepping = true;
        }
        let released = self.gate.release();
        tracing::debug!(released, still_waiting = self.gate.waiting(), "stepped");
    }

    /// Sub-workflow stepping is not modelled; same as [`Self::step_over`].
    pub async fn step_into(&self) {
        self.step_over().await;
    }

    // -- history ------------------------------------------------------------

    pub async fn time_travel(&self, timestamp: DateTime<Utc>) -> Option<usize> {
        self.session.write().await.history.time_travel(timestamp)
    }

    pub async fn time_travel_to(&self, index: usize) -> Result<(), DebugError> {
        self.session.write().await.history.time_travel_to(index)
    }

    pub async fn clear_time_travel(&self) {
        self.session.write().await.history.clear_time_travel();
    }

    pub async fn current_state(&self) -> Option<ExecutionState> {
        self.session.read().await.history.current().cloned()
    }

    pub async fn history(&self) -> Vec<ExecutionState> {
        self.session.read().await.history.entries().to_vec()
    }

    pub async fn performance_metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics::from_history(self.session.read().await.history.entries())
    }

    pub async fn snapshot(&self) -> DebuggerState {
        let s = self.session.read().await;
        DebuggerState {
            is_debugging: s.debugging,
            is_paused: s.paused,
            current_node_id: s.current_node.clone(),
            breakpoints: s.breakpoints.list(),
            execution_history: s.history.entries().to_vec(),
            time_travel_index: s.history.time_travel_index(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn wait_until_paused(dbg: &DebugCoordinator) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !dbg.is_paused().await {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("walk paused");
    }

    fn statuses(history: &[ExecutionState]) -> Vec<(String, NodeStatus)> {
        history
            .iter()
            .map(|s| (s.node_id.clone(), s.status))
            .collect()
    }

    #[tokio::test]
    async fn sequential_records_and_error_propagation() {
        let dbg = DebugCoordinator::new();
        dbg.start_debugging().await;

        let out = dbg
            .execute_node("a", Some(json!({"x": 1})), || async { Ok::<_, String>(json!(2)) })
            .await
            .unwrap();
        assert_eq!(out, json!(2));

        let err = dbg
            .execute_node("b", None, || async { Err::<Value, _>("boom".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");

        let history = dbg.history().await;
        assert_eq!(
            statuses(&history),
            vec![
                ("a".into(), NodeStatus::Running),
                ("a".into(), NodeStatus::Success),
                ("b".into(), NodeStatus::Running),
                ("b".into(), NodeStatus::Error),
            ]
        );
        assert_eq!(history[1].output, Some(json!(2)));
        assert_eq!(history[3].error.as_deref(), Some("boom"));
        assert!(history[1].duration_ms.is_some());
    }

    #[tokio::test]
    async fn duration_spans_running_to_terminal() {
        let dbg = DebugCoordinator::new();
        dbg.execute_node("slow", None, || async {
            tokio::time::sleep(Duration::from_millis(15)).await;
            Ok::<_, String>(())
        })
        .await
        .unwrap();
        let history = dbg.history().await;
        let duration = history[1].duration_ms.unwrap();
        assert!(duration >= 15, "duration {duration}");
        assert_eq!(
            duration,
            (history[1].timestamp - history[0].timestamp).num_milliseconds()
        );
    }

    #[tokio::test]
    async fn breakpoint_suspends_until_continue() {
        let dbg = Arc::new(DebugCoordinator::new());
        dbg.start_debugging().await;
        dbg.add_breakpoint("b", None).await;

        let ran = Arc::new(AtomicBool::new(false));
        let task = {
            let dbg = dbg.clone();
            let ran = ran.clone();
            tokio::spawn(async move {
                dbg.execute_node("a", None, || async { Ok::<_, String>(1) }).await?;
                dbg.execute_node("b", None, || async move {
                    ran.store(true, Ordering::SeqCst);
                    Ok::<_, String>(2)
                })
                .await
            })
        };

        wait_until_paused(&dbg).await;
        assert!(!ran.load(Ordering::SeqCst));
        let snap = dbg.snapshot().await;
        assert_eq!(snap.current_node_id.as_deref(), Some("b"));
        assert_eq!(snap.execution_history.len(), 3);
        assert_eq!(snap.execution_history[2].status, NodeStatus::Running);

        dbg.step_over().await;
        assert_eq!(task.await.unwrap(), Ok(2));
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(dbg.history().await.len(), 4);
        // The step is spent; the session holds whatever node comes next.
        assert!(dbg.is_paused().await);
    }

    #[tokio::test]
    async fn step_runs_one_node_then_holds_the_next() {
        let dbg = Arc::new(DebugCoordinator::new());
        dbg.start_debugging().await;
        dbg.add_breakpoint("a", None).await;

        let task = {
            let dbg = dbg.clone();
            tokio::spawn(async move {
                dbg.execute_node("a", None, || async { Ok::<_, String>(1) }).await?;
                dbg.execute_node("b", None, || async { Ok::<_, String>(2) }).await
            })
        };
        wait_until_paused(&dbg).await;

        dbg.step_over().await;
        tokio::time::timeout(Duration::from_secs(1), async {
            while dbg.history().await.len() < 2 || !dbg.is_paused().await {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("step recorded a and paused");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(
            statuses(&dbg.history().await),
            vec![
                ("a".into(), NodeStatus::Running),
                ("a".into(), NodeStatus::Success),
            ]
        );

        dbg.continue_execution().await;
        assert_eq!(task.await.unwrap(), Ok(2));
        assert_eq!(dbg.history().await.len(), 4);
        assert!(!dbg.is_paused().await);
    }

    #[tokio::test]
    async fn pause_during_work_holds_the_outcome() {
        let dbg = Arc::new(DebugCoordinator::new());
        dbg.start_debugging().await;
        let (finish, finished) = tokio::sync::oneshot::channel::<()>();

        let task = {
            let dbg = dbg.clone();
            tokio::spawn(async move {
                dbg.execute_node("a", None, || async move {
                    let _ = finished.await;
                    Ok::<_, String>("done")
                })
                .await
            })
        };
        tokio::time::timeout(Duration::from_secs(1), async {
            while dbg.history().await.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("node started");

        let resumed = dbg.pause().await;
        finish.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dbg.history().await.len(), 1);
        assert!(!task.is_finished());

        dbg.continue_execution().await;
        resumed.await;
        assert_eq!(task.await.unwrap(), Ok("done"));
        assert_eq!(
            statuses(&dbg.history().await),
            vec![
                ("a".into(), NodeStatus::Running),
                ("a".into(), NodeStatus::Success),
            ]
        );
    }

    #[tokio::test]
    async fn breakpoints_ignored_when_not_debugging() {
        let dbg = DebugCoordinator::new();
        dbg.add_breakpoint("a", None).await;
        let out = tokio::time::timeout(
            Duration::from_secs(1),
            dbg.execute_node("a", None, || async { Ok::<_, String>(1) }),
        )
        .await
        .expect("did not pause");
        assert_eq!(out, Ok(1));
    }

    #[tokio::test]
    async fn user_pause_holds_next_node_until_continue() {
        let dbg = Arc::new(DebugCoordinator::new());
        dbg.start_debugging().await;
        let resumed = dbg.pause().await;

        let task = {
            let dbg = dbg.clone();
            tokio::spawn(async move {
                dbg.execute_node("a", None, || async { Ok::<_, String>("done") })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(dbg.history().await.is_empty());

        dbg.continue_execution().await;
        resumed.await;
        assert_eq!(task.await.unwrap(), Ok("done"));
        assert_eq!(
            statuses(&dbg.history().await),
            vec![
                ("a".into(), NodeStatus::Running),
                ("a".into(), NodeStatus::Success),
            ]
        );
    }

    #[tokio::test]
    async fn failing_condition_pauses() {
        let dbg = DebugCoordinator::new();
        dbg.add_breakpoint("a", Some("throw".into())).await;
        assert!(dbg.should_pause_at_node("a").await);

        dbg.add_breakpoint("b", Some("step > 100".into())).await;
        assert!(!dbg.should_pause_at_node("b").await);

        dbg.add_breakpoint("c", Some("node_id == 'c'".into())).await;
        assert!(dbg.should_pause_at_node("c").await);
        assert!(!dbg.toggle_breakpoint("c").await);
        assert!(!dbg.should_pause_at_node("c").await);

        assert!(!dbg.should_pause_at_node("unset").await);
    }

    #[tokio::test]
    async fn condition_sees_upstream_outputs() {
        let dbg = Arc::new(DebugCoordinator::new());
        dbg.start_debugging().await;
        dbg.add_breakpoint("check", Some("outputs.fetch.status != 200".into()))
            .await;

        dbg.execute_node("fetch", None, || async {
            Ok::<_, String>(json!({"status": 200}))
        })
        .await
        .unwrap();
        let out = tokio::time::timeout(
            Duration::from_secs(1),
            dbg.execute_node("check", None, || async { Ok::<_, String>(true) }),
        )
        .await
        .expect("condition false, no pause");
        assert_eq!(out, Ok(true));
    }

    #[tokio::test]
    async fn stop_debugging_releases_suspended_node() {
        let dbg = Arc::new(DebugCoordinator::new());
        dbg.start_debugging().await;
        dbg.add_breakpoint("a", None).await;

        let task = {
            let dbg = dbg.clone();
            tokio::spawn(async move {
                dbg.execute_node("a", None, || async { Ok::<_, String>(1) }).await
            })
        };
        wait_until_paused(&dbg).await;

        dbg.stop_debugging().await;
        assert_eq!(task.await.unwrap(), Ok(1));
        assert!(!dbg.is_debugging().await);
        assert!(!dbg.is_paused().await);
        // The outcome belongs to the discarded session.
        assert!(dbg.history().await.is_empty());
    }

    #[tokio::test]
    async fn time_travel_through_coordinator() {
        let dbg = DebugCoordinator::new();
        for node in ["a", "b"] {
            dbg.execute_node(node, None, || async { Ok::<_, String>(()) })
                .await
                .unwrap();
        }
        let history = dbg.history().await;

        let idx = dbg.time_travel(history[1].timestamp).await;
        assert_eq!(idx, Some(1));
        assert_eq!(dbg.current_state().await.as_ref(), Some(&history[1]));
        assert_eq!(dbg.snapshot().await.time_travel_index, Some(1));

        let missing = history[3].timestamp + chrono::Duration::days(1);
        assert_eq!(dbg.time_travel(missing).await, None);
        assert_eq!(dbg.current_state().await.as_ref(), history.last());

        assert!(dbg.time_travel_to(9).await.is_err());
        dbg.restart().await;
        assert!(dbg.current_state().await.is_none());
        assert_eq!(dbg.snapshot().await.time_travel_index, None);
    }

    #[tokio::test]
    async fn metrics_from_recorded_states() {
        let dbg = DebugCoordinator::new();
        for (node, status, ms) in [
            ("A", NodeStatus::Success, 100),
            ("A", NodeStatus::Error, 50),
            ("B", NodeStatus::Success, 200),
        ] {
            dbg.record_state(ExecutionState::new(node, status).with_duration(ms))
                .await;
        }
        let m = dbg.performance_metrics().await;
        assert_eq!(m.node_metrics["A"].execution_count, 2);
        assert_eq!(m.node_metrics["A"].average_duration_ms, 75.0);
        assert_eq!(m.node_metrics["B"].success_rate, 100.0);
        assert_eq!((m.success_rate * 10.0).round() / 10.0, 66.7);
    }
}
