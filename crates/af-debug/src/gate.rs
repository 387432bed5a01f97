//! Pause gate: suspension points released by an explicit continue signal.
//!
//! `wait()` registers a waiter and returns a [`PauseHandle`]; `release()`
//! resumes the oldest waiter. A handle whose gate is dropped resolves
//! immediately so a discarded session never leaves a task stuck.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

#[derive(Debug, Default)]
pub struct PauseGate {
    waiters: Mutex<VecDeque<oneshot::Sender<()>>>,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn waiters(&self) -> MutexGuard<'_, VecDeque<oneshot::Sender<()>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter. The returned handle resolves on `release`.
    pub fn wait(&self) -> PauseHandle {
        let (tx, rx) = oneshot::channel();
        self.waiters().push_back(tx);
        PauseHandle { rx }
    }

    /// Resume exactly one waiter (FIFO). Returns false if nobody was waiting.
    pub fn release(&self) -> bool {
        let mut waiters = self.waiters();
        while let Some(tx) = waiters.pop_front() {
            // A dropped handle cannot be resumed; try the next one.
            if tx.send(()).is_ok() {
                return true;
            }
        }
        false
    }

    /// Resume every waiter. Returns how many were resumed.
    pub fn release_all(&self) -> usize {
        self.waiters()
            .drain(..)
            .map(|tx| tx.send(()))
            .filter(Result::is_ok)
            .count()
    }

    /// Number of live waiters.
    pub fn waiting(&self) -> usize {
        let mut waiters = self.waiters();
        waiters.retain(|tx| !tx.is_closed());
        waiters.len()
    }
}

/// Future that completes when its gate releases it.
#[derive(Debug)]
pub struct PauseHandle {
    rx: oneshot::Receiver<()>,
}

impl Future for PauseHandle {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn release_resumes_one_waiter_in_order() {
        let gate = Arc::new(PauseGate::new());
        let first = gate.wait();
        let mut second = gate.wait();
        assert_eq!(gate.waiting(), 2);

        assert!(gate.release());
        tokio::time::timeout(Duration::from_millis(100), first)
            .await
            .expect("first waiter released");

        // second is still suspended
        let pending = tokio::time::timeout(Duration::from_millis(20), &mut second).await;
        assert!(pending.is_err());

        assert!(gate.release());
        second.await;
        assert!(!gate.release());
    }

    #[tokio::test]
    async fn release_skips_dropped_handles() {
        let gate = PauseGate::new();
        drop(gate.wait());
        let live = gate.wait();
        assert_eq!(gate.waiting(), 1);
        assert!(gate.release());
        live.await;
    }

    #[tokio::test]
    async fn release_all_and_dropped_gate() {
        let gate = PauseGate::new();
        let a = gate.wait();
        let b = gate.wait();
        assert_eq!(gate.release_all(), 2);
        a.await;
        b.await;

        let gate = PauseGate::new();
        let orphan = gate.wait();
        drop(gate);
        orphan.await;
    }
}
