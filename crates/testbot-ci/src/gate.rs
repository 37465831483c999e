//! Single-flight gate around pipeline runs.
//!
//! At most one run holds the gate at any instant. Triggers that arrive while
//! a run is active wait, but only the newest waiter goes on to run: older
//! waiters are superseded when they finally acquire the lock. The backlog of
//! pending runs is therefore at most one.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// What happened to a trigger submitted to the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    /// The run executed and produced `T`.
    Ran(T),

    /// A newer trigger arrived while this one was waiting; nothing ran.
    Superseded,
}

impl<T> GateOutcome<T> {
    pub fn ran(self) -> Option<T> {
        match self {
            GateOutcome::Ran(value) => Some(value),
            GateOutcome::Superseded => None,
        }
    }
}

/// Process-wide run gate.
#[derive(Debug, Default)]
pub struct RunGate {
    lock: Mutex<()>,
    generation: AtomicU64,
    busy: AtomicBool,
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a run is currently executing. Does not touch the lock.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Run `fut` once the gate is free, unless a newer trigger has arrived in the meantime.
    ///
    /// Every trigger takes its ticket on arrival, so ticket order is arrival
    /// order. A trigger that finds the gate idle always runs. Only triggers
    /// that had to wait can be superseded.
    pub async fn run<F, T>(&self, fut: F) -> GateOutcome<T>
    where
        F: Future<Output = T>,
    {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let _guard = match self.lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!(ticket, "run in progress; waiting for gate");
                let guard = self.lock.lock().await;
                let latest = self.generation.load(Ordering::SeqCst);
                if latest != ticket {
                    debug!(ticket, latest, "trigger superseded by a newer push");
                    return GateOutcome::Superseded;
                }
                guard
            }
        };

        let _busy = BusyFlag::raise(&self.busy);
        GateOutcome::Ran(fut.await)
    }
}

/// Set while a run executes; cleared on drop, including on panic or cancellation.
struct BusyFlag<'a>(&'a AtomicBool);

impl<'a> BusyFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_idle_gate_runs_immediately() {
        let gate = RunGate::new();
        assert!(!gate.is_busy());
        assert_eq!(gate.run(async { 7 }).await, GateOutcome::Ran(7));
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn test_sequential_triggers_all_run() {
        let gate = RunGate::new();
        assert_eq!(gate.run(async { 1 }).await.ran(), Some(1));
        assert_eq!(gate.run(async { 2 }).await.ran(), Some(2));
    }

    #[tokio::test]
    async fn test_busy_while_running() {
        let gate = Arc::new(RunGate::new());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let g = gate.clone();
        let handle = tokio::spawn(async move {
            g.run(async move {
                let _ = started_tx.send(());
                let _ = release_rx.await;
            })
            .await
        });

        started_rx.await.expect("run started");
        assert!(gate.is_busy());
        release_tx.send(()).expect("release");
        assert_eq!(handle.await.expect("join"), GateOutcome::Ran(()));
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn test_queued_trigger_replaced_by_newer_one() {
        let gate = Arc::new(RunGate::new());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let g = gate.clone();
        let first = tokio::spawn(async move {
            g.run(async move {
                let _ = started_tx.send(());
                let _ = release_rx.await;
                "first"
            })
            .await
        });
        started_rx.await.expect("first started");

        let g = gate.clone();
        let second = tokio::spawn(async move { g.run(async { "second" }).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let g = gate.clone();
        let third = tokio::spawn(async move { g.run(async { "third" }).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        release_tx.send(()).expect("release");

        assert_eq!(first.await.expect("join"), GateOutcome::Ran("first"));
        assert_eq!(second.await.expect("join"), GateOutcome::Superseded);
        assert_eq!(third.await.expect("join"), GateOutcome::Ran("third"));
    }

    #[tokio::test]
    async fn test_busy_cleared_after_panicking_run() {
        let gate = Arc::new(RunGate::new());

        let g = gate.clone();
        let result = tokio::spawn(async move { g.run(async { panic!("boom") }).await }).await;
        assert!(result.is_err());
        assert!(!gate.is_busy());
        assert_eq!(gate.run(async { 1 }).await, GateOutcome::Ran(1));
    }

    #[tokio::test]
    async fn test_newest_waiter_wins_in_arrival_order() {
        let gate = Arc::new(RunGate::new());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let g = gate.clone();
        let first = tokio::spawn(async move {
            g.run(async move {
                let _ = started_tx.send(());
                let _ = release_rx.await;
                0
            })
            .await
        });
        started_rx.await.expect("first started");

        let mut waiters = Vec::new();
        for n in 1..=4 {
            let g = gate.clone();
            waiters.push(tokio::spawn(async move { g.run(async move { n }).await }));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        release_tx.send(()).expect("release");
        assert_eq!(first.await.expect("join"), GateOutcome::Ran(0));

        let mut outcomes = Vec::new();
        for waiter in waiters {
            outcomes.push(waiter.await.expect("join"));
        }
        assert_eq!(
            outcomes,
            vec![
                GateOutcome::Superseded,
                GateOutcome::Superseded,
                GateOutcome::Superseded,
                GateOutcome::Ran(4),
            ]
        );
        assert!(!gate.is_busy());
    }
}
