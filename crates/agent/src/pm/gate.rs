//! Gate — one-shot rendezvous between a waiter and two racing signals.
//!
//! A caller that must block until a process either prints a readiness line
//! or exits builds a [`ReadyGate`], registers the hooks it produces, and
//! waits. Whichever signal arrives first decides the outcome; the other is
//! a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;

use super::hook::{ExitHook, HookError, MatchHook};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// The readiness pattern matched.
    Ready,
    /// The process exited before it became ready.
    Exited { success: bool },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GateError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("every gate signal was dropped without firing")]
    Abandoned,
}

/// Firing side of the gate. Cheap to share between hooks.
#[derive(Debug)]
pub struct GateSignal {
    fired: AtomicBool,
    slot: Mutex<Option<oneshot::Sender<GateOutcome>>>,
}

/// Waiting side of the gate.
#[derive(Debug)]
pub struct GateWaiter {
    rx: oneshot::Receiver<GateOutcome>,
}

pub struct ReadyGate;

impl ReadyGate {
    pub fn new() -> (Arc<GateSignal>, GateWaiter) {
        let (tx, rx) = oneshot::channel();
        let signal = Arc::new(GateSignal {
            fired: AtomicBool::new(false),
            slot: Mutex::new(Some(tx)),
        });
        (signal, GateWaiter { rx })
    }
}

impl GateSignal {
    /// Deliver an outcome. Only the first call wins; returns whether this
    /// call was it.
    pub fn fire(&self, outcome: GateOutcome) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Some(tx) = self.slot.lock().take() {
            let _ = tx.send(outcome);
        }
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Hooks that fire this gate: `Ready` when a message matches `pattern`,
    /// `Exited` when the process terminates.
    pub fn hooks(self: &Arc<Self>, pattern: &str) -> Result<(MatchHook, ExitHook), HookError> {
        let on_ready = Arc::clone(self);
        let on_exit = Arc::clone(self);

        let ready = MatchHook::new(pattern, move |_| {
            on_ready.fire(GateOutcome::Ready);
        })?;
        let exit = ExitHook::new(move |success| {
            on_exit.fire(GateOutcome::Exited { success });
        });

        Ok((ready, exit))
    }
}

impl GateWaiter {
    /// Block until the gate fires, or until `deadline` elapses.
    pub async fn wait(self, deadline: Option<Duration>) -> Result<GateOutcome, GateError> {
        let received = match deadline {
            Some(limit) => tokio::time::timeout(limit, self.rx)
                .await
                .map_err(|_| GateError::Timeout(limit))?,
            None => self.rx.await,
        };
        received.map_err(|_| GateError::Abandoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pm::message::Message;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_ready_wins_then_exit_is_noop() {
        let (signal, waiter) = ReadyGate::new();
        assert!(signal.fire(GateOutcome::Ready));
        assert!(!signal.fire(GateOutcome::Exited { success: false }));

        assert_eq!(waiter.wait(None).await, Ok(GateOutcome::Ready));
    }

    #[tokio::test]
    async fn test_exit_first_reports_outcome() {
        let (signal, waiter) = ReadyGate::new();
        assert!(signal.fire(GateOutcome::Exited { success: false }));
        assert!(!signal.fire(GateOutcome::Ready));

        assert_eq!(
            waiter.wait(None).await,
            Ok(GateOutcome::Exited { success: false })
        );
    }

    #[tokio::test]
    async fn test_hooks_drive_the_gate() {
        let (signal, waiter) = ReadyGate::new();
        let (ready, exit) = signal.hooks("mount starts").unwrap();

        assert!(!ready.offer(&Message::new(Arc::from("c"), 1, "mounting")));
        assert!(!signal.has_fired());
        assert!(ready.offer(&Message::new(Arc::from("c"), 1, "mount starts")));
        exit.fire(false);

        assert_eq!(waiter.wait(None).await, Ok(GateOutcome::Ready));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_signals_fire_exactly_once() {
        for _ in 0..200 {
            let (signal, waiter) = ReadyGate::new();
            let winners = Arc::new(AtomicUsize::new(0));

            let mut tasks = Vec::new();
            for i in 0..8 {
                let signal = Arc::clone(&signal);
                let winners = Arc::clone(&winners);
                tasks.push(tokio::spawn(async move {
                    let outcome = if i % 2 == 0 {
                        GateOutcome::Ready
                    } else {
                        GateOutcome::Exited { success: true }
                    };
                    if signal.fire(outcome) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                }));
            }
            for task in tasks {
                task.await.unwrap();
            }

            assert_eq!(winners.load(Ordering::SeqCst), 1);
            assert!(waiter.wait(None).await.is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let (_signal, waiter) = ReadyGate::new();
        let result = waiter.wait(Some(Duration::from_secs(5))).await;
        assert_eq!(result, Err(GateError::Timeout(Duration::from_secs(5))));
    }

    #[tokio::test]
    async fn test_dropped_signal_abandons_waiter() {
        let (signal, waiter) = ReadyGate::new();
        drop(signal);
        assert_eq!(waiter.wait(None).await, Err(GateError::Abandoned));
    }
}
