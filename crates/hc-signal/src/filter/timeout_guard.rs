//! Liveness guard for streams that may go silent.
//!
//! The guard runs its own timer task. Every real signal passes through unchanged
//! and restarts the timer; if the timer runs out first, a synthetic total failure
//! carrying [`SignalError::Timeout`] is emitted instead.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::error::{FilterError, FilterResult};
use crate::signal::{Signal, SignalError};
use crate::stream::{channel, SignalReceiver};

/// Shortest timeout a guard accepts.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(5);

/// Emits a timeout failure when the guarded stream stays silent too long.
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    marker: String,
    timeout: Duration,
    repeat: bool,
}

impl TimeoutGuard {
    /// `marker` names the guarded stream in the timeout error.
    ///
    /// With `repeat` unset, a silent stream gets one timeout signal per episode;
    /// with it set, one per elapsed `timeout` until the stream speaks again.
    pub fn new(marker: impl Into<String>, timeout: Duration, repeat: bool) -> FilterResult<Self> {
        if timeout < MIN_TIMEOUT {
            return Err(FilterError::InvalidArg {
                what: "timeout shorter than the allowed minimum",
            });
        }
        Ok(Self {
            marker: marker.into(),
            timeout,
            repeat,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start guarding `input`.
    ///
    /// The returned stream completes when `input` completes, when the downstream
    /// reader goes away, or when [`GuardHandle::close`] is called.
    pub fn spawn<T, P>(self, mut input: SignalReceiver<T, P>) -> (SignalReceiver<T, P>, GuardHandle)
    where
        T: Send + 'static,
        P: Send + 'static,
    {
        let (tx, rx) = channel();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut last_seen = Instant::now();
            let mut in_timeout = false;
            let mut handle_alive = true;

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed(), if handle_alive => {
                        match changed {
                            Ok(()) if *shutdown_rx.borrow() => break,
                            Ok(()) => {}
                            // Handle dropped without closing: keep running until input completes.
                            Err(_) => handle_alive = false,
                        }
                    }

                    _ = tx.closed() => break,

                    next = input.recv() => {
                        let Some(signal) = next else { break };
                        last_seen = Instant::now();
                        in_timeout = false;
                        if tx.send(signal).await.is_err() {
                            break;
                        }
                    }

                    _ = sleep_until(last_seen + self.timeout) => {
                        last_seen = Instant::now();
                        if in_timeout && !self.repeat {
                            continue;
                        }
                        in_timeout = true;
                        tracing::warn!(marker = %self.marker, timeout = ?self.timeout, "stream timed out");
                        let failure = Signal::failure(
                            Utc::now(),
                            SignalError::Timeout {
                                marker: self.marker.clone(),
                                timeout: self.timeout,
                            },
                        );
                        if tx.send(failure).await.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(marker = %self.marker, "timeout guard stopped");
        });

        (
            rx,
            GuardHandle {
                shutdown: shutdown_tx,
                task: Some(task),
            },
        )
    }
}

/// Controls a running [`TimeoutGuard`].
///
/// Dropping the handle leaves the guard running until its input completes.
#[derive(Debug)]
pub struct GuardHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl GuardHandle {
    /// Stop the guard and complete its output. Safe to call more than once.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Wait for the guard task to finish.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "timeout guard task failed");
            }
        }
    }
}
