//! Combinators for a projection's side effects.
//!
//! A projection has two kinds of side effects with different guarantees:
//!
//! - **Persistence** (read-model update + audit append) must all complete
//!   before the handler reports success. [`wait_all`] drives both writes to
//!   completion, even when one of them fails early.
//! - **Fan-out** (realtime push + integration message) happens after
//!   persistence and is best-effort. [`FanoutTracker::spawn_logged`] runs each
//!   sink on its own task, logs and counts its failure, and keeps the task
//!   handle so the process can [`FanoutTracker::drain`] outstanding work on
//!   shutdown.

use crate::metrics::FanoutMetrics;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use ticketflow_core::{FanoutSink, PipelineError};
use tokio::task::JoinSet;

/// Await both futures to completion and return the first error, if any.
///
/// Unlike `try_join!`, a failure of one future does not cancel the other:
/// a write that already started is never abandoned half-way.
///
/// # Errors
///
/// Returns the error of `first` if it failed, otherwise the error of `second`.
pub async fn wait_all<A, B, E>(
    first: impl Future<Output = Result<A, E>>,
    second: impl Future<Output = Result<B, E>>,
) -> Result<(A, B), E> {
    let (first, second) = futures::join!(first, second);
    Ok((first?, second?))
}

/// Tracks spawned fan-out tasks.
///
/// Cloning is cheap; clones share the same set of tasks.
#[derive(Clone, Default)]
pub struct FanoutTracker {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl FanoutTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `effect` for `sink` without waiting for it.
    ///
    /// A failure is logged with `event_id` and counted per sink; it is never
    /// returned to the caller.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_logged<F>(&self, sink: FanoutSink, event_id: String, effect: F)
    where
        F: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let mut tasks = self.lock();
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            match effect.await {
                Ok(()) => {
                    tracing::debug!(sink = %sink, event_id = %event_id, "Fan-out completed");
                    FanoutMetrics::record_completed(sink);
                }
                Err(error) => {
                    tracing::warn!(
                        sink = %sink,
                        event_id = %event_id,
                        error = %error,
                        "Fan-out failed; committed state is kept"
                    );
                    FanoutMetrics::record_failure(sink);
                }
            }
        });
        FanoutMetrics::record_in_flight(tasks.len());
    }

    /// Number of tracked tasks that have not been reaped yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.lock();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Wait until every tracked task, including ones spawned while waiting,
    /// has finished. Returns how many tasks were awaited.
    pub async fn drain(&self) -> usize {
        let mut drained = 0;
        loop {
            let mut batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                FanoutMetrics::record_in_flight(0);
                return drained;
            }
            while let Some(joined) = batch.join_next().await {
                drained += 1;
                if let Err(error) = joined {
                    tracing::error!(error = %error, "Fan-out task panicked");
                }
            }
        }
    }

    /// [`Self::drain`] bounded by `timeout`.
    ///
    /// Returns `false` if tasks were still running when the timeout elapsed;
    /// those tasks are aborted.
    pub async fn drain_with_timeout(&self, timeout: Duration) -> bool {
        if let Ok(drained) = tokio::time::timeout(timeout, self.drain()).await {
            tracing::debug!(drained, "Fan-out tasks drained");
            true
        } else {
            tracing::warn!(?timeout, "Timed out draining fan-out tasks");
            false
        }
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        // A panic while holding the lock cannot leave the set inconsistent.
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for FanoutTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutTracker")
            .field("in_flight", &self.lock().len())
            .finish()
    }
}
