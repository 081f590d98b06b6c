//! Single-use shutdown latch and interrupt routing.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tokio::sync::{Notify, oneshot};
use tracing::info;

/// What ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownReason {
    /// The configured duration elapsed.
    Elapsed,
    /// The process was interrupted.
    Interrupted,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Elapsed => write!(f, "elapsed"),
            ShutdownReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Latch that records the first shutdown trigger and ignores the rest.
///
/// Cloning shares the latch. Any task may trigger it; every waiter observes
/// the same winning reason.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    reason: OnceLock<ShutdownReason>,
    notify: Notify,
}

impl ShutdownSignal {
    /// New, untriggered latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the latch.
    ///
    /// Returns `true` only for the call that won.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let won = self.inner.reason.set(reason).is_ok();
        if won {
            self.inner.notify.notify_waiters();
        }
        won
    }

    /// The winning reason, if triggered.
    #[must_use]
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.inner.reason.get().copied()
    }

    /// Check if the latch has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.reason().is_some()
    }

    /// Wait until triggered and return the winning reason.
    pub async fn wait(&self) -> ShutdownReason {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a trigger in between is not missed.
            notified.as_mut().enable();
            if let Some(reason) = self.reason() {
                return reason;
            }
            notified.await;
        }
    }
}

/// Route a sequence of process interrupts.
///
/// Each call to `next` waits for one interrupt and resolves `false` if
/// interrupts cannot be observed at all. The returned future resolves on the
/// first interrupt and is meant to be passed to
/// [`RunController::run`](crate::RunController::run). `abort` runs on the
/// second interrupt, or on the first one if the run has already stopped
/// listening because its duration elapsed.
///
/// The listener is spawned immediately, so it must be called from within a
/// Tokio runtime and stays active through shutdown.
pub fn route_interrupts<N, Fut, A>(mut next: N, abort: A) -> impl Future<Output = ()> + Send + 'static
where
    N: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
    A: FnOnce() + Send + 'static,
{
    let (first_tx, first_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        if !next().await {
            return;
        }
        if first_tx.send(()).is_ok() {
            info!("interrupt received, stopping (interrupt again to abort)");
            if !next().await {
                return;
            }
        }
        abort();
    });

    async move {
        if first_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
