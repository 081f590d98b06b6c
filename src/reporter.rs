//! Periodic progress reporting.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::report::ReportSink;
use crate::stats::StatsRegistry;

/// Default progress period.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Hands a snapshot to a [`ReportSink`] once per period.
///
/// Only reads the registry.
#[derive(Debug)]
pub struct Reporter {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Reporter {
    /// Start reporting; the first line comes one `period` from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(stats: Arc<StatsRegistry>, sink: Arc<dyn ReportSink>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let start = tokio::time::Instant::now() + period;
                let mut ticker = tokio::time::interval_at(start, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        _ = ticker.tick() => sink.progress(&stats.snapshot()),
                    }
                }
            }
        });
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Stop reporting and wait for the task to exit.
    ///
    /// No progress line is emitted after this returns. Idempotent.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Check if the reporter is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
