//! Run orchestration.
//!
//! A [`RunController`] owns one run from start to final report:
//!
//! 1. **Idle** - Configured, nothing spawned
//! 2. **Running** - Agents, reporter, duration timer and interrupt watcher live
//! 3. **ShuttingDown** - First trigger won the latch; tearing down in order
//! 4. **Terminated** - Final report delivered; counters frozen
//!
//! The duration timer and the interrupt watcher both only trigger the
//! [`ShutdownSignal`]. Teardown runs once, in [`RunController::run`], no
//! matter which trigger won.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::pool::ConnectionPool;
use crate::report::{FinalReport, ReportSink};
use crate::reporter::{DEFAULT_REPORT_INTERVAL, Reporter};
use crate::shutdown::{ShutdownReason, ShutdownSignal};
use crate::stats::{Snapshot, StatsRegistry};
use crate::transport::Transport;

/// Default time agents get to finish after being stopped.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunPhase {
    /// Not started.
    #[default]
    Idle,
    /// Load is being generated.
    Running,
    /// Tearing down.
    ShuttingDown,
    /// Done.
    Terminated,
}

impl RunPhase {
    const fn as_u8(self) -> u8 {
        match self {
            RunPhase::Idle => 0,
            RunPhase::Running => 1,
            RunPhase::ShuttingDown => 2,
            RunPhase::Terminated => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => RunPhase::Running,
            2 => RunPhase::ShuttingDown,
            3 => RunPhase::Terminated,
            _ => RunPhase::Idle,
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Idle => write!(f, "Idle"),
            RunPhase::Running => write!(f, "Running"),
            RunPhase::ShuttingDown => write!(f, "ShuttingDown"),
            RunPhase::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Drives one load test run.
pub struct RunController<T: Transport> {
    config: RunConfig,
    transport: Arc<T>,
    sink: Arc<dyn ReportSink>,
    signal: ShutdownSignal,
    phase: AtomicU8,
    stats: OnceLock<Arc<StatsRegistry>>,
    report_interval: Duration,
    grace: Duration,
}

impl<T: Transport> RunController<T> {
    /// Controller for `config`, connecting through `transport` and reporting
    /// to `sink`.
    #[must_use]
    pub fn new(config: RunConfig, transport: Arc<T>, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            config,
            transport,
            sink,
            signal: ShutdownSignal::new(),
            phase: AtomicU8::new(RunPhase::Idle.as_u8()),
            stats: OnceLock::new(),
            report_interval: DEFAULT_REPORT_INTERVAL,
            grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Set the progress period.
    #[must_use]
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Set how long stopped agents may take to finish before being aborted.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// The run's shutdown latch. Triggering it ends the run early.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// The run's registry, once the run has started.
    #[must_use]
    pub fn stats(&self) -> Option<Arc<StatsRegistry>> {
        self.stats.get().cloned()
    }

    /// Run to completion.
    ///
    /// Starts every agent, then waits for the configured duration or for
    /// `interrupt` to resolve, whichever comes first. Shutdown stops the
    /// reporter, stops every agent, waits for them and hands the final report
    /// to the sink. The report's duration ends when the agents are told to
    /// stop; its counters are read after they have finished.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidState` if this controller already ran
    /// - errors from [`ReportSink::finish`]
    pub async fn run<F>(&self, interrupt: F) -> Result<FinalReport>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.phase
            .compare_exchange(
                RunPhase::Idle.as_u8(),
                RunPhase::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|p| {
                Error::InvalidState(format!("run already started (phase {})", RunPhase::from_u8(p)))
            })?;

        let stats = Arc::new(StatsRegistry::new());
        let _ = self.stats.set(stats.clone());
        let pool = ConnectionPool::spawn(&self.config, self.transport.clone(), stats.clone());
        let mut reporter = Reporter::start(stats.clone(), self.sink.clone(), self.report_interval);

        let timer = tokio::spawn({
            let signal = self.signal.clone();
            let duration = self.config.duration();
            async move {
                tokio::time::sleep(duration).await;
                if signal.trigger(ShutdownReason::Elapsed) {
                    debug!("run duration elapsed");
                }
            }
        });
        let watcher = tokio::spawn({
            let signal = self.signal.clone();
            async move {
                interrupt.await;
                if signal.trigger(ShutdownReason::Interrupted) {
                    debug!("run interrupted");
                }
            }
        });

        let reason = self.signal.wait().await;
        timer.abort();
        watcher.abort();
        self.phase
            .store(RunPhase::ShuttingDown.as_u8(), Ordering::Release);
        info!(%reason, elapsed_ms = stats.elapsed().as_millis() as u64, "shutting down");

        reporter.stop().await;
        pool.close_all();
        // The run ends here; slow close handshakes are not part of it.
        let elapsed = stats.elapsed();
        pool.wait(self.grace).await;

        let snapshot = Snapshot {
            elapsed,
            ..stats.snapshot()
        };
        let report = FinalReport::new(self.config.connections(), &snapshot, reason);
        let delivered = self.sink.finish(&report);
        self.phase
            .store(RunPhase::Terminated.as_u8(), Ordering::Release);
        info!(
            sent = report.sent,
            received = report.received,
            errors = report.errors,
            "run terminated"
        );
        delivered.map(|()| report)
    }
}

impl<T: Transport> std::fmt::Debug for RunController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("config", &self.config)
            .field("phase", &self.phase())
            .field("shutdown", &self.signal.reason())
            .finish_non_exhaustive()
    }
}
