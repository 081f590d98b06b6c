//! Rendering of progress lines and the final summary.

use std::io::Write;

use serde::Serialize;

use crate::shutdown::ShutdownReason;
use crate::error::Result;
use crate::stats::Snapshot;

/// Statistics of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalReport {
    /// Wall time from start to the final snapshot, in seconds.
    pub duration_secs: f64,
    /// Connections requested.
    pub configured_connections: usize,
    /// Connections that reached the connected state at least once.
    pub achieved_connections: u64,
    /// Highest number of simultaneously open connections.
    pub peak_connected: u64,
    /// Messages sent.
    pub sent: u64,
    /// Messages received.
    pub received: u64,
    /// Connect, send and receive failures.
    pub errors: u64,
    /// `sent / duration`.
    pub avg_throughput: f64,
    /// `received / duration`.
    pub received_throughput: f64,
    /// `errors / (sent + received) * 100`, 0 when nothing moved.
    pub error_rate_percent: f64,
    /// What ended the run.
    pub reason: ShutdownReason,
}

impl FinalReport {
    /// Build the report from the final snapshot.
    #[must_use]
    pub fn new(configured_connections: usize, snapshot: &Snapshot, reason: ShutdownReason) -> Self {
        Self {
            duration_secs: snapshot.elapsed_secs(),
            configured_connections,
            achieved_connections: snapshot.opened,
            peak_connected: snapshot.peak_connected,
            sent: snapshot.sent,
            received: snapshot.received,
            errors: snapshot.errors,
            avg_throughput: snapshot.throughput(),
            received_throughput: snapshot.received_throughput(),
            error_rate_percent: snapshot.error_rate_percent(),
            reason,
        }
    }

    /// Multi-line human readable summary.
    #[must_use]
    pub fn render_text(&self) -> String {
        let rule = "━".repeat(48);
        let mut out = String::new();
        out.push_str(&format!("Load test finished ({})\n", self.reason));
        out.push_str(&rule);
        out.push('\n');
        out.push_str("FINAL STATISTICS\n");
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!("  Duration:              {:>12.2} s\n", self.duration_secs));
        out.push_str(&format!("  Connections:           {:>12}\n", self.configured_connections));
        out.push_str(&format!("  Connected:             {:>12}\n", self.achieved_connections));
        out.push_str(&format!("  Peak concurrent:       {:>12}\n", self.peak_connected));
        out.push_str(&format!("  Messages sent:         {:>12}\n", self.sent));
        out.push_str(&format!("  Messages received:     {:>12}\n", self.received));
        out.push_str(&format!("  Errors:                {:>12}\n", self.errors));
        out.push_str(&format!("  Avg throughput:        {:>12.2} msg/s\n", self.avg_throughput));
        out.push_str(&format!("  Received throughput:   {:>12.2} msg/s\n", self.received_throughput));
        out.push_str(&format!("  Error rate:            {:>12.2} %\n", self.error_rate_percent));
        out.push_str(&rule);
        out
    }
}

/// One progress line: `m:ss | conns | sent | recv | errors | msg/s`.
#[must_use]
pub fn progress_line(snapshot: &Snapshot) -> String {
    let secs = snapshot.elapsed.as_secs();
    format!(
        "{}:{:02} | conns {} | sent {} | recv {} | errors {} | {:.1} msg/s",
        secs / 60,
        secs % 60,
        snapshot.connected,
        snapshot.sent,
        snapshot.received,
        snapshot.errors,
        snapshot.throughput()
    )
}

/// Where progress lines and the final report go.
pub trait ReportSink: Send + Sync + 'static {
    /// Called once per reporter tick.
    fn progress(&self, snapshot: &Snapshot);

    /// Called exactly once, after every agent has stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be written.
    fn finish(&self, report: &FinalReport) -> Result<()>;
}

/// Output format of [`StdoutSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Progress lines and a text summary.
    #[default]
    Text,
    /// No progress lines; the final report as one JSON line.
    Json,
}

/// Prints to standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink {
    format: OutputFormat,
}

impl StdoutSink {
    /// Sink printing in `format`.
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl ReportSink for StdoutSink {
    fn progress(&self, snapshot: &Snapshot) {
        if self.format == OutputFormat::Text {
            println!("{}", progress_line(snapshot));
        }
    }

    fn finish(&self, report: &FinalReport) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        match self.format {
            OutputFormat::Text => writeln!(stdout, "{}", report.render_text())?,
            OutputFormat::Json => writeln!(stdout, "{}", serde_json::to_string(report)?)?,
        }
        stdout.flush()?;
        Ok(())
    }
}
