//! Shared, lock-free run statistics.
//!
//! One [`StatsRegistry`] exists per run and is shared by `Arc` between every
//! agent, the reporter and the run controller. All mutators are single atomic
//! operations, so any number of agents can record concurrently without lost
//! updates. Fields are read independently; a [`Snapshot`] is correct per field,
//! not across fields.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Counters for one load test run.
#[derive(Debug)]
pub struct StatsRegistry {
    connected: AtomicU64,
    opened: AtomicU64,
    peak_connected: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    errors: AtomicU64,
    start_time: Instant,
}

impl StatsRegistry {
    /// Create a registry whose clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connected: AtomicU64::new(0),
            opened: AtomicU64::new(0),
            peak_connected: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record one successful emission.
    pub fn increment_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one inbound message.
    pub fn increment_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one connect, send or receive failure.
    pub fn increment_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection reaching the connected state.
    ///
    /// Returns the live connection count including this one.
    pub fn connection_opened(&self) -> u64 {
        self.opened.fetch_add(1, Ordering::Relaxed);
        let now = self.connected.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_connected.fetch_max(now, Ordering::Relaxed);
        now
    }

    /// Record a connection leaving the connected state.
    ///
    /// Saturates at zero.
    pub fn connection_closed(&self) {
        let _ = self
            .connected
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Time since the registry was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            connected: self.connected.load(Ordering::Relaxed),
            opened: self.opened.load(Ordering::Relaxed),
            peak_connected: self.peak_connected.load(Ordering::Relaxed),
            sent: self.messages_sent.load(Ordering::Relaxed),
            received: self.messages_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
        }
    }
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a [`StatsRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Snapshot {
    /// Live connections.
    pub connected: u64,
    /// Connections that ever reached the connected state.
    pub opened: u64,
    /// Highest simultaneous live connection count.
    pub peak_connected: u64,
    /// Messages sent.
    pub sent: u64,
    /// Messages received.
    pub received: u64,
    /// Connect, send and receive failures.
    pub errors: u64,
    /// Time since the run started.
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl Snapshot {
    /// Elapsed time in fractional seconds.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Sent messages per second since the run started.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        per_second(self.sent, self.elapsed_secs())
    }

    /// Received messages per second since the run started.
    #[must_use]
    pub fn received_throughput(&self) -> f64 {
        per_second(self.received, self.elapsed_secs())
    }

    /// Errors as a percentage of all sent and received messages.
    ///
    /// Returns `0.0` when nothing was sent or received.
    #[must_use]
    pub fn error_rate_percent(&self) -> f64 {
        let total = self.sent + self.received;
        if total == 0 {
            0.0
        } else {
            self.errors as f64 / total as f64 * 100.0
        }
    }
}

fn per_second(count: u64, secs: f64) -> f64 {
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
