//! # wsload - Concurrent WebSocket / Socket.IO load generation
//!
//! `wsload` opens N client connections to a server, has each one emit
//! messages at a fixed rate, counts everything that comes back and reports
//! throughput and error statistics live and at the end of the run.
//!
//! ## Features
//!
//! - **Lock-free statistics** shared by every connection
//! - **Independent agents**: one task per connection, failures stay local
//! - **Single shutdown path** for duration expiry and Ctrl-C
//! - **Socket.IO v4 and plain WebSocket** targets, `wss://` behind `tls-rustls`
//! - **Pluggable transport** for testing against anything
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wsload::report::{OutputFormat, StdoutSink};
//! use wsload::{RunConfig, RunController, TransportConfig, WsTransport};
//!
//! let config = RunConfig::new("http://localhost:3030", 100, 30, 2)?;
//! let controller = RunController::new(
//!     config,
//!     Arc::new(WsTransport::new(TransportConfig::default())),
//!     Arc::new(StdoutSink::new(OutputFormat::Text)),
//! );
//! let report = controller.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

pub mod agent;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod pool;
pub mod report;
pub mod reporter;
pub mod shutdown;
pub mod stats;
pub mod transport;

pub use agent::{AgentHandle, AgentState, ConnectionAgent};
pub use config::{Protocol, RunConfig, TransportConfig};
pub use controller::{RunController, RunPhase};
pub use error::{Error, ErrorKind, Result};
pub use pool::ConnectionPool;
pub use report::{FinalReport, ReportSink};
pub use reporter::Reporter;
pub use shutdown::{ShutdownReason, ShutdownSignal};
pub use stats::{Snapshot, StatsRegistry};
pub use transport::{Emission, Link, Session, Transport, TransportEvent, WsTransport};
