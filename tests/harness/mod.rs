//! Test harness for load generation tests.
//!
//! - [`MockTransport`]: scripted in-memory connections
//! - [`RecordingSink`]: captures progress lines and the final report
//! - [`TestServer`]: in-process WebSocket / Socket.IO echo server

#![allow(dead_code)]

mod server;
mod sink;
mod transport;

pub use server::{ServerMode, ServerOptions, TestServer};
pub use sink::{RecordingSink, SinkEvent};
pub use transport::MockTransport;
