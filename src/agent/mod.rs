//! Connection agents.
//!
//! An agent is one simulated client: it owns a single connection, emits on
//! a timer and records sends, receives, errors and disconnects in the shared
//! [`StatsRegistry`](crate::stats::StatsRegistry).
//!
//! ## Agent Lifecycle
//!
//! 1. **Disconnected** - Created, not started
//! 2. **Connecting** - Connect in flight
//! 3. **Connected** - Emitting every `1 / rate` seconds
//! 4. **Disconnected** / **Errored** - Peer went away, or connect failed
//! 5. **Closed** - Stopped; terminal
//!
//! Whatever path leads to Closed, a counted connection is uncounted exactly
//! once.

mod state;

#[allow(clippy::module_inception)]
mod agent;

pub use agent::{AgentHandle, ConnectionAgent};
pub use state::{AgentState, Lifecycle};
