//! Agent lifecycle state machine.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::stats::StatsRegistry;

/// Lifecycle state of one connection agent.
///
/// `Disconnected -> Connecting -> Connected -> (Disconnected | Errored) -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum AgentState {
    /// Not connected yet, or the peer went away.
    #[default]
    Disconnected,
    /// Connect in flight.
    Connecting,
    /// Connected and emitting.
    Connected,
    /// Connect failed.
    Errored,
    /// Stopped. Terminal.
    Closed,
}

impl AgentState {
    /// Check if the agent holds a live connection.
    #[must_use]
    #[inline]
    pub const fn is_connected(&self) -> bool {
        matches!(self, AgentState::Connected)
    }

    /// Check if the agent was stopped.
    #[must_use]
    #[inline]
    pub const fn is_closed(&self) -> bool {
        matches!(self, AgentState::Closed)
    }

    const fn as_u8(self) -> u8 {
        match self {
            AgentState::Disconnected => 0,
            AgentState::Connecting => 1,
            AgentState::Connected => 2,
            AgentState::Errored => 3,
            AgentState::Closed => 4,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => AgentState::Connecting,
            2 => AgentState::Connected,
            3 => AgentState::Errored,
            4 => AgentState::Closed,
            _ => AgentState::Disconnected,
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Disconnected => write!(f, "Disconnected"),
            AgentState::Connecting => write!(f, "Connecting"),
            AgentState::Connected => write!(f, "Connected"),
            AgentState::Errored => write!(f, "Errored"),
            AgentState::Closed => write!(f, "Closed"),
        }
    }
}

/// State shared between an agent task and its handle.
///
/// `Closed` is sticky. The `counted` flag pairs every
/// [`StatsRegistry::connection_opened`] with at most one
/// [`StatsRegistry::connection_closed`], no matter how many paths try to
/// release the connection.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: AtomicU8,
    counted: AtomicBool,
}

impl Lifecycle {
    /// New lifecycle in [`AgentState::Disconnected`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AgentState {
        AgentState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next` unless already closed.
    ///
    /// Returns `false` if the agent was closed and the state did not change.
    pub fn transition(&self, next: AgentState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != AgentState::Closed.as_u8()).then_some(next.as_u8())
            })
            .is_ok()
    }

    /// Enter `Connected` and count the connection.
    ///
    /// Returns the live connection count, or `None` if the agent was closed
    /// in the meantime and nothing was counted.
    pub fn mark_connected(&self, stats: &StatsRegistry) -> Option<u64> {
        if !self.transition(AgentState::Connected) {
            return None;
        }
        self.counted.store(true, Ordering::Release);
        Some(stats.connection_opened())
    }

    /// Uncount the connection if it is still counted.
    ///
    /// Returns `true` for the one call that decremented.
    pub fn release(&self, stats: &StatsRegistry) -> bool {
        if self.counted.swap(false, Ordering::AcqRel) {
            stats.connection_closed();
            true
        } else {
            false
        }
    }
}
