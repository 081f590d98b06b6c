//! Fan-out and fan-in of connection agents.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::agent::{AgentHandle, ConnectionAgent};
use crate::config::RunConfig;
use crate::stats::StatsRegistry;
use crate::transport::Transport;

/// The set of agents of one run.
///
/// Every agent handle is in place before the first agent task is spawned;
/// afterwards the collection is only read.
#[derive(Debug)]
pub struct ConnectionPool {
    agents: Vec<AgentHandle>,
    tasks: Vec<AbortHandle>,
    tracker: TaskTracker,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Create one agent per connection index, in index order, and start them
    /// all concurrently.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<T: Transport>(
        config: &RunConfig,
        transport: Arc<T>,
        stats: Arc<StatsRegistry>,
    ) -> Self {
        let interval = config.emit_interval();
        let agents: Vec<ConnectionAgent<T>> = (0..config.connections())
            .map(|index| {
                ConnectionAgent::new(
                    index,
                    config.url().clone(),
                    interval,
                    transport.clone(),
                    stats.clone(),
                    CancellationToken::new(),
                )
            })
            .collect();
        let handles: Vec<AgentHandle> = agents.iter().map(ConnectionAgent::handle).collect();

        let tracker = TaskTracker::new();
        let tasks = agents
            .into_iter()
            .map(|agent| tracker.spawn(agent.run()).abort_handle())
            .collect();
        tracker.close();

        info!(
            connections = handles.len(),
            interval_ms = interval.as_millis() as u64,
            url = %config.url(),
            "started agents"
        );

        Self {
            agents: handles,
            tasks,
            tracker,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Check if the pool has no agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Agent handles in index order.
    #[must_use]
    pub fn agents(&self) -> &[AgentHandle] {
        &self.agents
    }

    /// Check if [`close_all`](Self::close_all) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop every agent.
    ///
    /// Idempotent. Already stopped, failed or disconnected agents are fine.
    /// Returns once every agent has been told to stop; use
    /// [`wait`](Self::wait) to wait for them to finish.
    pub fn close_all(&self) {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        for agent in &self.agents {
            agent.stop();
        }
        if first {
            debug!(agents = self.agents.len(), "stop issued to all agents");
        }
    }

    /// Wait for every agent task to finish, up to `grace`.
    ///
    /// Tasks still running after `grace` are aborted and their connections
    /// released. Returns how many were aborted.
    pub async fn wait(&self, grace: Duration) -> usize {
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            return 0;
        }

        let stragglers: Vec<&AgentHandle> = self
            .agents
            .iter()
            .zip(&self.tasks)
            .filter(|(_, task)| !task.is_finished())
            .map(|(agent, task)| {
                task.abort();
                agent
            })
            .collect();
        self.tracker.wait().await;

        for agent in &stragglers {
            agent.force_closed();
        }
        warn!(
            aborted = stragglers.len(),
            grace_ms = grace.as_millis() as u64,
            "aborted agents that outlived the shutdown grace period"
        );
        stragglers.len()
    }
}
