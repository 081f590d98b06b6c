use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::agent::state::{AgentState, Lifecycle};
use crate::stats::StatsRegistry;
use crate::transport::{Emission, Link, Session, Transport, TransportEvent};

/// One simulated client connection.
///
/// An agent connects once, emits at a fixed interval while the connection is
/// open and counts what happens to it in the shared [`StatsRegistry`]. It
/// never retries and never touches its siblings.
pub struct ConnectionAgent<T: Transport> {
    index: usize,
    url: Url,
    interval: Duration,
    transport: Arc<T>,
    stats: Arc<StatsRegistry>,
    lifecycle: Arc<Lifecycle>,
    cancel: CancellationToken,
}

/// Cheap handle for observing and stopping an agent from outside its task.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    index: usize,
    lifecycle: Arc<Lifecycle>,
    stats: Arc<StatsRegistry>,
    cancel: CancellationToken,
}

impl<T: Transport> ConnectionAgent<T> {
    /// Create agent `index`, emitting every `interval` once connected.
    ///
    /// `cancel` is the agent's stop signal; pass a child of a shared token to
    /// stop a whole pool at once.
    #[must_use]
    pub fn new(
        index: usize,
        url: Url,
        interval: Duration,
        transport: Arc<T>,
        stats: Arc<StatsRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            index,
            url,
            interval,
            transport,
            stats,
            lifecycle: Arc::new(Lifecycle::new()),
            cancel,
        }
    }

    /// Handle sharing this agent's lifecycle and stop signal.
    #[must_use]
    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            index: self.index,
            lifecycle: self.lifecycle.clone(),
            stats: self.stats.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Drive the agent until it is stopped.
    ///
    /// The first emission goes out as soon as the connection is ready, later
    /// ones every `interval`. The future completes only after
    /// [`AgentHandle::stop`], in state [`AgentState::Closed`].
    pub async fn run(self) {
        let index = self.index;
        self.lifecycle.transition(AgentState::Connecting);

        let connected = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                self.lifecycle.transition(AgentState::Closed);
                return;
            }
            result = self.transport.connect(&self.url, index) => result,
        };

        let Session { mut link, mut events } = match connected {
            Ok(session) => session,
            Err(e) => {
                self.stats.increment_error();
                warn!(index, error = %e, kind = ?e.kind(), "connection failed");
                self.lifecycle.transition(AgentState::Errored);
                self.cancel.cancelled().await;
                self.lifecycle.transition(AgentState::Closed);
                return;
            }
        };

        let Some(live) = self.lifecycle.mark_connected(&self.stats) else {
            link.close().await;
            return;
        };
        info!(index, connected = live, "connection established");

        let mut ticker = Some(emission_ticker(self.interval));
        let mut stopped = false;
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    link.close().await;
                    self.lifecycle.release(&self.stats);
                    stopped = true;
                    break;
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Message(_)) => self.stats.increment_received(),
                    Some(TransportEvent::Error(reason)) => {
                        self.stats.increment_error();
                        debug!(index, %reason, "inbound message failed");
                    }
                    Some(TransportEvent::Disconnected(reason)) => {
                        self.on_disconnect(&reason);
                        break;
                    }
                    None => {
                        self.on_disconnect("event stream ended");
                        break;
                    }
                },
                () = next_tick(&mut ticker) => {
                    if !link.is_open() {
                        debug!(index, "link not open, stopping emission");
                        ticker = None;
                        continue;
                    }
                    match link.send(&Emission::new(index)).await {
                        Ok(()) => self.stats.increment_sent(),
                        Err(e) => {
                            self.stats.increment_error();
                            warn!(
                                index,
                                error = %e,
                                kind = ?e.kind(),
                                "send failed, stopping emission"
                            );
                            ticker = None;
                        }
                    }
                }
            }
        }

        if !stopped {
            // Timer is gone; stay Disconnected until stopped.
            self.cancel.cancelled().await;
            link.close().await;
        }
        self.lifecycle.transition(AgentState::Closed);
    }

    fn on_disconnect(&self, reason: &str) {
        if self.lifecycle.release(&self.stats) {
            info!(index = self.index, %reason, "disconnected");
        }
        self.lifecycle.transition(AgentState::Disconnected);
    }
}

impl<T: Transport> std::fmt::Debug for ConnectionAgent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionAgent")
            .field("index", &self.index)
            .field("url", &self.url.as_str())
            .field("interval", &self.interval)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl AgentHandle {
    /// Connection index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AgentState {
        self.lifecycle.state()
    }

    /// Ask the agent to close its connection and stop emitting.
    ///
    /// Safe to call any number of times, in any state.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Settle the books for an agent whose task was aborted.
    ///
    /// Uncounts a still-counted connection and marks the agent closed.
    pub fn force_closed(&self) {
        if self.lifecycle.release(&self.stats) {
            debug!(index = self.index, "released connection of aborted agent");
        }
        self.lifecycle.transition(AgentState::Closed);
    }
}

fn emission_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// In-memory link; every send lands in `sent` and is echoed back.
    struct TestLink {
        open: Arc<AtomicBool>,
        fail_sends: bool,
        sent: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        echo: mpsc::Sender<TransportEvent>,
    }

    impl Link for TestLink {
        fn is_open(&self) -> bool {
            self.open.load(Ordering::Acquire)
        }

        async fn send(&mut self, _message: &Emission) -> Result<()> {
            if self.fail_sends {
                return Err(Error::Send("broken pipe".into()));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            let _ = self.echo.try_send(TransportEvent::Message(b"echo".to_vec()));
            Ok(())
        }

        async fn close(&mut self) {
            if self.open.swap(false, Ordering::AcqRel) {
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[derive(Default)]
    struct TestTransport {
        refuse: bool,
        fail_sends: bool,
        sent: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        peer: std::sync::Mutex<Option<mpsc::Sender<TransportEvent>>>,
    }

    impl Transport for TestTransport {
        type Link = TestLink;

        async fn connect(&self, _url: &Url, _index: usize) -> Result<Session<TestLink>> {
            if self.refuse {
                return Err(Error::Connect("refused".into()));
            }
            let (tx, rx) = mpsc::channel(64);
            *self.peer.lock().unwrap() = Some(tx.clone());
            let link = TestLink {
                open: Arc::new(AtomicBool::new(true)),
                fail_sends: self.fail_sends,
                sent: self.sent.clone(),
                closes: self.closes.clone(),
                echo: tx,
            };
            Ok(Session::new(link, rx))
        }
    }

    fn spawn_agent(
        transport: TestTransport,
        interval: Duration,
    ) -> (
        Arc<TestTransport>,
        Arc<StatsRegistry>,
        AgentHandle,
        tokio::task::JoinHandle<()>,
    ) {
        let transport = Arc::new(transport);
        let stats = Arc::new(StatsRegistry::new());
        let agent = ConnectionAgent::new(
            0,
            Url::parse("ws://127.0.0.1:9/").unwrap(),
            interval,
            transport.clone(),
            stats.clone(),
            CancellationToken::new(),
        );
        let handle = agent.handle();
        let task = tokio::spawn(agent.run());
        (transport, stats, handle, task)
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_on_connect_then_every_interval() {
        let (transport, stats, handle, task) =
            spawn_agent(TestTransport::default(), Duration::from_millis(200));

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        handle.stop();
        task.await.unwrap();

        let snapshot = stats.snapshot();
        // Ticks at 0, 200, ..., 1000 ms; the last one may lose the race with stop.
        assert!((5..=6).contains(&snapshot.sent), "sent = {}", snapshot.sent);
        assert_eq!(snapshot.sent as usize, transport.sent.load(Ordering::SeqCst));
        assert_eq!(snapshot.connected, 0);
        assert_eq!(snapshot.errors, 0);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), AgentState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_counts_error_and_never_emits() {
        let transport = TestTransport {
            refuse: true,
            ..Default::default()
        };
        let (transport, stats, handle, task) = spawn_agent(transport, Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.state(), AgentState::Errored);
        handle.stop();
        task.await.unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.sent, 0);
        assert_eq!(snapshot.opened, 0);
        assert_eq!(transport.sent.load(Ordering::SeqCst), 0);
        assert_eq!(handle.state(), AgentState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_stops_emission() {
        let transport = TestTransport {
            fail_sends: true,
            ..Default::default()
        };
        let (_transport, stats, handle, task) = spawn_agent(transport, Duration::from_millis(100));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.sent, 0);
        // Still connected; only the timer stopped.
        assert_eq!(snapshot.connected, 1);
        assert_eq!(handle.state(), AgentState::Connected);

        handle.stop();
        task.await.unwrap();
        assert_eq!(stats.snapshot().connected, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_disconnect_decrements_once() {
        let (transport, stats, handle, task) =
            spawn_agent(TestTransport::default(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stats.snapshot().connected, 1);

        let peer = transport.peer.lock().unwrap().clone().unwrap();
        peer.send(TransportEvent::Disconnected("io server disconnect".into()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let sent_after_disconnect = stats.snapshot().sent;
        assert_eq!(stats.snapshot().connected, 0);
        assert_eq!(handle.state(), AgentState::Disconnected);

        // Racing stop() must not decrement a second time.
        stats.connection_opened();
        handle.stop();
        handle.stop();
        task.await.unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connected, 1);
        assert_eq!(snapshot.sent, sent_after_disconnect);
        assert_eq!(handle.state(), AgentState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_error_is_counted_locally() {
        let (transport, stats, handle, task) =
            spawn_agent(TestTransport::default(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let peer = transport.peer.lock().unwrap().clone().unwrap();
        peer.send(TransportEvent::Error("bad packet".into())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.connected, 1);

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_connect() {
        let (transport, stats, handle, task) =
            spawn_agent(TestTransport::default(), Duration::from_millis(100));
        handle.stop();
        task.await.unwrap();

        assert_eq!(handle.state(), AgentState::Closed);
        assert_eq!(stats.snapshot().connected, 0);
        assert!(transport.sent.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test]
    async fn test_force_closed_after_abort() {
        let (_transport, stats, handle, task) =
            spawn_agent(TestTransport::default(), Duration::from_secs(60));
        while stats.snapshot().connected == 0 {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;

        handle.force_closed();
        handle.force_closed();
        assert_eq!(stats.snapshot().connected, 0);
        assert_eq!(handle.state(), AgentState::Closed);
    }
}
