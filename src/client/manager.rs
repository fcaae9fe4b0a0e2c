//! Client-side connection manager.
//!
//! A [`ConnectionManager`] owns one logical connection to the relay and
//! keeps it alive across transport failures:
//!
//! ```text
//!   Idle ──connect──► Connecting ──open──► Open
//!    ▲                    ▲                  │
//!    │ disconnect         │ backoff timer    │ close / error
//!    │                    │                  ▼
//!    └──────────────── Closed ◄──────────────┘
//!                         │ cap reached
//!                         ▼
//!                       GivenUp
//! ```
//!
//! Every transport attempt is tagged with an epoch. Events from an attempt
//! whose epoch is no longer current are ignored, so a late close from a
//! superseded socket can never schedule a reconnect after
//! [`ConnectionManager::disconnect`].

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use url::Url;

use super::config::ClientConfig;
use super::error::ClientError;
use super::handlers::{HandlerRegistration, HandlerSet};
use super::transport::{CloseInfo, Connector, Incoming, Transport, TungsteniteConnector};
use crate::domain::CameraId;
use crate::ws::{ClientCommand, ServerMessage};

/// Lifecycle state of a [`ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or disconnected on request.
    Idle,
    /// A transport attempt is in flight.
    Connecting,
    /// The transport is open.
    Open,
    /// The transport closed; a reconnect may be pending.
    Closed {
        /// Whether the close was a normal closure (1000).
        clean: bool,
    },
    /// The reconnect cap was reached. Only an explicit `connect` resumes.
    GivenUp,
}

#[derive(Debug)]
struct Session {
    state: ConnectionState,
    token: Option<String>,
    desired: BTreeSet<CameraId>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    epoch: u64,
    failures: u32,
    keepalive: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Inner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    session: Mutex<Session>,
    state_tx: watch::Sender<ConnectionState>,
    on_message: Arc<HandlerSet<ServerMessage>>,
    on_error: Arc<HandlerSet<ClientError>>,
    on_close: Arc<HandlerSet<CloseInfo>>,
}

/// Reconnecting client for the relay's `/ws` endpoint.
///
/// Cloning yields another handle to the same connection. The manager
/// spawns tokio tasks, so `connect` must run inside a runtime. Dropping
/// the last handle closes the transport and cancels any pending
/// reconnect, like [`disconnect`](Self::disconnect).
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
    _guard: Arc<ShutdownOnDrop>,
}

/// Shared by every handle. Background tasks hold `Inner` but never this,
/// so it drops with the last user handle.
#[derive(Debug)]
struct ShutdownOnDrop {
    inner: Weak<Inner>,
}

impl Drop for ShutdownOnDrop {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        inner.shutdown();
        inner.clear_handlers();
        tracing::debug!(endpoint = %inner.config.endpoint, "last client handle dropped");
    }
}

impl ConnectionManager {
    /// A manager using the `tokio-tungstenite` transport.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    /// A manager using a custom transport.
    #[must_use]
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let inner = Arc::new(Inner {
                config,
                connector,
                session: Mutex::new(Session {
                    state: ConnectionState::Idle,
                    token: None,
                    desired: BTreeSet::new(),
                    outbound: None,
                    epoch: 0,
                    failures: 0,
                    keepalive: None,
                    reconnect: None,
                }),
                state_tx,
                on_message: Arc::new(HandlerSet::default()),
                on_error: Arc::new(HandlerSet::default()),
                on_close: Arc::new(HandlerSet::default()),
        });
        let guard = Arc::new(ShutdownOnDrop {
            inner: Arc::downgrade(&inner),
        });
        Self {
            inner,
            _guard: guard,
        }
    }

    /// Opens the connection with `token`.
    ///
    /// A no-op while already open or connecting. From `GivenUp` the retry
    /// counter starts over.
    pub fn connect(&self, token: impl Into<String>) {
        let mut session = self.inner.session.lock();
        match session.state {
            ConnectionState::Open | ConnectionState::Connecting => {
                tracing::debug!("connect ignored: already open or connecting");
                return;
            }
            ConnectionState::GivenUp => session.failures = 0,
            ConnectionState::Idle | ConnectionState::Closed { .. } => {}
        }
        session.token = Some(token.into());
        self.inner.start_attempt(&mut session);
    }

    /// Closes the connection and forgets the token, the subscriptions and
    /// every handler. Pending reconnects are cancelled.
    pub fn disconnect(&self) {
        self.inner.shutdown();
        {
            let mut session = self.inner.session.lock();
            session.token = None;
            session.desired.clear();
        }
        self.inner.clear_handlers();
        tracing::info!(endpoint = %self.inner.config.endpoint, "realtime client disconnected");
    }

    /// Adds `camera_id` to the desired subscriptions and, when open, tells
    /// the server. The set is replayed after every reconnect.
    pub fn subscribe_to_camera(&self, camera_id: impl Into<CameraId>) {
        let camera_id = camera_id.into();
        let mut session = self.inner.session.lock();
        if session.desired.insert(camera_id.clone()) {
            Inner::send_command(&session, &ClientCommand::SubscribeCamera { camera_id });
        }
    }

    /// Removes `camera_id` from the desired subscriptions and, when open,
    /// tells the server.
    pub fn unsubscribe_from_camera(&self, camera_id: impl Into<CameraId>) {
        let camera_id = camera_id.into();
        let mut session = self.inner.session.lock();
        if session.desired.remove(&camera_id) {
            Inner::send_command(&session, &ClientCommand::UnsubscribeCamera { camera_id });
        }
    }

    /// Sends an application-level `PING` now, outside the keepalive timer.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] unless the transport is open.
    pub fn ping(&self) -> Result<(), ClientError> {
        let session = self.inner.session.lock();
        let outbound = session.outbound.as_ref().ok_or(ClientError::NotConnected)?;
        let frame = serde_json::to_string(&ClientCommand::Ping)?;
        outbound.send(frame).map_err(|_| ClientError::NotConnected)
    }

    /// Registers a handler for every decoded server message.
    pub fn on_message<F>(&self, handler: F) -> HandlerRegistration
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.inner.on_message.add(handler)
    }

    /// Registers a handler for transport and decoding errors.
    pub fn on_error<F>(&self, handler: F) -> HandlerRegistration
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        self.inner.on_error.add(handler)
    }

    /// Registers a handler for transport closes.
    pub fn on_close<F>(&self, handler: F) -> HandlerRegistration
    where
        F: Fn(&CloseInfo) + Send + Sync + 'static,
    {
        self.inner.on_close.add(handler)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.session.lock().state
    }

    /// Whether the transport is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Receiver notified on every state transition.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// The desired subscription set, in order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<CameraId> {
        self.inner.session.lock().desired.iter().cloned().collect()
    }
}

impl Inner {
    /// Invalidates the current attempt, cancels timers and drops the
    /// outbound queue, which ends an open session.
    fn shutdown(&self) {
        let mut session = self.session.lock();
        session.epoch = session.epoch.wrapping_add(1);
        if let Some(task) = session.reconnect.take() {
            task.abort();
        }
        if let Some(task) = session.keepalive.take() {
            task.abort();
        }
        session.outbound = None;
        session.failures = 0;
        self.set_state(&mut session, ConnectionState::Idle);
    }

    fn clear_handlers(&self) {
        self.on_message.clear();
        self.on_error.clear();
        self.on_close.clear();
    }

    fn set_state(&self, session: &mut Session, state: ConnectionState) {
        session.state = state;
        self.state_tx.send_replace(state);
    }

    fn send_command(session: &Session, command: &ClientCommand) {
        let Some(outbound) = session.outbound.as_ref() else {
            tracing::debug!("not connected; command applies on next open");
            return;
        };
        if let Some(frame) = command_frame(command) {
            let _ = outbound.send(frame);
        }
    }

    /// Starts a new transport attempt under a fresh epoch.
    fn start_attempt(self: &Arc<Self>, session: &mut Session) {
        if let Some(task) = session.reconnect.take() {
            task.abort();
        }
        session.epoch = session.epoch.wrapping_add(1);
        let Some(token) = session.token.as_deref() else {
            return;
        };
        let url = self.config.url_with_token(token);
        let epoch = session.epoch;
        self.set_state(session, ConnectionState::Connecting);
        tracing::info!(
            endpoint = %self.config.endpoint,
            attempt = session.failures + 1,
            "connecting to realtime endpoint"
        );
        tokio::spawn(Arc::clone(self).run_session(epoch, url));
    }

    async fn run_session(self: Arc<Self>, epoch: u64, url: Url) {
        let Transport {
            mut sink,
            mut stream,
        } = match self.connector.connect(&url).await {
            Ok(transport) => transport,
            Err(err) => {
                self.report_error(epoch, err);
                self.handle_close(epoch, &CloseInfo::abnormal("connection failed"));
                return;
            }
        };

        let Some((mut outbound, replay)) = self.handle_open(epoch) else {
            let _ = sink.close().await;
            return;
        };

        // Subscriptions go out before any inbound frame is dispatched.
        for frame in replay {
            if let Err(err) = sink.send(frame).await {
                self.report_error(epoch, err);
                self.handle_close(epoch, &CloseInfo::abnormal("send failed"));
                return;
            }
        }

        let close = loop {
            tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        if let Err(err) = sink.send(frame).await {
                            self.report_error(epoch, err);
                            break CloseInfo::abnormal("send failed");
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        return;
                    }
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Incoming::Text(text))) => self.dispatch(epoch, &text),
                    Some(Ok(Incoming::Closed(info))) => break info,
                    Some(Err(err)) => {
                        self.report_error(epoch, err);
                        break CloseInfo::abnormal("transport error");
                    }
                    None => break CloseInfo::abnormal("connection lost"),
                },
            }
        };
        self.handle_close(epoch, &close);
    }

    /// Marks the attempt open and returns its outbound queue plus the
    /// subscription replay, or `None` if the attempt is stale.
    fn handle_open(&self, epoch: u64) -> Option<(mpsc::UnboundedReceiver<String>, Vec<String>)> {
        let mut session = self.session.lock();
        if session.epoch != epoch {
            return None;
        }
        session.failures = 0;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(task) = session.keepalive.take() {
            task.abort();
        }
        session.keepalive = Some(tokio::spawn(keepalive(
            tx.downgrade(),
            self.config.keepalive_interval,
        )));
        session.outbound = Some(tx);

        let replay: Vec<String> = session
            .desired
            .iter()
            .filter_map(|camera_id| {
                command_frame(&ClientCommand::SubscribeCamera {
                    camera_id: camera_id.clone(),
                })
            })
            .collect();
        self.set_state(&mut session, ConnectionState::Open);

        tracing::info!(
            endpoint = %self.config.endpoint,
            subscriptions = replay.len(),
            "realtime connection open"
        );
        Some((rx, replay))
    }

    fn dispatch(&self, epoch: u64, text: &str) {
        if self.session.lock().epoch != epoch {
            return;
        }
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(message) => self.on_message.emit(&message),
            Err(err) => self.report_error(epoch, ClientError::Serialization(err)),
        }
    }

    /// Surfaces an error to error handlers. Never schedules a reconnect.
    fn report_error(&self, epoch: u64, err: ClientError) {
        if self.session.lock().epoch != epoch {
            return;
        }
        tracing::warn!(error = %err, "realtime connection error");
        self.on_error.emit(&err);
    }

    fn handle_close(self: &Arc<Self>, epoch: u64, info: &CloseInfo) {
        {
            let mut session = self.session.lock();
            if session.epoch != epoch {
                return;
            }
            session.outbound = None;
            if let Some(task) = session.keepalive.take() {
                task.abort();
            }
            if info.is_policy_violation() {
                session.token = None;
                tracing::warn!(reason = %info.reason, "credential rejected; not reconnecting");
            }
            self.set_state(
                &mut session,
                ConnectionState::Closed {
                    clean: info.is_clean(),
                },
            );
        }

        tracing::info!(code = ?info.code, reason = %info.reason, "realtime connection closed");
        self.on_close.emit(info);
        self.schedule_reconnect(epoch);
    }

    fn schedule_reconnect(self: &Arc<Self>, epoch: u64) {
        let mut session = self.session.lock();
        if session.epoch != epoch || session.token.is_none() {
            return;
        }
        if session
            .reconnect
            .as_ref()
            .is_some_and(|task| !task.is_finished())
        {
            tracing::debug!("reconnect already scheduled");
            return;
        }

        session.failures = session.failures.saturating_add(1);
        let policy = self.config.reconnect;
        if policy.is_exhausted(session.failures) {
            tracing::warn!(
                attempts = session.failures,
                "max reconnection attempts reached, giving up"
            );
            self.set_state(&mut session, ConnectionState::GivenUp);
            return;
        }

        let delay = policy.delay_for(session.failures);
        tracing::info!(
            attempt = session.failures,
            max_attempts = policy.max_attempts,
            delay = ?delay,
            "scheduling reconnect"
        );
        let inner = Arc::downgrade(self);
        session.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.reconnect_now(epoch);
            }
        }));
    }

    fn reconnect_now(self: &Arc<Self>, epoch: u64) {
        let mut session = self.session.lock();
        if session.epoch != epoch {
            return;
        }
        session.reconnect = None;
        if session.token.is_some() {
            self.start_attempt(&mut session);
        }
    }
}

async fn keepalive(outbound: mpsc::WeakUnboundedSender<String>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(tx) = outbound.upgrade() else {
            break;
        };
        let Some(frame) = command_frame(&ClientCommand::Ping) else {
            break;
        };
        if tx.send(frame).is_err() {
            break;
        }
    }
}

fn command_frame(command: &ClientCommand) -> Option<String> {
    match serde_json::to_string(command) {
        Ok(frame) => Some(frame),
        Err(err) => {
            tracing::error!(error = %err, "failed to encode client command");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures::FutureExt;
    use futures::channel::mpsc as fmpsc;

    use super::*;
    use crate::client::backoff::ReconnectPolicy;
    use crate::domain::CameraStatsNotice;

    /// The server end of one fake transport.
    struct FakeServer {
        inbound: fmpsc::UnboundedSender<Result<Incoming, ClientError>>,
        sent: fmpsc::UnboundedReceiver<String>,
    }

    impl FakeServer {
        fn push(&self, event: Result<Incoming, ClientError>) {
            let _ = self.inbound.unbounded_send(event);
        }

        async fn next_frame(&mut self) -> Option<String> {
            match tokio::time::timeout(Duration::from_secs(60), self.sent.next()).await {
                Ok(frame) => frame,
                Err(_) => panic!("no frame sent within timeout"),
            }
        }
    }

    #[derive(Debug)]
    struct FakeConnector {
        attempts: AtomicUsize,
        attempt_times: Mutex<Vec<Instant>>,
        refuse: AtomicBool,
        log: Arc<Mutex<Vec<String>>>,
        servers: tokio::sync::mpsc::UnboundedSender<FakeServer>,
    }

    impl std::fmt::Debug for FakeServer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("FakeServer")
        }
    }

    impl FakeConnector {
        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _url: &Url) -> Result<Transport, ClientError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.attempt_times.lock().push(Instant::now());
            if self.refuse.load(Ordering::SeqCst) {
                return Err(ClientError::Transport("connection refused".to_string()));
            }

            let (in_tx, in_rx) = fmpsc::unbounded();
            let (out_tx, out_rx) = fmpsc::unbounded::<String>();
            let log = Arc::clone(&self.log);
            let sink = futures::sink::unfold(out_tx, move |out_tx, frame: String| {
                log.lock().push(format!("sent {frame}"));
                async move {
                    out_tx
                        .unbounded_send(frame)
                        .map_err(|e| ClientError::Transport(e.to_string()))?;
                    Ok::<_, ClientError>(out_tx)
                }
            });
            let _ = self.servers.send(FakeServer {
                inbound: in_tx,
                sent: out_rx,
            });
            Ok(Transport {
                sink: Box::pin(sink),
                stream: Box::pin(in_rx),
            })
        }
    }

    struct Harness {
        manager: ConnectionManager,
        connector: Arc<FakeConnector>,
        servers: tokio::sync::mpsc::UnboundedReceiver<FakeServer>,
    }

    impl Harness {
        fn new(base_delay_ms: u64) -> Self {
            let (servers_tx, servers) = tokio::sync::mpsc::unbounded_channel();
            let connector = Arc::new(FakeConnector {
                attempts: AtomicUsize::new(0),
                attempt_times: Mutex::new(Vec::new()),
                refuse: AtomicBool::new(false),
                log: Arc::new(Mutex::new(Vec::new())),
                servers: servers_tx,
            });
            let Ok(config) = ClientConfig::parse("ws://relay.test/ws") else {
                panic!("valid endpoint");
            };
            let config = config.with_reconnect(ReconnectPolicy {
                base_delay: Duration::from_millis(base_delay_ms),
                max_attempts: 5,
                jitter: 0.0,
            });
            let manager = ConnectionManager::with_connector(
                config,
                Arc::clone(&connector) as Arc<dyn Connector>,
            );
            Self {
                manager,
                connector,
                servers,
            }
        }

        async fn next_server(&mut self) -> FakeServer {
            match tokio::time::timeout(Duration::from_secs(30), self.servers.recv()).await {
                Ok(Some(server)) => server,
                _ => panic!("no transport opened"),
            }
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..2_000 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    fn frame(command: &ClientCommand) -> String {
        command_frame(command).unwrap_or_default()
    }

    fn subscribe(camera: &str) -> String {
        frame(&ClientCommand::SubscribeCamera {
            camera_id: CameraId::new(camera),
        })
    }

    fn unsubscribe(camera: &str) -> String {
        frame(&ClientCommand::UnsubscribeCamera {
            camera_id: CameraId::new(camera),
        })
    }

    fn stats_frame(camera: &str) -> String {
        serde_json::to_string(&ServerMessage::CameraStats(CameraStatsNotice {
            camera_id: CameraId::new(camera),
            is_online: true,
            total_alerts: 3,
            recent_alerts: 1,
        }))
        .unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn subscriptions_replayed_before_dispatch_after_reconnect() {
        let mut h = Harness::new(100);
        let log = Arc::clone(&h.connector.log);
        {
            let log = Arc::clone(&log);
            let _ = h
                .manager
                .on_message(move |msg| log.lock().push(format!("recv {}", msg.type_str())));
        }

        h.manager.subscribe_to_camera("cam-1");
        h.manager.subscribe_to_camera("cam-2");
        h.manager.connect("token");

        let mut first = h.next_server().await;
        assert_eq!(first.next_frame().await, Some(subscribe("cam-1")));
        assert_eq!(first.next_frame().await, Some(subscribe("cam-2")));

        h.manager.subscribe_to_camera("cam-3");
        h.manager.unsubscribe_from_camera("cam-1");
        assert_eq!(first.next_frame().await, Some(subscribe("cam-3")));
        assert_eq!(first.next_frame().await, Some(unsubscribe("cam-1")));

        // open -> close -> close (refused attempt) -> open
        h.connector.refuse.store(true, Ordering::SeqCst);
        first.push(Ok(Incoming::Closed(CloseInfo::abnormal("dropped"))));
        let connector = Arc::clone(&h.connector);
        wait_until(|| connector.attempts() == 2).await;
        log.lock().clear();
        h.connector.refuse.store(false, Ordering::SeqCst);

        let second = h.next_server().await;
        second.push(Ok(Incoming::Text(stats_frame("cam-2"))));
        wait_until(|| log.lock().iter().any(|e| e.starts_with("recv"))).await;

        assert_eq!(
            *log.lock(),
            vec![
                format!("sent {}", subscribe("cam-2")),
                format!("sent {}", subscribe("cam-3")),
                "recv CAMERA_STATS".to_string(),
            ]
        );
        assert_eq!(h.connector.attempts(), 3);
        assert!(h.manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_five_consecutive_closes() {
        let h = Harness::new(100);
        h.connector.refuse.store(true, Ordering::SeqCst);
        let closes = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        {
            let closes = Arc::clone(&closes);
            let _ = h.manager.on_close(move |_| {
                closes.fetch_add(1, Ordering::SeqCst);
            });
            let errors = Arc::clone(&errors);
            let _ = h.manager.on_error(move |_| {
                errors.fetch_add(1, Ordering::SeqCst);
            });
        }

        h.manager.connect("token");
        let manager = h.manager.clone();
        wait_until(|| manager.state() == ConnectionState::GivenUp).await;

        assert_eq!(h.connector.attempts(), 5);
        assert_eq!(closes.load(Ordering::SeqCst), 5);
        assert_eq!(errors.load(Ordering::SeqCst), 5);

        tokio::time::sleep(Duration::from_millis(100 * 10)).await;
        assert_eq!(h.connector.attempts(), 5);
        assert_eq!(h.manager.state(), ConnectionState::GivenUp);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_linearly_with_attempt() {
        let h = Harness::new(100);
        h.connector.refuse.store(true, Ordering::SeqCst);
        h.manager.connect("token");
        let manager = h.manager.clone();
        wait_until(|| manager.state() == ConnectionState::GivenUp).await;

        let times = h.connector.attempt_times.lock().clone();
        assert_eq!(times.len(), 5);
        for (i, pair) in times.windows(2).enumerate() {
            let gap = pair[1] - pair[0];
            let expected = Duration::from_millis(100 * (i as u64 + 1));
            assert!(gap >= expected, "gap {gap:?} shorter than {expected:?}");
            assert!(gap < expected + Duration::from_millis(20));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_connect_after_giving_up_starts_over() {
        let mut h = Harness::new(10);
        h.connector.refuse.store(true, Ordering::SeqCst);
        h.manager.connect("token");
        let manager = h.manager.clone();
        wait_until(|| manager.state() == ConnectionState::GivenUp).await;

        h.connector.refuse.store(false, Ordering::SeqCst);
        h.manager.connect("token");
        let _server = h.next_server().await;
        let manager = h.manager.clone();
        wait_until(|| manager.is_connected()).await;
        assert_eq!(h.connector.attempts(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn policy_violation_close_stops_reconnecting() {
        let mut h = Harness::new(10);
        h.manager.connect("expired");
        let server = h.next_server().await;
        server.push(Ok(Incoming::Closed(CloseInfo::new(1008, "Invalid token"))));

        let manager = h.manager.clone();
        wait_until(|| manager.state() == ConnectionState::Closed { clean: false }).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_handlers_receive_code_and_reason() {
        let mut h = Harness::new(10);
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            let _ = h.manager.on_close(move |info| seen.lock().push(info.clone()));
        }
        h.manager.connect("token");
        let server = h.next_server().await;
        server.push(Ok(Incoming::Closed(CloseInfo::new(
            1001,
            "Server shutting down",
        ))));

        wait_until(|| !seen.lock().is_empty()).await;
        assert_eq!(
            seen.lock()[0],
            CloseInfo::new(1001, "Server shutting down")
        );
        h.manager.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let h = Harness::new(1_000);
        h.connector.refuse.store(true, Ordering::SeqCst);
        h.manager.connect("token");
        let manager = h.manager.clone();
        wait_until(|| matches!(manager.state(), ConnectionState::Closed { .. })).await;

        h.manager.disconnect();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.connector.attempts(), 1);
        assert_eq!(h.manager.state(), ConnectionState::Idle);
        assert!(h.manager.subscriptions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_closes_open_transport() {
        let mut h = Harness::new(10);
        h.manager.connect("token");
        let mut server = h.next_server().await;
        let manager = h.manager.clone();
        wait_until(|| manager.is_connected()).await;

        h.manager.disconnect();
        assert_eq!(server.next_frame().await, None);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_last_handle_cancels_pending_reconnect() {
        let h = Harness::new(1_000);
        h.connector.refuse.store(true, Ordering::SeqCst);
        h.manager.connect("token");
        let observer = h.manager.clone();
        wait_until(|| matches!(observer.state(), ConnectionState::Closed { .. })).await;

        let Harness {
            manager, connector, ..
        } = h;
        drop(manager);
        assert_eq!(observer.state(), ConnectionState::Closed { clean: false });
        drop(observer);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_last_handle_closes_open_transport() {
        let mut h = Harness::new(10);
        h.manager.connect("token");
        let mut server = h.next_server().await;
        let manager = h.manager.clone();
        wait_until(|| manager.is_connected()).await;
        let mut state = manager.state_changes();
        drop(manager);

        let Harness {
            manager, connector, ..
        } = h;
        drop(manager);
        assert_eq!(server.next_frame().await, None);
        assert_eq!(*state.borrow_and_update(), ConnectionState::Idle);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_while_open_is_noop() {
        let mut h = Harness::new(10);
        h.manager.connect("token");
        let _server = h.next_server().await;
        let manager = h.manager.clone();
        wait_until(|| manager.is_connected()).await;

        h.manager.connect("token");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_then_close_schedules_single_reconnect() {
        let mut h = Harness::new(100);
        let errors = Arc::new(AtomicUsize::new(0));
        {
            let errors = Arc::clone(&errors);
            let _ = h.manager.on_error(move |_| {
                errors.fetch_add(1, Ordering::SeqCst);
            });
        }
        h.manager.connect("token");
        let server = h.next_server().await;
        server.push(Err(ClientError::Transport("reset".to_string())));

        let _second = h.next_server().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(h.connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_pings_while_open() {
        let mut h = Harness::new(10);
        h.manager.connect("token");
        let mut server = h.next_server().await;
        let manager = h.manager.clone();
        wait_until(|| manager.is_connected()).await;

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(server.sent.next().now_or_never().is_none());

        let ping = frame(&ClientCommand::Ping);
        assert_eq!(server.next_frame().await, Some(ping.clone()));
        assert_eq!(server.next_frame().await, Some(ping));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_ping_requires_open_transport() {
        let mut h = Harness::new(10);
        assert!(matches!(h.manager.ping(), Err(ClientError::NotConnected)));

        h.manager.connect("token");
        let mut server = h.next_server().await;
        let manager = h.manager.clone();
        wait_until(|| manager.is_connected()).await;

        assert!(h.manager.ping().is_ok());
        assert_eq!(server.next_frame().await, Some(frame(&ClientCommand::Ping)));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_go_to_error_handlers() {
        let mut h = Harness::new(10);
        let messages = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        {
            let messages = Arc::clone(&messages);
            let _ = h.manager.on_message(move |_| {
                messages.fetch_add(1, Ordering::SeqCst);
            });
            let errors = Arc::clone(&errors);
            let _ = h.manager.on_error(move |_| {
                errors.fetch_add(1, Ordering::SeqCst);
            });
        }
        h.manager.connect("token");
        let server = h.next_server().await;
        server.push(Ok(Incoming::Text("{not json".to_string())));
        server.push(Ok(Incoming::Text(stats_frame("cam-1"))));

        wait_until(|| messages.load(Ordering::SeqCst) == 1).await;
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(h.manager.is_connected());
    }
}
