//! Shared WebSocket streaming lifecycle.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use nastro_core::{
    Clock, NastroError, SubscriptionManager, SubscriptionRegistry, SystemClock,
};
use nastro_middleware::jitter_ms;
use nastro_types::{
    ConnectBreakerConfig, ConnectRetryConfig, HeartbeatConfig, MarketEvent, ReconnectEvent,
    SubscriptionKind, SymbolSpec,
};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Bytes, Message};

use super::adapter::{StreamAdapter, WsSocket};
use super::resilience::ConnectBreaker;
use crate::publish::EventPublisher;

type WsSink = SplitSink<WsSocket, Message>;
type WsRead = SplitStream<WsSocket>;

/// Default id base handed to the subscription registry.
pub const DEFAULT_SUBSCRIPTION_ID_BASE: u64 = 100_000;
/// Capacity of the bounded reconnect-event channel.
pub const RECONNECT_CHANNEL_CAPACITY: usize = 16;

/// Connection lifecycle position, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket.
    #[default]
    Disconnected,
    /// Dialing.
    Connecting,
    /// Socket open, not yet authenticated.
    Connected,
    /// Auth exchange in flight.
    Authenticating,
    /// Authenticated, tasks not yet running.
    Authenticated,
    /// Receive loop running.
    Streaming,
    /// Recovering after a lost connection.
    Reconnecting,
}

struct Tasks {
    receive: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    sub_sync: Option<JoinHandle<()>>,
}

/// Builder for [`StreamClient`].
pub struct StreamClientBuilder {
    adapter: Arc<dyn StreamAdapter>,
    publisher: Arc<dyn EventPublisher>,
    retry: ConnectRetryConfig,
    breaker: ConnectBreakerConfig,
    heartbeat: HeartbeatConfig,
    clock: Arc<dyn Clock>,
    id_base: u64,
}

impl StreamClientBuilder {
    /// Connect retry/backoff tuning.
    #[must_use]
    pub const fn retry(mut self, retry: ConnectRetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Connect circuit breaker tuning.
    #[must_use]
    pub const fn breaker(mut self, breaker: ConnectBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Liveness probe tuning.
    #[must_use]
    pub const fn heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Clock for event stamping and reconnect windows.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Starting id for subscription allocation.
    #[must_use]
    pub const fn subscription_id_base(mut self, base: u64) -> Self {
        self.id_base = base;
        self
    }

    /// Finish building. The client is idle until [`StreamClient::connect`].
    #[must_use]
    pub fn build(self) -> Arc<StreamClient> {
        let (reconnect_tx, reconnect_rx) = mpsc::channel(RECONNECT_CHANNEL_CAPACITY);
        Arc::new_cyclic(|me| StreamClient {
            me: me.clone(),
            registry: Arc::new(SubscriptionRegistry::new(self.id_base)),
            adapter: self.adapter,
            publisher: self.publisher,
            retry: self.retry,
            heartbeat: self.heartbeat,
            clock: self.clock,
            breaker: Mutex::new(ConnectBreaker::new(self.breaker)),
            state: Mutex::new(ConnectionState::Disconnected),
            sink: tokio::sync::Mutex::new(None),
            tasks: Mutex::new(Tasks {
                receive: None,
                heartbeat: None,
                sub_sync: None,
            }),
            reconnect_gate: tokio::sync::Mutex::new(()),
            is_reconnecting: AtomicBool::new(false),
            should_run: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
            heartbeat_strikes: AtomicU32::new(0),
            sequence: AtomicU64::new(0),
            reconnect_tx,
            reconnect_rx: Mutex::new(Some(reconnect_rx)),
            sub_sync_wake: Notify::new(),
        })
    }
}

/// WebSocket streaming base: one live connection, provider specifics behind
/// a [`StreamAdapter`].
///
/// Lifecycle: `Disconnected → Connecting → Connected → Authenticating →
/// Authenticated → Streaming`, with `Reconnecting` entered from heartbeat
/// strikes. Exactly one reconnection runs at a time (gate + flag). Reconnect
/// windows are published to a bounded channel consumed by the gap-fill
/// trigger rather than fired through callbacks.
pub struct StreamClient {
    // Handed to spawned tasks; set once by `Arc::new_cyclic` at build time.
    me: Weak<StreamClient>,
    adapter: Arc<dyn StreamAdapter>,
    publisher: Arc<dyn EventPublisher>,
    registry: Arc<SubscriptionRegistry>,
    retry: ConnectRetryConfig,
    heartbeat: HeartbeatConfig,
    clock: Arc<dyn Clock>,
    breaker: Mutex<ConnectBreaker>,
    state: Mutex<ConnectionState>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    tasks: Mutex<Tasks>,
    reconnect_gate: tokio::sync::Mutex<()>,
    is_reconnecting: AtomicBool,
    should_run: AtomicBool,
    last_activity: Mutex<Instant>,
    heartbeat_strikes: AtomicU32,
    sequence: AtomicU64,
    reconnect_tx: mpsc::Sender<ReconnectEvent>,
    reconnect_rx: Mutex<Option<mpsc::Receiver<ReconnectEvent>>>,
    sub_sync_wake: Notify,
}

impl StreamClient {
    /// Start configuring a client over `adapter`, publishing into
    /// `publisher`.
    #[must_use]
    pub fn builder(
        adapter: Arc<dyn StreamAdapter>,
        publisher: Arc<dyn EventPublisher>,
    ) -> StreamClientBuilder {
        StreamClientBuilder {
            adapter,
            publisher,
            retry: ConnectRetryConfig::default(),
            breaker: ConnectBreakerConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            clock: Arc::new(SystemClock),
            id_base: DEFAULT_SUBSCRIPTION_ID_BASE,
        }
    }

    /// Provider name.
    #[must_use]
    pub fn provider(&self) -> &'static str {
        self.adapter.name()
    }

    /// Subscription bookkeeping for this connection.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Current lifecycle position.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().expect("mutex poisoned")
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.lock().expect("mutex poisoned") = next;
    }

    /// Take the reconnect-event receiver. Single consumer; returns `None`
    /// after the first call.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn reconnect_events(&self) -> Option<mpsc::Receiver<ReconnectEvent>> {
        self.reconnect_rx.lock().expect("mutex poisoned").take()
    }

    /// Dial, authenticate, and start streaming.
    ///
    /// The attempt loop applies exponential backoff with jitter under a
    /// connect circuit breaker, each attempt capped by the configured
    /// timeout.
    pub async fn connect(&self) -> Result<(), NastroError> {
        self.should_run.store(true, Ordering::SeqCst);
        self.connect_with_resilience().await
    }

    async fn connect_with_resilience(&self) -> Result<(), NastroError> {
        let provider = self.adapter.name();
        let mut delay_ms = self.retry.base_delay.as_millis() as u64;
        let mut attempt: u32 = 1;

        loop {
            if let Err(remaining) = self.breaker.lock().expect("mutex poisoned").check() {
                self.set_state(ConnectionState::Disconnected);
                return Err(NastroError::transient(
                    provider,
                    format!("connect circuit open for {}ms", remaining.as_millis()),
                ));
            }

            self.set_state(ConnectionState::Connecting);
            let outcome =
                tokio::time::timeout(self.retry.attempt_timeout, self.establish()).await;
            let error = match outcome {
                Ok(Ok(())) => {
                    self.breaker.lock().expect("mutex poisoned").record_success();
                    return Ok(());
                }
                Ok(Err(e)) => e,
                Err(_) => NastroError::timeout(provider, "connect"),
            };

            self.breaker.lock().expect("mutex poisoned").record_failure();
            if attempt >= self.retry.max_attempts {
                self.set_state(ConnectionState::Disconnected);
                tracing::error!(provider, attempts = attempt, error = %error, "connect gave up");
                return Err(error);
            }
            let wait = jitter_ms(delay_ms, self.retry.jitter_percent);
            tracing::warn!(provider, attempt, wait_ms = wait, error = %error, "connect attempt failed");
            tokio::time::sleep(std::time::Duration::from_millis(wait)).await;
            delay_ms = delay_ms.saturating_mul(u64::from(self.retry.multiplier));
            attempt += 1;
        }
    }

    fn establish(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), NastroError>> + Send + '_>>
    {
        Box::pin(async move {
        let provider = self.adapter.name();
        let url = self.adapter.endpoint()?;
        let mut request = url
            .into_client_request()
            .map_err(|e| NastroError::transient(provider, format!("handshake request: {e}")))?;
        for (name, value) in self.adapter.handshake_headers() {
            let value = HeaderValue::from_str(&value)
                .map_err(|e| NastroError::InvalidArg(format!("header {name}: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let (mut socket, _response) = connect_async(request)
            .await
            .map_err(|e| NastroError::transient(provider, format!("websocket open: {e}")))?;
        self.set_state(ConnectionState::Connected);

        self.set_state(ConnectionState::Authenticating);
        if let Err(e) = self.adapter.authenticate(&mut socket).await {
            let _ = socket.close(None).await;
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }
        self.set_state(ConnectionState::Authenticated);

        let (sink, read) = socket.split();
        *self.sink.lock().await = Some(sink);
        *self.last_activity.lock().expect("mutex poisoned") = Instant::now();
        self.heartbeat_strikes.store(0, Ordering::SeqCst);

        let me = self.me.upgrade().expect("client is alive during establish");
        let mut tasks = self.tasks.lock().expect("mutex poisoned");
        if let Some(old) = tasks.receive.take() {
            old.abort();
        }
        tasks.receive = Some(tokio::spawn(Arc::clone(&me).receive_loop(read)));
        if tasks.heartbeat.is_none() {
            tasks.heartbeat = Some(tokio::spawn(Arc::clone(&me).heartbeat_loop()));
        }
        if tasks.sub_sync.is_none() {
            tasks.sub_sync = Some(tokio::spawn(Arc::clone(&me).sub_sync_loop()));
        }
        drop(tasks);

        self.set_state(ConnectionState::Streaming);
        tracing::info!(provider, "streaming");
        Ok(())
        })
    }

    fn touch_activity(&self) {
        *self.last_activity.lock().expect("mutex poisoned") = Instant::now();
    }

    async fn receive_loop(self: Arc<Self>, mut read: WsRead) {
        let provider = self.adapter.name();
        while self.should_run.load(Ordering::SeqCst) {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.touch_activity();
                    match self.adapter.parse_message(text.as_str()) {
                        Ok(parsed) => {
                            for p in parsed {
                                let mut event = MarketEvent::new(
                                    provider,
                                    p.symbol,
                                    p.payload,
                                    self.clock.now(),
                                )
                                .with_sequence(self.sequence.fetch_add(1, Ordering::Relaxed));
                                event.event_time = p.event_time;
                                // Hot path: drop-oldest, never block the
                                // socket task.
                                self.publisher.try_publish(event);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(provider, error = %e, "message handler failed");
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    self.touch_activity();
                    let mut sink = self.sink.lock().await;
                    if let Some(sink) = sink.as_mut() {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                }
                Some(Ok(Message::Pong(_))) => self.touch_activity(),
                Some(Ok(Message::Close(_))) => {
                    tracing::info!(provider, "close frame received");
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    // Heartbeat or an external reconnect drives recovery.
                    tracing::warn!(provider, error = %e, "websocket read failed");
                    return;
                }
                None => {
                    tracing::info!(provider, "websocket stream ended");
                    return;
                }
            }
        }
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let provider = self.adapter.name();
        let mut ticker = tokio::time::interval(self.heartbeat.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        while self.should_run.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !self.should_run.load(Ordering::SeqCst) {
                break;
            }
            if self.is_reconnecting.load(Ordering::SeqCst) {
                continue;
            }

            let probe_ok = matches!(
                tokio::time::timeout(self.heartbeat.probe_timeout, self.send_probe()).await,
                Ok(Ok(()))
            );
            let stale = self
                .last_activity
                .lock()
                .expect("mutex poisoned")
                .elapsed()
                > self.heartbeat.interval + self.heartbeat.probe_timeout;

            if probe_ok && !stale {
                self.heartbeat_strikes.store(0, Ordering::SeqCst);
                continue;
            }

            let strikes = self.heartbeat_strikes.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::warn!(provider, strikes, probe_ok, stale, "heartbeat strike");
            if strikes >= self.heartbeat.failure_threshold {
                self.heartbeat_strikes.store(0, Ordering::SeqCst);
                let client = Arc::clone(&self);
                tokio::spawn(async move { client.handle_connection_lost().await });
            }
        }
    }

    async fn send_probe(&self) -> Result<(), NastroError> {
        let provider = self.adapter.name();
        let mut sink = self.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            return Err(NastroError::transient(provider, "no socket"));
        };
        let message = match self.adapter.heartbeat_probe() {
            Some(text) => Message::Text(text.into()),
            None => Message::Ping(Bytes::new()),
        };
        sink.send(message)
            .await
            .map_err(|e| NastroError::transient(provider, format!("probe send: {e}")))
    }

    /// Recover from a lost connection. One reconnection at a time: callers
    /// racing the gate simply return.
    pub async fn handle_connection_lost(&self) {
        let provider = self.adapter.name();
        let Ok(_gate) = self.reconnect_gate.try_lock() else {
            return;
        };
        if !self.should_run.load(Ordering::SeqCst) {
            return;
        }
        self.is_reconnecting.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Reconnecting);
        let disconnected_at: DateTime<Utc> = self.clock.now();
        tracing::warn!(provider, "connection lost, reconnecting");

        self.teardown_socket().await;

        match self.connect_with_resilience().await {
            Ok(()) => {
                // Total-state resend of the current subscriptions.
                self.sub_sync_wake.notify_one();
                let event = ReconnectEvent {
                    provider: provider.to_uppercase(),
                    disconnected_at,
                    reconnected_at: self.clock.now(),
                };
                tracing::info!(
                    provider,
                    gap_secs = event.gap().as_secs(),
                    "reconnected"
                );
                if let Err(e) = self.reconnect_tx.try_send(event) {
                    tracing::warn!(provider, error = %e, "reconnect channel full, gap event lost");
                }
            }
            Err(e) => {
                // The heartbeat task is still running and will strike again.
                tracing::error!(provider, error = %e, "reconnect failed");
            }
        }
        self.is_reconnecting.store(false, Ordering::SeqCst);
    }

    async fn teardown_socket(&self) {
        if let Some(handle) = self.tasks.lock().expect("mutex poisoned").receive.take() {
            handle.abort();
        }
        let mut sink = self.sink.lock().await;
        if let Some(mut sink) = sink.take() {
            let _ = sink.close().await;
        }
    }

    async fn sub_sync_loop(self: Arc<Self>) {
        let provider = self.adapter.name();
        loop {
            self.sub_sync_wake.notified().await;
            if !self.should_run.load(Ordering::SeqCst) {
                break;
            }
            let trades = self.registry.symbols_by_kind(SubscriptionKind::Trades);
            let depth = self.registry.symbols_by_kind(SubscriptionKind::Depth);
            let quotes = self.registry.symbols_by_kind(SubscriptionKind::Quotes);
            let Some(text) = self.adapter.subscription_message(&trades, &depth, &quotes) else {
                continue;
            };
            let mut sink = self.sink.lock().await;
            match sink.as_mut() {
                Some(sink) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::warn!(provider, error = %e, "subscription update send failed");
                    }
                }
                None => {
                    tracing::debug!(provider, "subscription update deferred, no socket");
                }
            }
        }
    }

    fn subscribe(&self, symbol: &str, kind: SubscriptionKind) -> u64 {
        let sub = self.registry.add(symbol, kind, self.clock.now());
        self.sub_sync_wake.notify_one();
        sub.id
    }

    fn unsubscribe(&self, id: u64) {
        if self.registry.remove(id).is_some() {
            self.sub_sync_wake.notify_one();
        }
    }

    /// Subscribe the trades stream; returns the subscription id.
    #[must_use]
    pub fn subscribe_trades(&self, spec: &SymbolSpec) -> u64 {
        self.subscribe(&spec.symbol, SubscriptionKind::Trades)
    }

    /// Subscribe the depth stream; returns the subscription id.
    #[must_use]
    pub fn subscribe_depth(&self, spec: &SymbolSpec) -> u64 {
        self.subscribe(&spec.symbol, SubscriptionKind::Depth)
    }

    /// Subscribe the quotes stream; returns the subscription id.
    #[must_use]
    pub fn subscribe_quotes(&self, spec: &SymbolSpec) -> u64 {
        self.subscribe(&spec.symbol, SubscriptionKind::Quotes)
    }

    /// Release a trades subscription.
    pub fn unsubscribe_trades(&self, id: u64) {
        self.unsubscribe(id);
    }

    /// Release a depth subscription.
    pub fn unsubscribe_depth(&self, id: u64) {
        self.unsubscribe(id);
    }

    /// Release a quotes subscription.
    pub fn unsubscribe_quotes(&self, id: u64) {
        self.unsubscribe(id);
    }

    /// Idempotent shutdown: stop tasks, close the socket with a normal
    /// closure, drop the subscription bookkeeping.
    pub async fn disconnect(&self) {
        if !self.should_run.swap(false, Ordering::SeqCst)
            && self.state() == ConnectionState::Disconnected
        {
            return;
        }
        self.sub_sync_wake.notify_waiters();

        let (receive, heartbeat, sub_sync) = {
            let mut tasks = self.tasks.lock().expect("mutex poisoned");
            (
                tasks.receive.take(),
                tasks.heartbeat.take(),
                tasks.sub_sync.take(),
            )
        };
        // Detach the heartbeat first so a late strike cannot race a new
        // reconnect against the closing socket.
        if let Some(h) = heartbeat {
            h.abort();
        }
        if let Some(h) = sub_sync {
            h.abort();
        }

        {
            let mut sink = self.sink.lock().await;
            if let Some(mut sink) = sink.take() {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    })))
                    .await;
                let _ = sink.close().await;
            }
        }

        if let Some(h) = receive {
            // The close frame is already on the wire; the read side has
            // nothing left to deliver.
            h.abort();
            let _ = h.await;
        }

        self.registry.clear();
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(provider = self.adapter.name(), "disconnected");
    }
}

/// [`SubscriptionManager`] over a [`StreamClient`]: re-applies a symbol's
/// configuration by dropping and re-adding its subscriptions.
pub struct StreamSubscriptions {
    client: Arc<StreamClient>,
}

impl StreamSubscriptions {
    /// Manager driving `client`.
    #[must_use]
    pub const fn new(client: Arc<StreamClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SubscriptionManager for StreamSubscriptions {
    async fn apply(&self, spec: &SymbolSpec) -> Result<(), NastroError> {
        for id in self.client.registry.ids_for_symbol(&spec.symbol) {
            self.client.registry.remove(id);
        }
        if spec.subscribe_trades {
            let _ = self.client.subscribe_trades(spec);
        }
        if spec.subscribe_depth {
            let _ = self.client.subscribe_depth(spec);
        }
        self.client.sub_sync_wake.notify_one();
        Ok(())
    }
}
