use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

use super::api::ApiClient;
use crate::callbacks::{guarded, EventHandler, NoopHandler};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::types::{ControlMessage, LoginResponse, Order, OrderFilter, OrderRequest};
use crate::websocket::transport::{
    CloseReason, LinkState, SessionContext, TransportEvent, TransportSession,
};
use crate::websocket::{
    ConnectionState, HeartbeatConfig, HeartbeatMonitor, HeartbeatStatus, ReconnectConfig,
    ReconnectController, ReconnectDecision, SubscriptionRegistry,
};

/// Client for the NSE Socket feed and order API
///
/// Cheap to clone; clones share one session. Methods are meant to be driven
/// from a single controlling task, background work (receive loop, reconnects)
/// runs on spawned tasks.
///
/// # Example
///
/// ```no_run
/// use nse_socket_rs::{Callbacks, ClientConfig, NseClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let callbacks = Callbacks::new()
///         .on_ticks(|tick| println!("{}: {:?}", tick.symbol, tick.data.close));
///     let client = NseClient::with_handler(ClientConfig::default(), callbacks)?;
///
///     client.authenticate("trader1").await?;
///     if client.connect_and_subscribe(&["NIFTY", "RELIANCE"]).await {
///         client.run(None).await;
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct NseClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    api: ApiClient,
    handler: Arc<dyn EventHandler>,
    heartbeat: Arc<HeartbeatMonitor>,
    link: Arc<LinkState>,
    registry: Mutex<SubscriptionRegistry>,
    controller: Mutex<ReconnectController>,
    reconnect_config: Mutex<ReconnectConfig>,
    session: tokio::sync::Mutex<Option<TransportSession>>,
    running: AtomicBool,
    generation: AtomicU64,
    stop_tx: watch::Sender<bool>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NseClient {
    /// Create a client that ignores all events
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_handler(config, NoopHandler)
    }

    /// Create a client delivering events to `handler`
    pub fn with_handler(config: ClientConfig, handler: impl EventHandler + 'static) -> Result<Self> {
        config.validate()?;

        let api = ApiClient::new(config.api_url.clone(), config.token.clone())
            .with_timeouts(config.request_timeout, config.health_timeout);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (stop_tx, _) = watch::channel(false);

        let inner = Inner {
            api,
            handler: Arc::new(handler),
            heartbeat: Arc::new(HeartbeatMonitor::new(config.heartbeat)),
            link: Arc::new(LinkState::default()),
            registry: Mutex::new(SubscriptionRegistry::new()),
            controller: Mutex::new(ReconnectController::new(config.reconnect.clone())),
            reconnect_config: Mutex::new(config.reconnect.clone()),
            session: tokio::sync::Mutex::new(None),
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            stop_tx,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current bearer token, if any
    pub fn token(&self) -> Option<String> {
        self.inner.api.token()
    }

    /// Direct access to the REST client
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Request a token for `username`; later REST calls and connections use it
    pub async fn authenticate(&self, username: &str) -> Result<LoginResponse> {
        tracing::info!(username, "requesting authentication");
        let response = self.inner.api.login(username).await?;
        let user_id = response.user_id.as_deref().unwrap_or(username);
        tracing::info!(
            user_id,
            permissions = %response.permissions.join(", "),
            "authentication successful"
        );
        Ok(response)
    }

    // --- connection lifecycle ---------------------------------------------

    /// Open the feed connection.
    ///
    /// Returns `Ok` without doing anything if already connected. A fresh
    /// call re-arms auto-reconnect, including after a previous give-up.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            tracing::warn!("already connected to WebSocket");
            return Ok(());
        }

        let reconnect = lock(&self.inner.reconnect_config).clone();
        lock(&self.inner.controller).arm(reconnect);
        self.inner.running.store(true, Ordering::SeqCst);
        self.inner.stop_tx.send_replace(false);
        self.ensure_supervisor();

        match self.inner.open_session().await {
            Ok(()) => {
                tracing::info!("WebSocket connected successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "WebSocket connection failed");
                self.inner.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Connect, wait for the connection to settle, then subscribe to every
    /// symbol. `true` iff at least one subscription was sent.
    pub async fn connect_and_subscribe<S: AsRef<str>>(&self, symbols: &[S]) -> bool {
        if self.connect().await.is_err() {
            return false;
        }
        sleep(self.inner.config.settle_delay).await;

        let results = self.subscribe_multiple(symbols).await;
        let success_count = results.values().filter(|ok| **ok).count();
        tracing::info!(
            "successfully subscribed to {}/{} symbols",
            success_count,
            symbols.len()
        );
        success_count > 0
    }

    /// Block until [`stop`](Self::stop) is called, reconnection gives up, or
    /// `timeout` elapses; then disconnect.
    pub async fn run(&self, timeout: Option<Duration>) {
        if !self.is_connected() {
            tracing::error!("not connected, call connect() or connect_and_subscribe() first");
            return;
        }
        tracing::info!("starting data stream");

        let mut stop_rx = self.inner.stop_tx.subscribe();
        let stopped = async move {
            let _ = stop_rx.wait_for(|stopped| *stopped).await.map(|_| ());
        };
        match timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, stopped).await.is_err() {
                    tracing::info!(?limit, "run timeout elapsed");
                }
            }
            None => stopped.await,
        }

        self.stop().await;
    }

    /// Unblock [`run`](Self::run) and disconnect. Safe to call repeatedly.
    pub async fn stop(&self) {
        tracing::info!("stopping NSE client");
        self.inner.stop_tx.send_replace(true);
        self.disconnect().await;
    }

    /// Close the connection without reconnecting and forget all subscriptions
    pub async fn disconnect(&self) {
        tracing::info!("disconnecting from WebSocket");
        self.inner.running.store(false, Ordering::SeqCst);
        lock(&self.inner.controller).disarm();

        let session = self.inner.session.lock().await.take();
        if let Some(mut session) = session {
            session.close(self.inner.config.close_timeout).await;
        }
        lock(&self.inner.registry).clear();
        tracing::info!("WebSocket disconnected");
    }

    fn ensure_supervisor(&self) {
        let events = lock(&self.inner.events_rx).take();
        if let Some(events) = events {
            tokio::spawn(supervise(Arc::downgrade(&self.inner), events));
        }
    }

    // --- subscriptions ----------------------------------------------------

    /// Subscribe to one symbol
    pub async fn subscribe(&self, symbol: &str) -> Result<()> {
        let message = ControlMessage::subscribe(symbol);
        if !self.is_connected() {
            tracing::error!(symbol = %message.symbol, "not connected to WebSocket");
            return Err(Error::NotConnected);
        }
        match self.inner.send_control(&message).await {
            Ok(()) => {
                lock(&self.inner.registry).add(&message.symbol);
                tracing::info!(symbol = %message.symbol, "subscribed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(symbol = %message.symbol, error = %e, "subscription failed");
                Err(Error::Subscription(format!("{}: {}", message.symbol, e)))
            }
        }
    }

    /// Subscribe to several symbols, pausing between sends
    ///
    /// Keys of the result are the uppercased symbols.
    pub async fn subscribe_multiple<S: AsRef<str>>(&self, symbols: &[S]) -> HashMap<String, bool> {
        self.inner.subscribe_multiple(symbols).await
    }

    /// Subscribe in batches of `batch_size`, pausing between batches
    pub async fn subscribe_batch<S: AsRef<str>>(
        &self,
        symbols: &[S],
        batch_size: usize,
    ) -> HashMap<String, bool> {
        if !self.is_connected() {
            tracing::error!("not connected to WebSocket");
            return all(symbols, false);
        }

        let mut results = HashMap::new();
        let batches: Vec<&[S]> = symbols.chunks(batch_size.max(1)).collect();
        let last = batches.len().saturating_sub(1);
        for (i, batch) in batches.into_iter().enumerate() {
            results.extend(self.subscribe_multiple(batch).await);
            if i < last {
                sleep(self.inner.config.batch_pause).await;
            }
        }
        results
    }

    /// Unsubscribe from one symbol; fails when it was not subscribed
    pub async fn unsubscribe(&self, symbol: &str) -> Result<()> {
        let message = ControlMessage::unsubscribe(symbol);
        if !self.is_connected() {
            tracing::error!("not connected to WebSocket");
            return Err(Error::NotConnected);
        }
        if !self.is_subscribed(&message.symbol) {
            tracing::warn!(symbol = %message.symbol, "not subscribed");
            return Err(Error::Subscription(format!(
                "not subscribed to {}",
                message.symbol
            )));
        }
        match self.inner.send_control(&message).await {
            Ok(()) => {
                lock(&self.inner.registry).remove(&message.symbol);
                tracing::info!(symbol = %message.symbol, "unsubscribed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(symbol = %message.symbol, error = %e, "unsubscription failed");
                Err(Error::Subscription(format!("{}: {}", message.symbol, e)))
            }
        }
    }

    /// Unsubscribe from everything
    ///
    /// The registry is cleared even when some sends fail; the return value
    /// is `false` in that case, or when nothing was subscribed.
    pub async fn unsubscribe_all(&self) -> bool {
        if !self.is_connected() {
            tracing::error!("not connected to WebSocket");
            return false;
        }
        let symbols = self.subscribed_symbols();
        if symbols.is_empty() {
            tracing::warn!("no active subscriptions");
            return false;
        }

        let mut success = true;
        for symbol in symbols {
            if let Err(e) = self
                .inner
                .send_control(&ControlMessage::unsubscribe(&symbol))
                .await
            {
                tracing::error!(%symbol, error = %e, "failed to unsubscribe");
                success = false;
            }
            sleep(self.inner.config.subscribe_pacing).await;
        }

        lock(&self.inner.registry).clear();
        tracing::info!("unsubscribed from all symbols");
        success
    }

    /// Unsubscribe from several symbols; unknown symbols report `false`
    pub async fn unsubscribe_multiple<S: AsRef<str>>(&self, symbols: &[S]) -> HashMap<String, bool> {
        if !self.is_connected() {
            tracing::error!("not connected to WebSocket");
            return all(symbols, false);
        }

        let mut results = HashMap::new();
        let mut done = Vec::new();
        for symbol in symbols {
            let message = ControlMessage::unsubscribe(symbol);
            if !self.is_subscribed(&message.symbol) {
                tracing::warn!(symbol = %message.symbol, "not subscribed");
                results.insert(message.symbol, false);
                continue;
            }
            match self.inner.send_control(&message).await {
                Ok(()) => {
                    lock(&self.inner.registry).remove(&message.symbol);
                    done.push(message.symbol.clone());
                    results.insert(message.symbol, true);
                    sleep(self.inner.config.subscribe_pacing).await;
                }
                Err(e) => {
                    tracing::error!(symbol = %message.symbol, error = %e, "unsubscription failed");
                    results.insert(message.symbol, false);
                }
            }
        }

        if !done.is_empty() {
            tracing::info!(
                "unsubscribed from {} symbols: {}",
                done.len(),
                done.join(", ")
            );
        }
        results
    }

    /// Subscribe to the symbols not already subscribed
    pub async fn add_symbols<S: AsRef<str>>(&self, symbols: &[S]) -> HashMap<String, bool> {
        let new_symbols: Vec<&str> = symbols
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| !self.is_subscribed(s))
            .collect();

        if new_symbols.is_empty() {
            tracing::info!("all symbols already subscribed");
            return all(symbols, true);
        }
        self.subscribe_multiple(&new_symbols).await
    }

    pub async fn remove_symbols<S: AsRef<str>>(&self, symbols: &[S]) -> HashMap<String, bool> {
        self.unsubscribe_multiple(symbols).await
    }

    /// Drop every current subscription, then subscribe to `symbols`
    pub async fn replace_symbols<S: AsRef<str>>(&self, symbols: &[S]) -> HashMap<String, bool> {
        if self.subscription_count() > 0 {
            self.unsubscribe_all().await;
        }
        self.subscribe_multiple(symbols).await
    }

    // --- status -----------------------------------------------------------

    pub fn is_connected(&self) -> bool {
        self.inner.link.is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        let state = lock(&self.inner.controller).state();
        if state.is_connected() && !self.is_connected() {
            return ConnectionState::Disconnected;
        }
        state
    }

    pub fn subscribed_symbols(&self) -> HashSet<String> {
        lock(&self.inner.registry).snapshot()
    }

    pub fn is_subscribed(&self, symbol: &str) -> bool {
        lock(&self.inner.registry).contains(symbol)
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.inner.registry).len()
    }

    /// One of the subscribed symbols, if any
    pub fn current_symbol(&self) -> Option<String> {
        lock(&self.inner.registry).first()
    }

    pub fn heartbeat_status(&self) -> HeartbeatStatus {
        self.inner.heartbeat.status(self.is_connected())
    }

    /// Change heartbeat settings; applies from the next (re)connect
    pub fn set_heartbeat_config(&self, config: HeartbeatConfig) {
        self.inner.heartbeat.configure(config);
    }

    /// Change reconnection settings; applies from the next `connect`
    pub fn set_reconnect_config(&self, config: ReconnectConfig) {
        *lock(&self.inner.reconnect_config) = config;
    }

    // --- orders -----------------------------------------------------------

    /// Place an order; `on_order_update` receives the order on success
    pub async fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        match self.inner.api.place_order(request).await {
            Ok(order) => {
                tracing::info!(
                    order_id = %order.id,
                    side = request.side.as_str(),
                    quantity = request.quantity,
                    symbol = %request.symbol,
                    "order placed"
                );
                self.notify_order(&order);
                Ok(order)
            }
            Err(e) => {
                tracing::error!(symbol = %request.symbol, error = %e, "order placement failed");
                Err(e)
            }
        }
    }

    /// Cancel an order; `on_order_update` receives the cancelled order
    pub async fn cancel_order(&self, order_id: &str) -> Result<Order> {
        match self.inner.api.cancel_order(order_id).await {
            Ok(order) => {
                tracing::info!(order_id, "order cancelled");
                self.notify_order(&order);
                Ok(order)
            }
            Err(e) => {
                tracing::error!(order_id, error = %e, "order cancellation failed");
                Err(e)
            }
        }
    }

    pub async fn get_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        self.inner.api.get_orders(filter).await.inspect_err(|e| {
            tracing::error!(error = %e, "failed to get orders");
        })
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        self.inner.api.get_order(order_id).await.inspect_err(|e| {
            tracing::error!(order_id, error = %e, "failed to get order");
        })
    }

    pub async fn health_check(&self) -> bool {
        self.inner.api.health_check().await
    }

    fn notify_order(&self, order: &Order) {
        let handler = Arc::clone(&self.inner.handler);
        guarded("on_order_update", || handler.on_order_update(order));
    }
}

fn all<S: AsRef<str>>(symbols: &[S], value: bool) -> HashMap<String, bool> {
    symbols
        .iter()
        .map(|s| (s.as_ref().to_uppercase(), value))
        .collect()
}

impl Inner {
    fn session_context(&self) -> SessionContext {
        SessionContext {
            handler: Arc::clone(&self.handler),
            heartbeat: Arc::clone(&self.heartbeat),
            link: Arc::clone(&self.link),
            events: self.events_tx.clone(),
        }
    }

    /// Open a new generation unless one is alive
    async fn open_session(&self) -> Result<()> {
        let mut slot = self.session.lock().await;
        if slot.as_ref().is_some_and(|session| session.is_alive()) {
            tracing::warn!("already connected to WebSocket");
            return Ok(());
        }
        if let Some(mut stale) = slot.take() {
            stale.close(self.config.close_timeout).await;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = self.api.token();
        let session = TransportSession::open(
            &self.config.ws_url,
            token.as_deref(),
            self.heartbeat.config(),
            self.config.connect_timeout,
            generation,
            self.session_context(),
        )
        .await?;

        *slot = Some(session);
        lock(&self.controller).on_connected();
        Ok(())
    }

    async fn send_control(&self, message: &ControlMessage) -> Result<()> {
        let slot = self.session.lock().await;
        match slot.as_ref() {
            Some(session) => session.send(message),
            None => Err(Error::NotConnected),
        }
    }

    async fn subscribe_multiple<S: AsRef<str>>(&self, symbols: &[S]) -> HashMap<String, bool> {
        if !self.link.is_connected() {
            tracing::error!("not connected to WebSocket");
            return all(symbols, false);
        }

        let mut results = HashMap::new();
        let mut done = Vec::new();
        for symbol in symbols {
            let message = ControlMessage::subscribe(symbol);
            match self.send_control(&message).await {
                Ok(()) => {
                    lock(&self.registry).add(&message.symbol);
                    done.push(message.symbol.clone());
                    results.insert(message.symbol, true);
                    sleep(self.config.subscribe_pacing).await;
                }
                Err(e) => {
                    tracing::error!(symbol = %message.symbol, error = %e, "subscription failed");
                    results.insert(message.symbol, false);
                }
            }
        }

        if !done.is_empty() {
            tracing::info!("subscribed to {} symbols: {}", done.len(), done.join(", "));
        }
        results
    }

    /// Replay the pre-disconnect registry on a fresh connection
    async fn resubscribe(&self) {
        let symbols: Vec<String> = {
            let mut registry = lock(&self.registry);
            let snapshot = registry.snapshot();
            registry.clear();
            snapshot.into_iter().collect()
        };
        if symbols.is_empty() {
            return;
        }
        tracing::info!(count = symbols.len(), "re-subscribing after reconnect");
        self.subscribe_multiple(&symbols).await;
    }

    /// Sleep for `delay`; `false` if the client was stopped meanwhile
    async fn wait_or_stopped(&self, delay: Duration) -> bool {
        let mut stop_rx = self.stop_tx.subscribe();
        tokio::select! {
            _ = sleep(delay) => self.running.load(Ordering::SeqCst),
            _ = async move { let _ = stop_rx.wait_for(|stopped| *stopped).await.map(|_| ()); } => false,
        }
    }

    async fn handle_closed(&self, generation: u64, reason: CloseReason) {
        if generation != self.generation.load(Ordering::SeqCst) {
            tracing::debug!(generation, "ignoring close of a stale connection");
            return;
        }
        {
            let mut slot = self.session.lock().await;
            if slot
                .as_ref()
                .is_some_and(|session| session.generation() == generation)
            {
                slot.take();
            }
        }

        let running = self.running.load(Ordering::SeqCst);
        let mut decision = lock(&self.controller).on_closed(running);
        let mut last_error = format!("{:?}", reason);

        loop {
            match decision {
                ReconnectDecision::Idle => return,
                ReconnectDecision::GiveUp { attempts } => {
                    self.give_up(attempts, last_error).await;
                    return;
                }
                ReconnectDecision::Retry { attempt, delay } => {
                    let max_attempts = lock(&self.controller).max_attempts();
                    tracing::info!(attempt, max_attempts, ?delay, "attempting to reconnect");

                    if !self.wait_or_stopped(delay).await {
                        tracing::info!("client stopped, abandoning reconnect");
                        lock(&self.controller).disarm();
                        return;
                    }

                    match self.open_session().await {
                        Ok(()) => {
                            tracing::info!(attempt, "reconnected");
                            if self.running.load(Ordering::SeqCst) {
                                self.resubscribe().await;
                            } else {
                                // stopped while the handshake was in flight
                                let session = self.session.lock().await.take();
                                if let Some(mut session) = session {
                                    session.close(self.config.close_timeout).await;
                                }
                            }
                            return;
                        }
                        Err(e) => {
                            tracing::warn!(attempt, error = %e, "reconnect attempt failed");
                            last_error = e.to_string();
                        }
                    }
                    let running = self.running.load(Ordering::SeqCst);
                    decision = lock(&self.controller).on_attempt_failed(running);
                }
            }
        }
    }

    async fn give_up(&self, attempts: u32, last_error: String) {
        let error = Error::ReconnectFailed {
            attempts,
            last_error,
        };
        tracing::error!(%error, "max reconnect attempts reached, giving up");
        let handler = Arc::clone(&self.handler);
        guarded("on_error", || handler.on_error(&error));

        self.running.store(false, Ordering::SeqCst);
        let session = self.session.lock().await.take();
        if let Some(mut session) = session {
            session.close(self.config.close_timeout).await;
        }
        lock(&self.registry).clear();
        self.stop_tx.send_replace(true);
    }
}

/// Reconnection supervisor: one per client, fed by every receive loop
async fn supervise(inner: Weak<Inner>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match event {
            TransportEvent::Closed { generation, reason } => {
                inner.handle_closed(generation, reason).await;
            }
        }
    }
}
