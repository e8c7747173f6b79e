use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::heartbeat::{HeartbeatConfig, HeartbeatMonitor, PongDeadline};
use crate::callbacks::{guarded, EventHandler};
use crate::error::{Error, Result};
use crate::types::{ControlMessage, InboundFrame, Tick, TickPayload};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a connection generation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called
    Local,
    /// Server sent a close frame or the stream ended
    Remote,
    /// No pong arrived within the heartbeat timeout
    HeartbeatTimeout,
    /// Socket read/write failure
    Error(String),
}

/// Notification emitted by a receive loop when it exits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Closed { generation: u64, reason: CloseReason },
}

/// Connected flag shared between the receive loops and the control API
#[derive(Debug, Default)]
pub(crate) struct LinkState {
    generation: AtomicU64,
    connected: AtomicBool,
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn mark_open(&self, generation: u64) {
        self.generation.store(generation, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Ignored when a newer generation already took over
    fn mark_closed(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.connected.store(false, Ordering::SeqCst);
        }
    }
}

/// Everything a receive loop needs besides the socket
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub handler: Arc<dyn EventHandler>,
    pub heartbeat: Arc<HeartbeatMonitor>,
    pub link: Arc<LinkState>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

/// One WebSocket connection and its background receive loop
pub(crate) struct TransportSession {
    generation: u64,
    outbound: mpsc::UnboundedSender<Message>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    ctx: SessionContext,
}

fn build_request(url: &str, token: Option<&str>) -> Result<Request> {
    let mut request = url
        .into_client_request()
        .map_err(|e| Error::Connection(format!("invalid WebSocket URL {}: {}", url, e)))?;
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| Error::Connection(format!("invalid token header: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

impl TransportSession {
    /// Open a connection and spawn its receive loop.
    ///
    /// The handshake must complete within `connect_timeout`. On success the
    /// link is marked connected and `on_connect` fires before any frame is
    /// dispatched.
    pub async fn open(
        url: &str,
        token: Option<&str>,
        heartbeat: HeartbeatConfig,
        connect_timeout: Duration,
        generation: u64,
        ctx: SessionContext,
    ) -> Result<Self> {
        let request = build_request(url, token)?;
        tracing::info!(url, generation, "connecting to WebSocket");

        let ws = match timeout(connect_timeout, connect_async(request)).await {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => return Err(Error::Connection(e.to_string())),
            Err(_) => {
                return Err(Error::Connection(format!(
                    "handshake did not complete within {:?}",
                    connect_timeout
                )))
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        ctx.link.mark_open(generation);
        ctx.heartbeat.record_pong(Utc::now());
        tracing::info!(generation, "WebSocket connection opened");
        if heartbeat.enabled {
            tracing::info!(interval = ?heartbeat.interval, "heartbeat enabled");
        }
        let handler = Arc::clone(&ctx.handler);
        guarded("on_connect", || handler.on_connect());

        let task = tokio::spawn(receive_loop(
            ws,
            outbound_rx,
            shutdown_rx,
            heartbeat,
            generation,
            ctx.clone(),
        ));

        Ok(Self {
            generation,
            outbound: outbound_tx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
            ctx,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the receive loop is still up
    pub fn is_alive(&self) -> bool {
        self.ctx.link.is_connected()
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Queue a control frame on the socket
    pub fn send(&self, message: &ControlMessage) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::NotConnected);
        }
        let text = serde_json::to_string(message)?;
        self.outbound
            .send(Message::Text(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Stop the receive loop and wait for it, at most `grace`
    pub async fn close(&mut self, grace: Duration) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut task) = self.task.take() {
            if timeout(grace, &mut task).await.is_err() {
                tracing::warn!(
                    generation = self.generation,
                    ?grace,
                    "receive loop did not stop in time, aborting it"
                );
                task.abort();
                self.ctx.link.mark_closed(self.generation);
                let handler = Arc::clone(&self.ctx.handler);
                guarded("on_disconnect", || handler.on_disconnect());
            }
        }
        self.ctx.link.mark_closed(self.generation);
    }
}

async fn receive_loop(
    ws: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    mut shutdown_rx: oneshot::Receiver<()>,
    heartbeat: HeartbeatConfig,
    generation: u64,
    ctx: SessionContext,
) {
    let (mut write, mut read) = ws.split();

    let mut pong = PongDeadline::new(heartbeat.timeout);
    let mut ping_timer = interval_at(Instant::now() + heartbeat.interval, heartbeat.interval);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        let pong_deadline = pong.deadline();

        tokio::select! {
            _ = &mut shutdown_rx => {
                let _ = write.send(Message::Close(None)).await;
                break CloseReason::Local;
            }

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    dispatch_text(&text, ctx.handler.as_ref());
                }
                Some(Ok(Message::Pong(_))) => {
                    tracing::debug!("received pong from server");
                    pong.pong_received();
                    ctx.heartbeat.record_pong(Utc::now());
                }
                Some(Ok(Message::Ping(_))) => {
                    // the pong reply is queued by tungstenite
                    tracing::debug!("received ping from server");
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "server closed the connection");
                    break CloseReason::Remote;
                }
                Some(Ok(Message::Binary(_))) | Some(Ok(Message::Frame(_))) => {
                    tracing::debug!("ignoring non-text frame");
                }
                Some(Err(e)) => {
                    let error = Error::from(e);
                    tracing::error!(%error, "WebSocket error");
                    let handler = Arc::clone(&ctx.handler);
                    guarded("on_error", || handler.on_error(&error));
                    break CloseReason::Error(error.to_string());
                }
                None => break CloseReason::Remote,
            },

            Some(message) = outbound_rx.recv() => {
                if let Err(e) = write.send(message).await {
                    let error = Error::Transport(e.to_string());
                    tracing::error!(%error, "failed to write frame");
                    let handler = Arc::clone(&ctx.handler);
                    guarded("on_error", || handler.on_error(&error));
                    break CloseReason::Error(error.to_string());
                }
            }

            _ = ping_timer.tick(), if heartbeat.enabled => {
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    break CloseReason::Error(e.to_string());
                }
                pong.ping_sent(Instant::now());
            }

            _ = async {
                match pong_deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            }, if pong_deadline.is_some() => {
                tracing::warn!(timeout = ?heartbeat.timeout, "no pong received, dropping connection");
                break CloseReason::HeartbeatTimeout;
            }
        }
    };

    ctx.link.mark_closed(generation);
    tracing::info!(generation, ?reason, "WebSocket connection closed");
    let handler = Arc::clone(&ctx.handler);
    guarded("on_disconnect", || handler.on_disconnect());
    let _ = ctx.events.send(TransportEvent::Closed { generation, reason });
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

fn deliver(handler: &dyn EventHandler, tick: Tick) {
    guarded("on_ticks", || handler.on_ticks(&tick));
}

/// Decode one text frame and dispatch it. Returns the number of ticks
/// delivered to the handler.
pub(crate) fn dispatch_text(text: &str, handler: &dyn EventHandler) -> usize {
    let frame = match InboundFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, frame = %preview(text), "failed to parse message");
            return 0;
        }
    };

    match frame {
        InboundFrame::Ack(ack) => {
            if ack.is_success() {
                tracing::info!(symbol = ?ack.symbol, message = %ack.message, "subscription acknowledged");
            } else {
                tracing::warn!(
                    symbol = ?ack.symbol,
                    status = %ack.status,
                    message = %ack.message,
                    "subscription request failed"
                );
            }
            0
        }
        InboundFrame::Tick(payload) => {
            deliver(handler, Tick::from_payload(payload, Utc::now()));
            1
        }
        InboundFrame::Batch(items) => {
            let mut delivered = 0;
            for item in items {
                match serde_json::from_value::<TickPayload>(item) {
                    Ok(payload) => {
                        deliver(handler, Tick::from_payload(payload, Utc::now()));
                        delivered += 1;
                    }
                    Err(e) => tracing::warn!(error = %e, "skipping malformed tick in batch"),
                }
            }
            delivered
        }
        InboundFrame::Other(_) => {
            tracing::debug!(frame = %preview(text), "ignoring message");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        ticks: Mutex<Vec<Tick>>,
    }

    impl EventHandler for Recorder {
        fn on_ticks(&self, tick: &Tick) {
            self.ticks.lock().unwrap().push(tick.clone());
        }
    }

    struct Panicker;

    impl EventHandler for Panicker {
        fn on_ticks(&self, _tick: &Tick) {
            panic!("handler bug");
        }
    }

    #[test]
    fn test_single_tick_dispatch() {
        let recorder = Recorder::default();
        let frame = r#"{"symbol":"NIFTY","data":{"close":100.5,"volume":1000,"high":101,"low":99},"timestamp":"T1"}"#;

        assert_eq!(dispatch_text(frame, &recorder), 1);

        let ticks = recorder.ticks.lock().unwrap();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].symbol, "NIFTY");
        assert_eq!(ticks[0].timestamp, "T1");
        assert_eq!(ticks[0].data.close, Some(Decimal::from_str("100.5").unwrap()));
        assert_eq!(ticks[0].data.volume, Some(1000));
    }

    #[test]
    fn test_batch_dispatch_preserves_fields() {
        let recorder = Recorder::default();
        let frame = r#"{"ticks":[
            {"symbol":"RELIANCE","data":{"close":2450.1,"volume":10},"timestamp":"T1"},
            {"symbol":"TCS","data":{"close":3500,"volume":20},"timestamp":"T2"}
        ]}"#;

        assert_eq!(dispatch_text(frame, &recorder), 2);

        let ticks = recorder.ticks.lock().unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].symbol, "RELIANCE");
        assert_eq!(ticks[0].data.close, Some(Decimal::from_str("2450.1").unwrap()));
        assert_eq!(ticks[0].timestamp, "T1");
        assert_eq!(ticks[1].symbol, "TCS");
        assert_eq!(ticks[1].data.volume, Some(20));
        assert_eq!(ticks[1].timestamp, "T2");
    }

    #[test]
    fn test_batch_skips_bad_element() {
        let recorder = Recorder::default();
        let frame = r#"{"ticks":[{"symbol":"A"},{"symbol":"B","data":{"close":1}}]}"#;
        assert_eq!(dispatch_text(frame, &recorder), 1);
        assert_eq!(recorder.ticks.lock().unwrap()[0].symbol, "B");
    }

    #[test]
    fn test_non_tick_frames_do_not_dispatch() {
        let recorder = Recorder::default();
        assert_eq!(dispatch_text("not-json", &recorder), 0);
        assert_eq!(
            dispatch_text(r#"{"status":"error","symbol":"XYZ","message":"Unknown symbol"}"#, &recorder),
            0
        );
        assert_eq!(dispatch_text(r#"{"type":"welcome"}"#, &recorder), 0);
        assert!(recorder.ticks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let frame = r#"{"ticks":[{"symbol":"A","data":{}},{"symbol":"B","data":{}}]}"#;
        assert_eq!(dispatch_text(frame, &Panicker), 2);
    }

    #[test]
    fn test_build_request_sets_bearer() {
        let request = build_request("ws://localhost:8080", Some("abc.def.ghi")).unwrap();
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer abc.def.ghi"
        );
        let request = build_request("ws://localhost:8080", None).unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_build_request_rejects_bad_url() {
        assert!(matches!(
            build_request("not a url", None),
            Err(Error::Connection(_))
        ));
    }

    #[test]
    fn test_link_state_ignores_stale_generation() {
        let link = LinkState::default();
        link.mark_open(1);
        link.mark_open(2);
        link.mark_closed(1);
        assert!(link.is_connected());
        link.mark_closed(2);
        assert!(!link.is_connected());
    }
}
