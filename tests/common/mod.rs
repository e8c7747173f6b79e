#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use nse_socket_rs::{
    ClientConfig, Error, EventHandler, HeartbeatConfig, Order, ReconnectConfig, Tick,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
enum Command {
    Send(String),
    Close,
}

/// In-process WebSocket server recording every text frame per connection
pub struct MockFeed {
    addr: SocketAddr,
    frames: Arc<Mutex<Vec<Vec<String>>>>,
    connections: Arc<AtomicUsize>,
    commands: broadcast::Sender<Command>,
    accept_task: JoinHandle<()>,
}

impl MockFeed {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (commands, _) = broadcast::channel(64);

        let accept_task = tokio::spawn({
            let frames = Arc::clone(&frames);
            let connections = Arc::clone(&connections);
            let commands = commands.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let Ok(mut ws) = accept_async(stream).await else {
                        continue;
                    };
                    let index = {
                        let mut frames = frames.lock().unwrap();
                        frames.push(Vec::new());
                        frames.len() - 1
                    };
                    let mut command_rx = commands.subscribe();
                    connections.fetch_add(1, Ordering::SeqCst);
                    let frames = Arc::clone(&frames);

                    tokio::spawn(async move {
                        loop {
                            tokio::select! {
                                msg = ws.next() => match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        frames.lock().unwrap()[index].push(text);
                                    }
                                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                },
                                command = command_rx.recv() => match command {
                                    Ok(Command::Send(text)) => {
                                        if ws.send(Message::Text(text)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Ok(Command::Close) | Err(_) => {
                                        let _ = ws.close(None).await;
                                        break;
                                    }
                                },
                            }
                        }
                    });
                }
            }
        });

        Self {
            addr,
            frames,
            connections,
            commands,
            accept_task,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Text frames received on connection `index`, in order
    pub fn frames(&self, index: usize) -> Vec<String> {
        self.frames
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    pub fn send_to_all(&self, text: &str) {
        let _ = self.commands.send(Command::Send(text.to_string()));
    }

    /// Close every open connection; the listener keeps accepting
    pub fn close_all(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Stop accepting and close every open connection
    pub async fn shutdown(mut self) {
        self.accept_task.abort();
        let _ = (&mut self.accept_task).await;
        self.close_all();
    }
}

/// Config pointing at `ws_url` with pacing removed and a fast reconnect
pub fn test_config(ws_url: &str) -> ClientConfig {
    ClientConfig::new(ws_url, "http://127.0.0.1:9")
        .with_connect_timeout(Duration::from_secs(2))
        .with_heartbeat(HeartbeatConfig::disabled())
        .with_reconnect(ReconnectConfig {
            interval: Duration::from_millis(50),
            max_interval: Duration::from_millis(50),
            max_attempts: 3,
            ..ReconnectConfig::default()
        })
        .with_pacing(Duration::ZERO, Duration::ZERO, Duration::ZERO)
}

/// Poll `condition` every 10ms until it holds or `limit` elapses
pub async fn wait_until(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Handler recording everything it sees
#[derive(Default)]
pub struct Recorder {
    pub ticks: Mutex<Vec<Tick>>,
    pub orders: Mutex<Vec<Order>>,
    pub errors: Mutex<Vec<String>>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl Recorder {
    pub fn tick_count(&self) -> usize {
        self.ticks.lock().unwrap().len()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl EventHandler for Recorder {
    fn on_ticks(&self, tick: &Tick) {
        self.ticks.lock().unwrap().push(tick.clone());
    }

    fn on_connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, error: &Error) {
        self.errors.lock().unwrap().push(error.to_string());
    }

    fn on_order_update(&self, order: &Order) {
        self.orders.lock().unwrap().push(order.clone());
    }
}

/// One canned HTTP response
pub struct Canned {
    pub status: u16,
    pub body: String,
}

impl Canned {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

/// Minimal HTTP/1.1 responder: `route` maps the request line (e.g.
/// `"POST /api/login"`) to a response. Request heads are recorded.
pub struct MockApi {
    addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl MockApi {
    pub async fn start<F>(route: F) -> Self
    where
        F: Fn(&str) -> Canned + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let route = Arc::new(route);

        let task = tokio::spawn({
            let requests = Arc::clone(&requests);
            async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let requests = Arc::clone(&requests);
                    let route = Arc::clone(&route);
                    tokio::spawn(async move {
                        let head = read_request(&mut stream).await;
                        let request_line = head.lines().next().unwrap_or_default().to_string();
                        let key = request_line
                            .rsplit_once(' ')
                            .map(|(key, _version)| key.to_string())
                            .unwrap_or_default();
                        requests.lock().unwrap().push(head);

                        let canned = route(&key);
                        let response = format!(
                            "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            canned.status,
                            canned.body.len(),
                            canned.body
                        );
                        let _ = stream.write_all(response.as_bytes()).await;
                        let _ = stream.shutdown().await;
                    });
                }
            }
        });

        Self {
            addr,
            requests,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn request_heads(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Read headers plus a Content-Length body
async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Run `fut` with a generous upper bound so a hang fails instead of stalling
pub async fn bounded<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("operation timed out")
}
