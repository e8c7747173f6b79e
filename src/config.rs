use std::time::Duration;

use crate::error::{Error, Result};
use crate::websocket::{HeartbeatConfig, ReconnectConfig};

/// Default WebSocket endpoint of a local NSE Socket server
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080";

/// Default REST endpoint of a local NSE Socket server
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Configuration for [`NseClient`](crate::NseClient)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket feed endpoint
    pub ws_url: String,
    /// REST API base URL
    pub api_url: String,
    /// Bearer token, usually obtained through `authenticate`
    pub token: Option<String>,
    /// Ping/pong settings applied when a connection opens
    pub heartbeat: HeartbeatConfig,
    /// Reconnection behavior after an unexpected close
    pub reconnect: ReconnectConfig,
    /// Maximum time for the WebSocket handshake
    pub connect_timeout: Duration,
    /// Maximum time to wait for the receive loop to finish on close
    pub close_timeout: Duration,
    /// Pause between opening the socket and sending the first subscriptions
    pub settle_delay: Duration,
    /// Pause between consecutive subscribe/unsubscribe frames
    pub subscribe_pacing: Duration,
    /// Pause between batches in `subscribe_batch`
    pub batch_pause: Duration,
    /// Timeout for REST calls
    pub request_timeout: Duration,
    /// Timeout for the health check
    pub health_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(500),
            subscribe_pacing: Duration::from_millis(100),
            batch_pause: Duration::from_millis(500),
            request_timeout: Duration::from_secs(10),
            health_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given endpoints with default settings
    pub fn new(ws_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `NSE_WS_URL`, `NSE_API_URL` and `NSE_TOKEN`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("NSE_WS_URL") {
            config.ws_url = url;
        }
        if let Ok(url) = std::env::var("NSE_API_URL") {
            config.api_url = url;
        }
        if let Ok(token) = std::env::var("NSE_TOKEN") {
            if !token.trim().is_empty() {
                config.token = Some(token);
            }
        }
        config
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set settle delay, subscribe pacing and batch pause in one go
    pub fn with_pacing(mut self, settle: Duration, per_symbol: Duration, batch: Duration) -> Self {
        self.settle_delay = settle;
        self.subscribe_pacing = per_symbol;
        self.batch_pause = batch;
        self
    }

    /// Check that both endpoints are present
    pub fn validate(&self) -> Result<()> {
        if self.ws_url.trim().is_empty() || self.api_url.trim().is_empty() {
            return Err(Error::Config(
                "WebSocket and API URLs must be provided".to_string(),
            ));
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(Error::Config(
                "reconnect multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }
}
