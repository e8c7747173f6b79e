use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Ping/pong keep-alive settings
///
/// Read once when a connection opens; changes take effect on the next
/// (re)connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    /// Time between pings
    pub interval: Duration,
    /// Time allowed for the matching pong before the connection is dropped
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        // server drops clients that stay silent for 30s
        Self {
            enabled: true,
            interval: Duration::from_secs(25),
            timeout: Duration::from_secs(10),
        }
    }
}

impl HeartbeatConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Snapshot returned by [`NseClient::heartbeat_status`](crate::NseClient::heartbeat_status)
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatStatus {
    pub enabled: bool,
    pub interval: Duration,
    pub timeout: Duration,
    pub last_pong: Option<DateTime<Utc>>,
    pub connected: bool,
}

/// Heartbeat configuration plus the last observed pong
///
/// Liveness itself is judged by the receive loop through [`PongDeadline`];
/// this type only answers status queries.
#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    config: Mutex<HeartbeatConfig>,
    last_pong: Mutex<Option<DateTime<Utc>>>,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config: Mutex::new(config),
            last_pong: Mutex::new(None),
        }
    }

    pub fn config(&self) -> HeartbeatConfig {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn configure(&self, config: HeartbeatConfig) {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config;
        tracing::info!(
            enabled = config.enabled,
            interval = ?config.interval,
            timeout = ?config.timeout,
            "heartbeat configured"
        );
    }

    pub fn record_pong(&self, at: DateTime<Utc>) {
        *self.last_pong.lock().unwrap_or_else(PoisonError::into_inner) = Some(at);
    }

    pub fn last_pong(&self) -> Option<DateTime<Utc>> {
        *self.last_pong.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self, connected: bool) -> HeartbeatStatus {
        let config = self.config();
        HeartbeatStatus {
            enabled: config.enabled,
            interval: config.interval,
            timeout: config.timeout,
            last_pong: self.last_pong(),
            connected,
        }
    }
}

/// Outstanding-ping tracker used inside the receive loop
#[derive(Debug, Clone)]
pub(crate) struct PongDeadline {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl PongDeadline {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Arm the deadline unless a previous ping is still unanswered
    pub fn ping_sent(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.timeout);
        }
    }

    pub fn pong_received(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
