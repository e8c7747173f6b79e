use std::time::Duration;

/// Configuration for reconnection behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Reconnect automatically after an unexpected close
    pub auto_reconnect: bool,
    /// Delay before the first reconnection attempt
    pub interval: Duration,
    /// Maximum delay between reconnection attempts
    pub max_interval: Duration,
    /// Multiplier applied to the delay after each attempt (1.0 = fixed delay)
    pub multiplier: f64,
    /// Attempts allowed before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(60),
            multiplier: 1.0,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    pub fn disabled() -> Self {
        Self {
            auto_reconnect: false,
            ..Self::default()
        }
    }
}

/// Exponential backoff calculator
#[derive(Debug, Clone)]
struct ExponentialBackoff {
    initial_delay: Duration,
    current_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            current_delay: initial_delay,
            max_delay,
            multiplier,
        }
    }

    /// Get the next delay duration
    fn next_delay(&mut self) -> Duration {
        let delay = std::cmp::min(self.current_delay, self.max_delay);
        self.current_delay = std::cmp::min(
            Duration::from_secs_f64(delay.as_secs_f64() * self.multiplier),
            self.max_delay,
        );
        delay
    }

    /// Reset the backoff to initial delay
    fn reset(&mut self) {
        self.current_delay = self.initial_delay;
    }
}

/// Lifecycle state of a client session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no reconnect in progress
    Disconnected,
    /// Connection open
    Connected,
    /// Waiting for, or running, reconnection attempt `attempt`
    Reconnecting { attempt: u32 },
    /// Attempts exhausted; only an explicit `connect` leaves this state
    GivingUp,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// What the supervisor should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Do nothing (reconnect disarmed or session stopped)
    Idle,
    /// Sleep `delay`, then attempt to open again
    Retry { attempt: u32, delay: Duration },
    /// Attempts exhausted, tear the session down
    GiveUp { attempts: u32 },
}

/// Reconnection state machine
///
/// Pure bookkeeping; the client supervisor performs the waits and opens it
/// asks for.
#[derive(Debug, Clone)]
pub struct ReconnectController {
    config: ReconnectConfig,
    armed: bool,
    attempts: u32,
    state: ConnectionState,
    backoff: ExponentialBackoff,
}

impl ReconnectController {
    pub fn new(config: ReconnectConfig) -> Self {
        let backoff = ExponentialBackoff::new(config.interval, config.max_interval, config.multiplier);
        Self {
            armed: config.auto_reconnect,
            config,
            attempts: 0,
            state: ConnectionState::Disconnected,
            backoff,
        }
    }

    /// Fresh session started by the user: apply `config` and leave any
    /// terminal state behind.
    pub fn arm(&mut self, config: ReconnectConfig) {
        *self = Self::new(config);
    }

    /// User-initiated disconnect: closes that follow must not reconnect.
    pub fn disarm(&mut self) {
        self.armed = false;
        if self.state != ConnectionState::GivingUp {
            self.state = ConnectionState::Disconnected;
        }
    }

    pub fn on_connected(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
        self.state = ConnectionState::Connected;
    }

    /// Transport closed. `running` is false once the user asked to stop.
    pub fn on_closed(&mut self, running: bool) -> ReconnectDecision {
        if self.state == ConnectionState::GivingUp {
            return ReconnectDecision::Idle;
        }
        self.state = ConnectionState::Disconnected;
        if !(running && self.armed) {
            return ReconnectDecision::Idle;
        }
        self.next_attempt()
    }

    /// A reconnection attempt could not open the transport.
    pub fn on_attempt_failed(&mut self, running: bool) -> ReconnectDecision {
        self.on_closed(running)
    }

    fn next_attempt(&mut self) -> ReconnectDecision {
        if self.attempts >= self.config.max_attempts {
            self.state = ConnectionState::GivingUp;
            return ReconnectDecision::GiveUp {
                attempts: self.attempts,
            };
        }
        self.attempts += 1;
        self.state = ConnectionState::Reconnecting {
            attempt: self.attempts,
        };
        ReconnectDecision::Retry {
            attempt: self.attempts,
            delay: self.backoff.next_delay(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}
