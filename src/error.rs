use std::fmt;

/// Result type for nse-socket-rs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for nse-socket-rs
#[derive(Debug)]
pub enum Error {
    /// HTTP request failed
    Http(reqwest::Error),

    /// JSON serialization/deserialization failed
    Json(serde_json::Error),

    /// Invalid configuration
    Config(String),

    /// Login rejected or malformed login response
    Authentication(String),

    /// Handshake timeout or socket failure while opening
    Connection(String),

    /// Operation requires an open WebSocket connection
    NotConnected,

    /// Subscribe/unsubscribe could not be issued
    Subscription(String),

    /// Decode or send failure on an open socket
    Transport(String),

    /// API error response (non-200 status)
    Api { status: u16, message: String },

    /// Service answered 200 but with `success: false`
    Rejected(String),

    /// WebSocket protocol error
    WebSocket(String),

    /// WebSocket connection closed
    ConnectionClosed,

    /// Reconnection failed after multiple attempts
    ReconnectFailed {
        attempts: u32,
        last_error: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {}", e),
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Authentication(msg) => write!(f, "Authentication failed: {}", msg),
            Error::Connection(msg) => write!(f, "Connection error: {}", msg),
            Error::NotConnected => write!(f, "Not connected to WebSocket"),
            Error::Subscription(msg) => write!(f, "Subscription error: {}", msg),
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
            Error::Api { status, message } => {
                write!(f, "API error (status {}): {}", status, message)
            }
            Error::Rejected(msg) => write!(f, "Request rejected: {}", msg),
            Error::WebSocket(msg) => write!(f, "WebSocket error: {}", msg),
            Error::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Error::ReconnectFailed {
                attempts,
                last_error,
            } => write!(
                f,
                "Reconnection failed after {} attempts: {}",
                attempts, last_error
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(err.to_string())
    }
}
