//! WebSocket feed plumbing.
//!
//! - [`SubscriptionRegistry`]: symbols currently subscribed, replayed after a reconnect
//! - [`HeartbeatMonitor`]: ping/pong settings and the last observed pong
//! - [`ReconnectController`]: state machine deciding retry, backoff and give-up
//! - the transport session: one connection plus its receive loop (crate-internal,
//!   driven through [`NseClient`](crate::NseClient))
//!
//! # Connection Management
//!
//! The NSE Socket server drops clients that stay silent for about 30 seconds.
//! Keep the heartbeat enabled unless the transport in between already pings.

mod heartbeat;
mod reconnect;
mod registry;
pub(crate) mod transport;

pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor, HeartbeatStatus};
pub use reconnect::{ConnectionState, ReconnectConfig, ReconnectController, ReconnectDecision};
pub use registry::SubscriptionRegistry;
pub use transport::{CloseReason, TransportEvent};

// Re-export commonly used types for convenience
pub use crate::types::{ControlAction, ControlMessage, InboundFrame, SubscriptionAck, Tick, TickData};
