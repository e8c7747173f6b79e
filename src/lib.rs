//! # nse-socket-rs
//!
//! A Rust client library for the NSE Socket market-data server.
//!
//! This library provides:
//! - Real-time tick streaming over WebSocket with symbol subscriptions
//! - Heartbeat keep-alive and automatic reconnection with subscription replay
//! - Bearer-token login and order management over the REST API
//!
//! ## Features
//!
//! - **Event Handlers**: implement [`EventHandler`] or compose closures with [`Callbacks`]
//! - **Resilient Sessions**: dropped connections are reopened and re-subscribed
//! - **Proper Error Handling**: No panics, handler panics are contained and logged
//! - **Decimal Precision**: prices decode into [`rust_decimal::Decimal`]
//!
//! Logging goes through [`tracing`]; install any subscriber to see it.

// Public modules
pub mod callbacks;
pub mod client;
pub mod config;
pub mod error;
pub mod types;
pub mod websocket;

// Internal modules
mod http;

pub use callbacks::{Callbacks, EventHandler, NoopHandler};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use types::{
    LoginResponse, Order, OrderFilter, OrderRequest, OrderSide, OrderStatus, OrderType, Tick,
    TickData,
};

// Re-export clients
pub use client::{ApiClient, NseClient};

pub use websocket::{
    ConnectionState, HeartbeatConfig, HeartbeatStatus, ReconnectConfig, SubscriptionRegistry,
};
