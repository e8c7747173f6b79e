//! Event callbacks.
//!
//! Handlers run on the receive loop (ticks, connect, disconnect, errors) or
//! on the caller's task (order updates). A panicking handler is caught and
//! logged; it never tears down the loop.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::Error;
use crate::types::{Order, Tick};

/// Receiver of client events
///
/// Every method has a no-op default, implement only what you need.
pub trait EventHandler: Send + Sync {
    /// One market data update
    fn on_ticks(&self, _tick: &Tick) {}

    /// A connection generation opened
    fn on_connect(&self) {}

    /// A connection generation closed, for any reason
    fn on_disconnect(&self) {}

    /// Transport-level error observed by the receive loop
    fn on_error(&self, _error: &Error) {}

    /// Order placed or cancelled, exactly as returned by the service
    fn on_order_update(&self, _order: &Order) {}
}

/// Handler that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl EventHandler for NoopHandler {}

impl<T: EventHandler + ?Sized> EventHandler for std::sync::Arc<T> {
    fn on_ticks(&self, tick: &Tick) {
        (**self).on_ticks(tick)
    }

    fn on_connect(&self) {
        (**self).on_connect()
    }

    fn on_disconnect(&self) {
        (**self).on_disconnect()
    }

    fn on_error(&self, error: &Error) {
        (**self).on_error(error)
    }

    fn on_order_update(&self, order: &Order) {
        (**self).on_order_update(order)
    }
}

type TickFn = Box<dyn Fn(&Tick) + Send + Sync>;
type UnitFn = Box<dyn Fn() + Send + Sync>;
type ErrorFn = Box<dyn Fn(&Error) + Send + Sync>;
type OrderFn = Box<dyn Fn(&Order) + Send + Sync>;

/// Closure-based [`EventHandler`]
///
/// ```
/// use nse_socket_rs::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_ticks(|tick| println!("{} {:?}", tick.symbol, tick.data.close))
///     .on_disconnect(|| println!("feed lost"));
/// ```
#[derive(Default)]
pub struct Callbacks {
    ticks: Option<TickFn>,
    connect: Option<UnitFn>,
    disconnect: Option<UnitFn>,
    error: Option<ErrorFn>,
    order_update: Option<OrderFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_ticks(mut self, f: impl Fn(&Tick) + Send + Sync + 'static) -> Self {
        self.ticks = Some(Box::new(f));
        self
    }

    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.connect = Some(Box::new(f));
        self
    }

    pub fn on_disconnect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.disconnect = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn on_order_update(mut self, f: impl Fn(&Order) + Send + Sync + 'static) -> Self {
        self.order_update = Some(Box::new(f));
        self
    }
}

impl EventHandler for Callbacks {
    fn on_ticks(&self, tick: &Tick) {
        if let Some(f) = &self.ticks {
            f(tick);
        }
    }

    fn on_connect(&self) {
        if let Some(f) = &self.connect {
            f();
        }
    }

    fn on_disconnect(&self) {
        if let Some(f) = &self.disconnect {
            f();
        }
    }

    fn on_error(&self, error: &Error) {
        if let Some(f) = &self.error {
            f(error);
        }
    }

    fn on_order_update(&self, order: &Order) {
        if let Some(f) = &self.order_update {
            f(order);
        }
    }
}

/// Run a handler call, logging instead of propagating a panic.
///
/// Returns `false` when the handler panicked.
pub(crate) fn guarded(event: &'static str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(event, %reason, "error in event handler");
            false
        }
    }
}
