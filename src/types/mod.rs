mod auth;
mod control;
mod market;
mod order;

// Re-export all types
pub use auth::*;
pub use control::*;
pub use market::*;
pub use order::*;
