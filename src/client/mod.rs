mod api;
mod nse;

pub use api::ApiClient;
pub use nse::NseClient;
