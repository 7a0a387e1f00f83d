pub mod health;
pub mod predictions;

pub use health::{health_check, metrics_endpoint, readiness_check};
pub use predictions::{list_histories, predict};
