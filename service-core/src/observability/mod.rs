pub mod logging;

pub use logging::{TracingSettings, init_tracing};
