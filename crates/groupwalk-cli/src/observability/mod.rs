//! Observability for the groupwalk CLI.

mod logging;

pub use logging::{init_logging, LoggingConfig};
