//! groupwalk-cli: command-line front end for membership expansion
//!
//! This crate wires the traversal engine to a configured directory:
//! - Layered configuration (defaults, YAML file, environment)
//! - Structured logging to stderr
//! - JSON-lines output of traversal records
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                groupwalk-cli                 │
//! ├─────────────────────────────────────────────┤
//! │  config         - Layered configuration     │
//! │  observability/ - Logging setup             │
//! │  output         - JSON-lines record writer  │
//! │  run            - Batch orchestration       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod observability;
pub mod output;
pub mod run;

pub use config::{ConfigLoadError, GroupwalkConfig};
pub use output::RecordWriter;
pub use run::{run, RunRequest, RunSummary};
