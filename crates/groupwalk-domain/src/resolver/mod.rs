//! Membership traversal engine.
//!
//! The engine performs async traversal of directory group membership,
//! discovering members lazily through a [`DirectoryClient`].
//!
//! # Module Structure
//!
//! - `config` - Engine configuration (concurrency, timeout)
//! - `context` - Per-traversal state (visited set, accumulators, cancellation)
//! - `engine` - Flat and expanded traversal disciplines
//! - `tracker` - Visited set and leaf deduplication
//! - `traits` - Directory client trait
//! - `types` - Request and result types
//! - `tests` - Unit tests

mod config;
mod context;
mod engine;
mod tracker;
mod traits;
mod types;

#[cfg(test)]
mod tests;

pub use config::{TraversalConfig, DEFAULT_LEVELS_DEEP_TO_GO};
pub use engine::{TraversalEngine, TraversalStats, TraversalStatsSnapshot};
pub use tracker::VisitedTracker;
pub use traits::{DirectoryClient, MemberStream};
pub use types::{
    Completion, ExpandedResult, FlatMember, FlatResult, IncompleteReason, PendingExpansion,
    SkippedBranch, TraversalMode, TraversalOptions, TraversalResult,
};
