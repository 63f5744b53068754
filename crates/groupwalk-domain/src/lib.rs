//! groupwalk-domain: Recursive directory group membership expansion
//!
//! This crate contains the core expansion logic including:
//! - Directory object and membership edge model
//! - Domain routing for multi-domain forests
//! - Traversal engine (flat and level-annotated disciplines)
//! - Result shaping for output
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              groupwalk-domain                │
//! ├─────────────────────────────────────────────┤
//! │  model/       - Directory objects & edges   │
//! │  routing/     - DN to domain routing        │
//! │  resolver/    - Traversal engine            │
//! │  accumulator/ - Output record shaping       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod accumulator;
pub mod error;
pub mod model;
pub mod resolver;
pub mod routing;

// Re-export commonly used types at the crate root
pub use accumulator::{
    collapse_flat, expanded_records, flat_records, CollapsedRecord, ExpandedRecord, FlatRecord,
    IdentifierPreference,
};
pub use error::{DomainError, DomainResult};
pub use model::{DirectoryObjectRef, MembershipEdge, MembershipFilter, MembershipKind, ObjectKind};
pub use resolver::{
    Completion, DirectoryClient, MemberStream, TraversalConfig, TraversalEngine, TraversalMode,
    TraversalOptions, TraversalResult,
};
pub use routing::{route_for, RoutingHint};
