//! groupwalk-directory: In-memory directory backend
//!
//! This crate provides a [`DirectoryClient`](groupwalk_domain::DirectoryClient)
//! implementation backed by memory, used by tests, benchmarks and the CLI:
//! - Objects partitioned by domain, indexed by key, DN and address
//! - OPATH-style recipient filter evaluation for dynamic groups
//! - Fault injection and per-key call accounting
//! - JSON fixture loading
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             groupwalk-directory              │
//! ├─────────────────────────────────────────────┤
//! │  entry.rs   - Stored object definition      │
//! │  memory.rs  - MemoryDirectory               │
//! │  filter/    - Recipient filter parse/match  │
//! │  fixture.rs - JSON fixture loading          │
//! └─────────────────────────────────────────────┘
//! ```

pub mod entry;
pub mod error;
pub mod filter;
pub mod fixture;
pub mod memory;

// Re-export commonly used types
pub use entry::DirectoryEntry;
pub use error::{DirectoryError, DirectoryResult};
pub use fixture::Fixture;
pub use memory::{Fault, MemoryDirectory};
