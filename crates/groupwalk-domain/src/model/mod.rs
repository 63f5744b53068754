//! Directory object and membership edge types.
//!
//! This module contains:
//! - Directory object references (users, static groups, dynamic groups)
//! - Membership edges and their classification

mod types;

pub use types::*;
