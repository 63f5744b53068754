//! Tests for the traversal engine.
//!
//! Organized by discipline:
//! - Flat expansion (deduplication, cycles, dynamic groups, routing)
//! - Expanded expansion (edge classification, depth bound, resume)
//! - Failure handling (skipped branches, halting errors, cancellation, timeout)
//! - Property tests over random membership graphs
