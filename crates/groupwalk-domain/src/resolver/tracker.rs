//! Visited-set and leaf deduplication shared by both traversal disciplines.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use crate::model::DirectoryObjectRef;

use super::types::FlatMember;

/// Traversal-scoped record of expanded groups.
///
/// `mark` is a single atomic check-and-insert, so concurrent expanders racing
/// on the same group agree on exactly one winner. A group key is marked
/// before any of its children are expanded.
#[derive(Debug, Default)]
pub struct VisitedTracker {
    visited: DashSet<String>,
}

impl VisitedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a group as visited. Returns true if this call marked it.
    pub fn mark(&self, key: &str) -> bool {
        self.visited.insert(key.to_string())
    }

    pub fn is_visited(&self, key: &str) -> bool {
        self.visited.contains(key)
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}

/// First-writer-wins collection of users reached in flat mode.
#[derive(Debug, Default)]
pub(crate) struct LeafLedger {
    leaves: DashMap<String, (u64, FlatMember)>,
    sequence: AtomicU64,
}

impl LeafLedger {
    /// Records `member` unless it was already recorded. The path is only
    /// built for the first discovery. Returns true if the member was new.
    pub(crate) fn record(
        &self,
        member: DirectoryObjectRef,
        level: u32,
        path: impl FnOnce() -> Vec<DirectoryObjectRef>,
    ) -> bool {
        match self.leaves.entry(member.key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                let order = self.sequence.fetch_add(1, Ordering::Relaxed);
                entry.insert((
                    order,
                    FlatMember {
                        member,
                        path: path(),
                        level,
                    },
                ));
                true
            }
        }
    }

    /// Drains the ledger in discovery order.
    pub(crate) fn into_members(self) -> Vec<FlatMember> {
        let mut members: Vec<(u64, FlatMember)> = self.leaves.into_iter().map(|(_, v)| v).collect();
        members.sort_by_key(|(order, _)| *order);
        members.into_iter().map(|(_, member)| member).collect()
    }
}
