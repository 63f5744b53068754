//! In-memory directory implementation.
//!
//! Objects are partitioned by the domain derived from their distinguished
//! name, mirroring a forest where each domain controller only holds its own
//! partition: listing a group through a routing hint for another domain
//! fails with `NotFound`.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream;
use groupwalk_domain::routing::{is_within_container, normalize_dn};
use groupwalk_domain::{
    route_for, DirectoryClient, DirectoryObjectRef, DomainError, DomainResult, MemberStream,
    ObjectKind, RoutingHint,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::entry::DirectoryEntry;
use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::parse_filter;

/// Failure injected into listing calls for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fault {
    Unavailable,
    Unauthorized,
}

impl Fault {
    fn to_error(self, group: &DirectoryObjectRef) -> DomainError {
        match self {
            Fault::Unavailable => DomainError::Unavailable {
                message: format!("server for '{}' is not responding", group.distinguished_name),
            },
            Fault::Unauthorized => DomainError::Unauthorized {
                message: format!("access to '{}' denied", group.distinguished_name),
            },
        }
    }
}

#[derive(Debug)]
struct StoredObject {
    /// Insertion order, used to keep filter results stable.
    seq: u64,
    domain: String,
    entry: DirectoryEntry,
}

/// In-memory implementation of [`DirectoryClient`].
///
/// # Indexes
///
/// - **Key**: case-insensitive object key (GUID)
/// - **DN**: normalized distinguished name
/// - **Address**: case-insensitive primary address; several objects may
///   share one, which makes it ambiguous as a root identifier
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    objects: DashMap<String, Arc<StoredObject>>,
    by_dn: DashMap<String, String>,
    by_address: DashMap<String, Vec<String>>,
    partitions: DashMap<String, Vec<String>>,
    sequence: AtomicU64,
    faults: DashMap<String, Fault>,
    calls: DashMap<String, u64>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty directory wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Adds an object.
    ///
    /// Fails when the key or DN is already taken, when the DN cannot be
    /// routed to a domain, or when a dynamic group carries no valid filter.
    /// Member references are not checked; unknown members surface as
    /// per-item `NotFound` when the group is listed.
    pub fn insert(&self, entry: DirectoryEntry) -> DirectoryResult<()> {
        let key = entry.key().to_ascii_lowercase();
        let hint = route_for(&entry.object.distinguished_name).map_err(|e| {
            DirectoryError::InvalidObject {
                key: entry.key().to_string(),
                message: e.to_string(),
            }
        })?;
        if entry.kind() == ObjectKind::DynamicGroup {
            let filter = entry.object.membership_filter.as_ref().ok_or_else(|| {
                DirectoryError::InvalidObject {
                    key: entry.key().to_string(),
                    message: "dynamic group has no membership filter".to_string(),
                }
            })?;
            parse_filter(&filter.filter)?;
        }

        let dn = normalize_dn(&entry.object.distinguished_name);
        match self.by_dn.entry(dn.clone()) {
            Entry::Occupied(_) => {
                return Err(DirectoryError::DuplicateObject {
                    identifier: entry.object.distinguished_name.clone(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(key.clone());
            }
        }

        let address = entry
            .object
            .primary_address
            .as_ref()
            .map(|a| a.to_ascii_lowercase());
        match self.objects.entry(key.clone()) {
            Entry::Occupied(_) => {
                self.by_dn.remove(&dn);
                return Err(DirectoryError::DuplicateObject {
                    identifier: entry.key().to_string(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(StoredObject {
                    seq: self.sequence.fetch_add(1, Ordering::Relaxed),
                    domain: hint.domain.clone(),
                    entry,
                }));
            }
        }

        if let Some(address) = address {
            self.by_address.entry(address).or_default().push(key.clone());
        }
        self.partitions.entry(hint.domain).or_default().push(key);
        Ok(())
    }

    /// Makes listing the group `key` fail with `fault`.
    pub fn inject_fault(&self, key: &str, fault: Fault) {
        self.faults.insert(key.to_ascii_lowercase(), fault);
    }

    pub fn clear_fault(&self, key: &str) {
        self.faults.remove(&key.to_ascii_lowercase());
    }

    /// Number of list calls for the group `key`, or evaluation calls for the
    /// filter text `key`.
    pub fn calls_for(&self, key: &str) -> u64 {
        self.calls
            .get(&key.to_ascii_lowercase())
            .map_or(0, |count| *count)
    }

    pub fn total_calls(&self) -> u64 {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }

    pub fn reset_calls(&self) {
        self.calls.clear();
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Domains that hold at least one object, sorted.
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.partitions.iter().map(|e| e.key().clone()).collect();
        domains.sort();
        domains
    }

    /// Looks up an object by key or DN.
    pub fn get(&self, identifier: &str) -> Option<DirectoryObjectRef> {
        self.lookup_reference(identifier)
            .map(|stored| stored.entry.object.clone())
    }

    fn lookup_reference(&self, reference: &str) -> Option<Arc<StoredObject>> {
        if let Some(stored) = self.objects.get(&reference.to_ascii_lowercase()) {
            return Some(Arc::clone(stored.value()));
        }
        let key = self.by_dn.get(&normalize_dn(reference))?.value().clone();
        self.objects.get(&key).map(|stored| Arc::clone(stored.value()))
    }

    fn record_call(&self, key: &str) {
        *self.calls.entry(key.to_ascii_lowercase()).or_default() += 1;
    }

    /// Fault injected on a dynamic group using `filter` in `scope`.
    fn dynamic_fault(&self, filter: &str, scope: &str) -> Option<(Fault, DirectoryObjectRef)> {
        self.objects.iter().find_map(|stored| {
            let object = &stored.entry.object;
            let stored_filter = object.membership_filter.as_ref()?;
            if stored_filter.filter != filter {
                return None;
            }
            let stored_scope = stored_filter.scope_container.as_deref();
            if stored_scope.is_some_and(|s| normalize_dn(s) != normalize_dn(scope)) {
                return None;
            }
            let fault = *self.faults.get(stored.key())?;
            Some((fault, object.clone()))
        })
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    #[instrument(skip(self))]
    async fn resolve_group(&self, identifier: &str) -> DomainResult<DirectoryObjectRef> {
        let lowered = identifier.trim().to_ascii_lowercase();
        let mut matches = BTreeSet::new();
        if self.objects.contains_key(&lowered) {
            matches.insert(lowered.clone());
        }
        if let Some(key) = self.by_dn.get(&normalize_dn(identifier)) {
            matches.insert(key.value().clone());
        }
        if let Some(keys) = self.by_address.get(&lowered) {
            matches.extend(keys.value().iter().cloned());
        }

        let mut matches = matches.into_iter();
        match (matches.next(), matches.len()) {
            (None, _) => Err(DomainError::NotFound {
                identifier: identifier.to_string(),
            }),
            (Some(key), 0) => self
                .objects
                .get(&key)
                .map(|stored| stored.entry.object.clone())
                .ok_or_else(|| DomainError::NotFound {
                    identifier: identifier.to_string(),
                }),
            (Some(_), others) => Err(DomainError::Ambiguous {
                identifier: identifier.to_string(),
                matches: others + 1,
            }),
        }
    }

    #[instrument(skip(self, group), fields(group = %group.key, domain = %hint))]
    async fn list_direct_members(
        &self,
        group: &DirectoryObjectRef,
        hint: &RoutingHint,
    ) -> DomainResult<MemberStream> {
        self.record_call(&group.key);
        if let Some(fault) = self.faults.get(&group.key.to_ascii_lowercase()) {
            return Err(fault.to_error(group));
        }

        let stored = self
            .objects
            .get(&group.key.to_ascii_lowercase())
            .map(|stored| Arc::clone(stored.value()))
            .ok_or_else(|| DomainError::NotFound {
                identifier: group.distinguished_name.clone(),
            })?;
        if !hint.targets(&stored.domain) {
            debug!(held_by = %stored.domain, "Partition not held by routed domain");
            return Err(DomainError::NotFound {
                identifier: group.distinguished_name.clone(),
            });
        }
        if stored.entry.kind() != ObjectKind::StaticGroup {
            return Err(DomainError::InvalidRequest {
                message: format!(
                    "'{}' is a {}, not a static group",
                    group.distinguished_name,
                    stored.entry.kind()
                ),
            });
        }

        let items: Vec<DomainResult<DirectoryObjectRef>> = stored
            .entry
            .members
            .iter()
            .map(|reference| {
                self.get(reference).ok_or_else(|| DomainError::NotFound {
                    identifier: reference.clone(),
                })
            })
            .collect();
        debug!(members = items.len(), "Listed direct members");
        Ok(Box::pin(stream::iter(items)))
    }

    #[instrument(skip(self, hint), fields(domain = %hint))]
    async fn evaluate_dynamic_membership(
        &self,
        filter: &str,
        scope_container: &str,
        hint: &RoutingHint,
    ) -> DomainResult<MemberStream> {
        self.record_call(filter);
        if let Some((fault, group)) = self.dynamic_fault(filter, scope_container) {
            return Err(fault.to_error(&group));
        }
        let parsed = parse_filter(filter)?;

        let mut matched: Vec<Arc<StoredObject>> = self
            .objects
            .iter()
            .filter(|stored| {
                is_within_container(&stored.entry.object.distinguished_name, scope_container)
                    && parsed.matches(&stored.entry)
            })
            .map(|stored| Arc::clone(stored.value()))
            .collect();
        matched.sort_by_key(|stored| stored.seq);

        debug!(matches = matched.len(), "Evaluated recipient filter");
        let items: Vec<DomainResult<DirectoryObjectRef>> = matched
            .into_iter()
            .map(|stored| Ok(stored.entry.object.clone()))
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }
}
