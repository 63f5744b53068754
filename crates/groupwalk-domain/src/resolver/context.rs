//! Internal traversal context shared by every expansion of one root.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{DomainError, DomainResult};
use crate::model::{DirectoryObjectRef, ObjectKind};
use crate::routing::route_for;

use super::config::TraversalConfig;
use super::engine::TraversalStats;
use super::tracker::{LeafLedger, VisitedTracker};
use super::traits::DirectoryClient;
use super::types::{Completion, IncompleteReason, PendingExpansion, SkippedBranch, TraversalOptions};

/// Chain of groups from the root to the group being expanded.
///
/// Shared through `Arc` so children extend the chain without copying it.
#[derive(Debug)]
pub(crate) struct GroupPath {
    pub(crate) group: DirectoryObjectRef,
    parent: Option<Arc<GroupPath>>,
}

impl GroupPath {
    pub(crate) fn root(group: DirectoryObjectRef) -> Arc<Self> {
        Arc::new(Self {
            group,
            parent: None,
        })
    }

    pub(crate) fn child(self: &Arc<Self>, group: DirectoryObjectRef) -> Arc<Self> {
        Arc::new(Self {
            group,
            parent: Some(Arc::clone(self)),
        })
    }

    /// True when `key` is this group or one of its ancestors.
    pub(crate) fn contains(&self, key: &str) -> bool {
        let mut node = Some(self);
        while let Some(current) = node {
            if current.group.key == key {
                return true;
            }
            node = current.parent.as_deref();
        }
        false
    }

    /// Groups from the root down to this one.
    pub(crate) fn to_vec(&self) -> Vec<DirectoryObjectRef> {
        let mut groups = Vec::new();
        let mut node = Some(self);
        while let Some(current) = node {
            groups.push(current.group.clone());
            node = current.parent.as_deref();
        }
        groups.reverse();
        groups
    }
}

/// State owned by one top-level traversal.
///
/// Created per root and dropped when the traversal returns; nothing here is
/// shared between roots.
pub(crate) struct TraversalContext {
    pub(crate) tracker: VisitedTracker,
    pub(crate) leaves: LeafLedger,
    pub(crate) stats: TraversalStats,
    pub(crate) depth_limit_reached: AtomicBool,
    pub(crate) fan_out: usize,
    permits: Semaphore,
    cancellation: CancellationToken,
    deadline: Option<(Instant, Duration)>,
    halt: OnceLock<IncompleteReason>,
    skipped: Mutex<Vec<SkippedBranch>>,
    in_flight: DashMap<String, PendingExpansion>,
}

impl TraversalContext {
    pub(crate) fn new(config: &TraversalConfig, options: &TraversalOptions) -> Self {
        let fan_out = config.max_concurrency.max(1);
        Self {
            tracker: VisitedTracker::new(),
            leaves: LeafLedger::default(),
            stats: TraversalStats::default(),
            depth_limit_reached: AtomicBool::new(false),
            fan_out,
            permits: Semaphore::new(fan_out),
            // Child token: halting this traversal must not cancel the caller.
            cancellation: options.cancellation.child_token(),
            deadline: config.timeout.map(|t| (Instant::now() + t, t)),
            halt: OnceLock::new(),
            skipped: Mutex::new(Vec::new()),
            in_flight: DashMap::new(),
        }
    }

    /// Runs a directory operation, racing it against cancellation and the
    /// traversal deadline.
    pub(crate) async fn interruptible<T, F>(&self, operation: F) -> DomainResult<T>
    where
        F: Future<Output = DomainResult<T>>,
    {
        let deadline = async {
            match self.deadline {
                Some((at, _)) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(DomainError::Cancelled),
            _ = deadline => Err(self.timeout_error()),
            result = operation => result,
        }
    }

    /// Lists the members of `group`, via filter evaluation for dynamic groups.
    ///
    /// The whole stream is drained while holding one concurrency permit.
    /// Recoverable per-item failures skip the item; any halting failure
    /// stops the traversal before being returned.
    pub(crate) async fn fetch_members<D>(
        &self,
        directory: &D,
        group: &DirectoryObjectRef,
    ) -> DomainResult<Vec<DirectoryObjectRef>>
    where
        D: DirectoryClient + ?Sized,
    {
        let result = self
            .interruptible(async {
                let hint = route_for(&group.distinguished_name)?;
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| DomainError::Cancelled)?;
                self.stats.record_directory_call();

                let mut stream = match group.kind {
                    ObjectKind::DynamicGroup => {
                        let filter = group.membership_filter.as_ref().ok_or_else(|| {
                            DomainError::malformed(
                                &group.distinguished_name,
                                "dynamic group has no membership filter",
                            )
                        })?;
                        let scope = filter
                            .scope_container
                            .as_deref()
                            .unwrap_or(hint.naming_context.as_str());
                        debug!(group = %group.key, domain = %hint, scope, "Evaluating dynamic membership");
                        directory
                            .evaluate_dynamic_membership(&filter.filter, scope, &hint)
                            .await?
                    }
                    ObjectKind::StaticGroup => {
                        debug!(group = %group.key, domain = %hint, "Listing direct members");
                        directory.list_direct_members(group, &hint).await?
                    }
                    ObjectKind::User => {
                        return Err(DomainError::InvalidRequest {
                            message: format!("'{}' is a user, not a group", group.distinguished_name),
                        })
                    }
                };

                let mut members = Vec::new();
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(member) => members.push(member),
                        Err(e) if e.is_branch_recoverable() => {
                            warn!(group = %group.key, error = %e, "Skipping unresolvable member");
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(members)
            })
            .await;

        if let Err(e) = &result {
            if !e.is_branch_recoverable() {
                self.halt_on(group, e);
            }
        }
        result
    }

    /// Records the reason the traversal stops and cancels outstanding work.
    /// Only the first reason is kept.
    pub(crate) fn halt_on(&self, group: &DirectoryObjectRef, error: &DomainError) {
        let reason = match error {
            DomainError::Cancelled => IncompleteReason::Cancelled,
            DomainError::Timeout { duration_ms } => IncompleteReason::TimedOut {
                duration_ms: *duration_ms,
            },
            other => IncompleteReason::Failed {
                group: group.clone(),
                error: other.clone(),
            },
        };
        if self.halt.set(reason).is_ok() {
            warn!(group = %group.key, error = %error, "Halting traversal");
        }
        self.cancellation.cancel();
    }

    /// Records a nested branch that could not be expanded.
    pub(crate) fn skip_branch(&self, group: &DirectoryObjectRef, error: DomainError) {
        warn!(group = %group.key, dn = %group.distinguished_name, error = %error, "Skipping branch");
        self.stats.record_branch_skipped();
        self.in_flight.remove(&group.key);
        self.skipped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SkippedBranch {
                group: group.clone(),
                error,
            });
    }

    pub(crate) fn start_expansion(&self, group: &DirectoryObjectRef, level: u32) {
        self.in_flight.insert(
            group.key.clone(),
            PendingExpansion {
                group: group.clone(),
                level,
            },
        );
    }

    pub(crate) fn finish_expansion(&self, group: &DirectoryObjectRef) {
        self.in_flight.remove(&group.key);
        self.stats.record_group_expanded();
    }

    /// Groups marked for expansion that never finished, shallowest first.
    pub(crate) fn pending_expansions(&self) -> Vec<PendingExpansion> {
        let mut pending: Vec<PendingExpansion> =
            self.in_flight.iter().map(|entry| entry.value().clone()).collect();
        pending.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.group.key.cmp(&b.group.key)));
        pending
    }

    pub(crate) fn completion(&self, pending: Vec<PendingExpansion>) -> Completion {
        match self.halt.get() {
            None => Completion::Complete,
            Some(reason) => Completion::Incomplete {
                reason: reason.clone(),
                pending,
            },
        }
    }

    pub(crate) fn take_skipped(&self) -> Vec<SkippedBranch> {
        std::mem::take(&mut *self.skipped.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn note_depth_limit(&self) {
        self.depth_limit_reached.store(true, Ordering::Relaxed);
    }

    fn timeout_error(&self) -> DomainError {
        DomainError::Timeout {
            duration_ms: self
                .deadline
                .map_or(0, |(_, duration)| duration.as_millis() as u64),
        }
    }
}
