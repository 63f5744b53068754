//! Membership traversal engine.
//!
//! Walks the membership graph of one root group at a time, discovering
//! children lazily through a [`DirectoryClient`]. Two disciplines share the
//! same visited-set and directory plumbing:
//!
//! - **Flat**: recursive depth-first expansion; each reachable user is
//!   returned once, tagged with the first group path that listed it. With a
//!   depth bound the walk goes level by level instead, so every group is
//!   first reached at its shortest distance from the root.
//! - **Expanded**: level-by-level breadth traversal bounded by
//!   `levels_deep_to_go`; every edge is returned, later sightings of a
//!   member marked `RedundantlyNested`.
//!
//! # Design
//!
//! - **At-most-once expansion**: a group is marked visited (atomic
//!   check-and-insert) before its children are expanded. Marking after the
//!   recursive call would let a group that nests itself re-enter.
//! - **Bounded fan-out**: sibling expansions run through `buffer_unordered`
//!   and every directory call holds a semaphore permit, so the number of
//!   calls in flight never exceeds `max_concurrency`.
//! - **Partial results**: cancellation, timeout and halting directory
//!   failures return what was gathered so far, marked `Incomplete` with the
//!   last-known frontier.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, debug_span, info, instrument, Instrument};

use crate::error::{DomainError, DomainResult};
use crate::model::{DirectoryObjectRef, MembershipEdge, MembershipKind};

use super::config::TraversalConfig;
use super::context::{GroupPath, TraversalContext};
use super::traits::DirectoryClient;
use super::types::{
    ExpandedResult, FlatResult, PendingExpansion, TraversalMode, TraversalOptions, TraversalResult,
};

/// Counters for one traversal.
#[derive(Debug, Default)]
pub struct TraversalStats {
    /// Number of list/evaluate calls issued to the directory.
    pub directory_calls: AtomicU64,
    /// Number of groups whose members were fully read.
    pub groups_expanded: AtomicU64,
    /// Number of member entries read across all groups.
    pub members_seen: AtomicU64,
    /// Back-references to a group on the current discovery path.
    pub cycles_detected: AtomicU64,
    /// Groups skipped because another path already expanded them.
    pub revisits_skipped: AtomicU64,
    /// Nested groups that could not be resolved or routed.
    pub branches_skipped: AtomicU64,
}

impl TraversalStats {
    /// Returns a snapshot of the current counters.
    pub fn snapshot(&self) -> TraversalStatsSnapshot {
        TraversalStatsSnapshot {
            directory_calls: self.directory_calls.load(Ordering::Relaxed),
            groups_expanded: self.groups_expanded.load(Ordering::Relaxed),
            members_seen: self.members_seen.load(Ordering::Relaxed),
            cycles_detected: self.cycles_detected.load(Ordering::Relaxed),
            revisits_skipped: self.revisits_skipped.load(Ordering::Relaxed),
            branches_skipped: self.branches_skipped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_directory_call(&self) {
        self.directory_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_group_expanded(&self) {
        self.groups_expanded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_member(&self) {
        self.members_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cycle(&self) {
        self.cycles_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_revisit(&self) {
        self.revisits_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_branch_skipped(&self) {
        self.branches_skipped.fetch_add(1, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of traversal counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TraversalStatsSnapshot {
    pub directory_calls: u64,
    pub groups_expanded: u64,
    pub members_seen: u64,
    pub cycles_detected: u64,
    pub revisits_skipped: u64,
    pub branches_skipped: u64,
}

/// Type alias for boxed future to handle async recursion.
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Marker returned up the recursion once the traversal has been halted.
/// The reason itself is recorded in the context.
#[derive(Debug)]
struct Halted;

/// Recursive membership expansion over a directory.
pub struct TraversalEngine<D> {
    directory: Arc<D>,
    config: TraversalConfig,
}

impl<D> TraversalEngine<D>
where
    D: DirectoryClient + 'static,
{
    /// Creates a new engine with the default configuration.
    pub fn new(directory: Arc<D>) -> Self {
        Self {
            directory,
            config: TraversalConfig::default(),
        }
    }

    /// Creates a new engine with custom configuration.
    pub fn with_config(directory: Arc<D>, config: TraversalConfig) -> Self {
        Self { directory, config }
    }

    pub fn config(&self) -> &TraversalConfig {
        &self.config
    }

    /// Traverses one root in the mode selected by `options`.
    pub async fn traverse(
        &self,
        root: &str,
        options: &TraversalOptions,
    ) -> DomainResult<TraversalResult> {
        match options.mode {
            TraversalMode::Flat => self.expand_flat(root, options).await.map(TraversalResult::Flat),
            TraversalMode::Expanded => self
                .expand_levels(root, options)
                .await
                .map(TraversalResult::Expanded),
        }
    }

    /// Traverses several roots, each with its own visited set.
    ///
    /// A root that fails does not prevent the others from running.
    pub async fn traverse_batch<S>(
        &self,
        roots: &[S],
        options: &TraversalOptions,
    ) -> Vec<(String, DomainResult<TraversalResult>)>
    where
        S: AsRef<str>,
    {
        let mut results = Vec::with_capacity(roots.len());
        for root in roots {
            let root = root.as_ref();
            results.push((root.to_string(), self.traverse(root, options).await));
        }
        results
    }

    /// Flat mode: every distinct user reachable from `root`, once.
    #[instrument(skip(self, options), fields(levels = ?options.levels_deep_to_go))]
    pub async fn expand_flat(&self, root: &str, options: &TraversalOptions) -> DomainResult<FlatResult> {
        options.validate()?;
        let ctx = TraversalContext::new(&self.config, options);
        let root = self.resolve_root(&ctx, root).await?;
        let max_depth = options.effective_levels();
        let level = options.starting_level;

        ctx.tracker.mark(&root.key);
        ctx.start_expansion(&root, level);
        let path = GroupPath::root(root.clone());

        match max_depth {
            Some(max_depth) => {
                self.expand_flat_by_level(&ctx, path, level, max_depth)
                    .await?
            }
            // Resolution failures on the root fail the call; nested ones are skipped.
            None => match ctx.fetch_members(&*self.directory, &root).await {
                Ok(members) => {
                    ctx.finish_expansion(&root);
                    let _ = self.process_flat_members(&ctx, &path, level, members).await;
                }
                Err(e) if e.is_branch_recoverable() => return Err(e),
                Err(_) => {}
            },
        }

        let pending = ctx.pending_expansions();
        let completion = ctx.completion(pending);
        let result = FlatResult {
            root,
            depth_limit_reached: ctx.depth_limit_reached.load(Ordering::Relaxed),
            completion,
            skipped: ctx.take_skipped(),
            stats: ctx.stats.snapshot(),
            members: ctx.leaves.into_members(),
        };
        info!(
            root = %result.root.key,
            members = result.members.len(),
            complete = result.completion.is_complete(),
            directory_calls = result.stats.directory_calls,
            "Flat traversal finished"
        );
        Ok(result)
    }

    /// Expands one nested group and its descendants.
    fn expand_flat_group<'a>(
        &'a self,
        ctx: &'a TraversalContext,
        path: Arc<GroupPath>,
        level: u32,
    ) -> BoxFuture<'a, Result<(), Halted>> {
        let span = debug_span!("expand_group", group = %path.group.key, level);
        Box::pin(
            async move {
                let members = match ctx.fetch_members(&*self.directory, &path.group).await {
                    Ok(members) => members,
                    Err(e) if e.is_branch_recoverable() => {
                        ctx.skip_branch(&path.group, e);
                        return Ok(());
                    }
                    Err(_) => return Err(Halted),
                };
                ctx.finish_expansion(&path.group);
                self.process_flat_members(ctx, &path, level, members).await
            }
            .instrument(span),
        )
    }

    /// Records the users of one listing and expands its unvisited groups.
    async fn process_flat_members(
        &self,
        ctx: &TraversalContext,
        path: &Arc<GroupPath>,
        level: u32,
        members: Vec<DirectoryObjectRef>,
    ) -> Result<(), Halted> {
        let mut children = Vec::new();
        for member in members {
            ctx.stats.record_member();
            if !member.is_group() {
                ctx.leaves.record(member, level, || path.to_vec());
                continue;
            }
            if path.contains(&member.key) {
                debug!(group = %member.key, parent = %path.group.key, "Cycle detected");
                ctx.stats.record_cycle();
                continue;
            }
            if ctx.tracker.is_visited(&member.key) {
                ctx.stats.record_revisit();
                continue;
            }
            if !ctx.tracker.mark(&member.key) {
                ctx.stats.record_revisit();
                continue;
            }
            ctx.start_expansion(&member, level + 1);
            children.push(path.child(member));
        }

        let mut expansions = stream::iter(children)
            .map(|child| self.expand_flat_group(ctx, child, level + 1))
            .buffer_unordered(ctx.fan_out);
        while let Some(outcome) = expansions.next().await {
            outcome?;
        }
        Ok(())
    }

    /// Bounded flat mode, one level at a time.
    ///
    /// Breadth order guarantees a group is marked at its shortest distance,
    /// so a long path reaching it first cannot hide members that lie within
    /// the bound. Only root resolution failures are returned as errors.
    async fn expand_flat_by_level(
        &self,
        ctx: &TraversalContext,
        root: Arc<GroupPath>,
        starting_level: u32,
        max_depth: u32,
    ) -> DomainResult<()> {
        let mut level = starting_level;
        let mut frontier = vec![root];

        while !frontier.is_empty() {
            let mut fetched: Vec<(usize, DomainResult<Vec<DirectoryObjectRef>>)> =
                stream::iter(frontier.iter().enumerate())
                    .map(|(idx, path)| {
                        let directory = &*self.directory;
                        async move { (idx, ctx.fetch_members(directory, &path.group).await) }
                    })
                    .buffer_unordered(ctx.fan_out)
                    .collect()
                    .await;
            fetched.sort_by_key(|(idx, _)| *idx);

            let mut next = Vec::new();
            for (idx, result) in fetched {
                let path = &frontier[idx];
                let members = match result {
                    Ok(members) => members,
                    Err(e) if level == starting_level && e.is_branch_recoverable() => {
                        return Err(e)
                    }
                    Err(e) if e.is_branch_recoverable() => {
                        ctx.skip_branch(&path.group, e);
                        continue;
                    }
                    // Halted; unfinished groups stay in the pending set.
                    Err(_) => return Ok(()),
                };
                ctx.finish_expansion(&path.group);

                for member in members {
                    ctx.stats.record_member();
                    if !member.is_group() {
                        ctx.leaves.record(member, level, || path.to_vec());
                        continue;
                    }
                    if path.contains(&member.key) {
                        debug!(group = %member.key, parent = %path.group.key, "Cycle detected");
                        ctx.stats.record_cycle();
                        continue;
                    }
                    if level + 1 > max_depth {
                        if !ctx.tracker.is_visited(&member.key) {
                            ctx.note_depth_limit();
                        }
                        continue;
                    }
                    if !ctx.tracker.mark(&member.key) {
                        ctx.stats.record_revisit();
                        continue;
                    }
                    ctx.start_expansion(&member, level + 1);
                    next.push(path.child(member));
                }
            }

            frontier = next;
            level += 1;
        }
        Ok(())
    }

    /// Expanded mode: every edge down to `levels_deep_to_go`.
    #[instrument(skip(self, options), fields(levels = ?options.effective_levels(), start = options.starting_level))]
    pub async fn expand_levels(
        &self,
        root: &str,
        options: &TraversalOptions,
    ) -> DomainResult<ExpandedResult> {
        options.validate()?;
        let ctx = TraversalContext::new(&self.config, options);
        let root = self.resolve_root(&ctx, root).await?;
        let bound = options
            .effective_levels()
            .unwrap_or(super::config::DEFAULT_LEVELS_DEEP_TO_GO);

        let mut level = options.starting_level;
        let mut frontier = vec![GroupPath::root(root.clone())];
        let mut emitted: HashSet<String> = HashSet::new();
        let mut edges = Vec::new();
        let mut unexpanded_frontier = Vec::new();
        let mut resume_level = None;
        let mut pending = Vec::new();
        let mut at_root = true;

        'levels: while !frontier.is_empty() {
            if level > bound {
                debug!(level, remaining = frontier.len(), "Depth bound reached");
                unexpanded_frontier = frontier.iter().map(|p| p.group.clone()).collect();
                resume_level = Some(level);
                break;
            }

            let batch: Vec<Arc<GroupPath>> = frontier
                .drain(..)
                .filter(|p| {
                    let fresh = ctx.tracker.mark(&p.group.key);
                    if !fresh {
                        ctx.stats.record_revisit();
                    }
                    fresh
                })
                .collect();

            let mut fetched: Vec<(usize, DomainResult<Vec<DirectoryObjectRef>>)> =
                stream::iter(batch.iter().enumerate())
                    .map(|(idx, path)| {
                        let ctx = &ctx;
                        let directory = &*self.directory;
                        async move { (idx, ctx.fetch_members(directory, &path.group).await) }
                    })
                    .buffer_unordered(ctx.fan_out)
                    .collect()
                    .await;
            fetched.sort_by_key(|(idx, _)| *idx);

            let mut next = Vec::new();
            for (idx, result) in fetched {
                let parent = &batch[idx];
                let members = match result {
                    Ok(members) => members,
                    Err(e) if at_root && e.is_branch_recoverable() => return Err(e),
                    Err(e) if e.is_branch_recoverable() => {
                        ctx.skip_branch(&parent.group, e);
                        continue;
                    }
                    Err(_) => {
                        pending.extend(batch[idx..].iter().map(|p| PendingExpansion {
                            group: p.group.clone(),
                            level,
                        }));
                        pending.extend(next.iter().map(|p: &Arc<GroupPath>| PendingExpansion {
                            group: p.group.clone(),
                            level: level + 1,
                        }));
                        break 'levels;
                    }
                };
                ctx.stats.record_group_expanded();

                for member in members {
                    ctx.stats.record_member();
                    if member.is_group() && parent.contains(&member.key) {
                        debug!(group = %member.key, parent = %parent.group.key, "Cycle detected");
                        ctx.stats.record_cycle();
                        continue;
                    }
                    let kind = if !emitted.insert(member.key.clone()) {
                        MembershipKind::RedundantlyNested
                    } else if level == 1 {
                        MembershipKind::Direct
                    } else {
                        MembershipKind::Nested
                    };
                    if kind != MembershipKind::RedundantlyNested && member.is_group() {
                        next.push(parent.child(member.clone()));
                    }
                    edges.push(MembershipEdge {
                        parent_group: parent.group.clone(),
                        member,
                        level,
                        kind,
                    });
                }
            }

            at_root = false;
            frontier = next;
            level += 1;
        }

        let result = ExpandedResult {
            root,
            edges,
            unexpanded_frontier,
            resume_level,
            completion: ctx.completion(pending),
            skipped: ctx.take_skipped(),
            stats: ctx.stats.snapshot(),
        };
        info!(
            root = %result.root.key,
            edges = result.edges.len(),
            complete = result.completion.is_complete(),
            directory_calls = result.stats.directory_calls,
            "Expanded traversal finished"
        );
        Ok(result)
    }

    /// Resolves the root identifier; the root must be a group.
    async fn resolve_root(
        &self,
        ctx: &TraversalContext,
        identifier: &str,
    ) -> DomainResult<DirectoryObjectRef> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(DomainError::InvalidRequest {
                message: "root identifier cannot be empty".to_string(),
            });
        }
        let root = ctx
            .interruptible(self.directory.resolve_group(identifier))
            .await?;
        if !root.is_group() {
            return Err(DomainError::InvalidRequest {
                message: format!("root '{identifier}' is not a group"),
            });
        }
        debug!(root = %root.key, dn = %root.distinguished_name, kind = %root.kind, "Resolved root");
        Ok(root)
    }
}
