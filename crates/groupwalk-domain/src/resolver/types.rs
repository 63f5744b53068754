//! Request and result types for the traversal engine.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{DomainError, DomainResult};
use crate::model::{DirectoryObjectRef, MembershipEdge};

use super::config::DEFAULT_LEVELS_DEEP_TO_GO;
use super::engine::TraversalStatsSnapshot;

/// Traversal discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalMode {
    /// Depth-first expansion returning each reachable user once.
    Flat,
    /// Level-bounded breadth traversal returning every discovered edge.
    Expanded,
}

/// Per-invocation traversal options.
#[derive(Debug, Clone)]
pub struct TraversalOptions {
    pub mode: TraversalMode,
    /// Deepest level to expand. `None` means unbounded in flat mode and
    /// [`DEFAULT_LEVELS_DEEP_TO_GO`] in expanded mode.
    pub levels_deep_to_go: Option<u32>,
    /// Level assigned to the root's direct members. Values above 1 resume a
    /// previously interrupted run from one of its frontier groups.
    pub starting_level: u32,
    /// Cooperative cancellation signal shared with the caller.
    pub cancellation: CancellationToken,
}

impl TraversalOptions {
    pub fn flat() -> Self {
        Self {
            mode: TraversalMode::Flat,
            levels_deep_to_go: None,
            starting_level: 1,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn expanded() -> Self {
        Self {
            mode: TraversalMode::Expanded,
            ..Self::flat()
        }
    }

    pub fn with_levels_deep_to_go(mut self, levels: u32) -> Self {
        self.levels_deep_to_go = Some(levels);
        self
    }

    pub fn with_starting_level(mut self, level: u32) -> Self {
        self.starting_level = level;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The depth bound actually applied, if any.
    pub fn effective_levels(&self) -> Option<u32> {
        match self.mode {
            TraversalMode::Flat => self.levels_deep_to_go,
            TraversalMode::Expanded => {
                Some(self.levels_deep_to_go.unwrap_or(DEFAULT_LEVELS_DEEP_TO_GO))
            }
        }
    }

    pub(crate) fn validate(&self) -> DomainResult<()> {
        if self.starting_level == 0 {
            return Err(DomainError::InvalidRequest {
                message: "starting level must be at least 1".to_string(),
            });
        }
        if self.levels_deep_to_go == Some(0) {
            return Err(DomainError::InvalidRequest {
                message: "levels_deep_to_go must be at least 1".to_string(),
            });
        }
        if let Some(levels) = self.effective_levels() {
            if self.starting_level > levels {
                return Err(DomainError::InvalidRequest {
                    message: format!(
                        "starting level {} exceeds levels_deep_to_go {}",
                        self.starting_level, levels
                    ),
                });
            }
        }
        Ok(())
    }
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self::flat()
    }
}

/// A user reached in flat mode.
#[derive(Debug, Clone, Serialize)]
pub struct FlatMember {
    pub member: DirectoryObjectRef,
    /// Group chain from the root to the group that first listed the member.
    pub path: Vec<DirectoryObjectRef>,
    /// Level at which the member was first discovered.
    pub level: u32,
}

impl FlatMember {
    /// The group whose listing first produced this member.
    pub fn discovered_via(&self) -> Option<&DirectoryObjectRef> {
        self.path.last()
    }
}

/// A nested branch that could not be expanded.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedBranch {
    pub group: DirectoryObjectRef,
    #[serde(serialize_with = "serialize_error")]
    pub error: DomainError,
}

/// A group that was scheduled for expansion but not expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingExpansion {
    pub group: DirectoryObjectRef,
    /// Level its members would have received.
    pub level: u32,
}

/// Why a traversal stopped before finishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IncompleteReason {
    Cancelled,
    TimedOut {
        duration_ms: u64,
    },
    /// A directory failure that halts the whole traversal.
    Failed {
        group: DirectoryObjectRef,
        #[serde(serialize_with = "serialize_error")]
        error: DomainError,
    },
}

impl IncompleteReason {
    fn into_error(self) -> DomainError {
        match self {
            IncompleteReason::Cancelled => DomainError::Cancelled,
            IncompleteReason::TimedOut { duration_ms } => DomainError::Timeout { duration_ms },
            IncompleteReason::Failed { error, .. } => error,
        }
    }
}

/// Completion status of a traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completion {
    Complete,
    Incomplete {
        #[serde(flatten)]
        reason: IncompleteReason,
        /// Last-known frontier: groups that still had to be expanded.
        pending: Vec<PendingExpansion>,
    },
}

impl Completion {
    pub fn is_complete(&self) -> bool {
        matches!(self, Completion::Complete)
    }
}

/// Result of a flat traversal.
#[derive(Debug, Clone, Serialize)]
pub struct FlatResult {
    pub root: DirectoryObjectRef,
    /// Distinct users in discovery order.
    pub members: Vec<FlatMember>,
    /// True when some group was left unexpanded because of the depth bound.
    pub depth_limit_reached: bool,
    pub completion: Completion,
    pub skipped: Vec<SkippedBranch>,
    pub stats: TraversalStatsSnapshot,
}

/// Result of an expanded traversal.
#[derive(Debug, Clone, Serialize)]
pub struct ExpandedResult {
    pub root: DirectoryObjectRef,
    /// Every discovered edge in discovery order.
    pub edges: Vec<MembershipEdge>,
    /// Groups discovered at the depth bound and left unexpanded.
    pub unexpanded_frontier: Vec<DirectoryObjectRef>,
    /// Starting level to resume from for the unexpanded frontier.
    pub resume_level: Option<u32>,
    pub completion: Completion,
    pub skipped: Vec<SkippedBranch>,
    pub stats: TraversalStatsSnapshot,
}

/// Result of a traversal in either mode.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TraversalResult {
    Flat(FlatResult),
    Expanded(ExpandedResult),
}

impl TraversalResult {
    pub fn root(&self) -> &DirectoryObjectRef {
        match self {
            TraversalResult::Flat(r) => &r.root,
            TraversalResult::Expanded(r) => &r.root,
        }
    }

    pub fn completion(&self) -> &Completion {
        match self {
            TraversalResult::Flat(r) => &r.completion,
            TraversalResult::Expanded(r) => &r.completion,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completion().is_complete()
    }

    pub fn skipped(&self) -> &[SkippedBranch] {
        match self {
            TraversalResult::Flat(r) => &r.skipped,
            TraversalResult::Expanded(r) => &r.skipped,
        }
    }

    pub fn stats(&self) -> &TraversalStatsSnapshot {
        match self {
            TraversalResult::Flat(r) => &r.stats,
            TraversalResult::Expanded(r) => &r.stats,
        }
    }

    pub fn as_flat(&self) -> Option<&FlatResult> {
        match self {
            TraversalResult::Flat(r) => Some(r),
            TraversalResult::Expanded(_) => None,
        }
    }

    pub fn as_expanded(&self) -> Option<&ExpandedResult> {
        match self {
            TraversalResult::Expanded(r) => Some(r),
            TraversalResult::Flat(_) => None,
        }
    }

    /// Returns the result only if the traversal completed, otherwise the
    /// error that stopped it.
    pub fn into_complete(self) -> DomainResult<Self> {
        match self.completion() {
            Completion::Complete => Ok(self),
            Completion::Incomplete { reason, .. } => Err(reason.clone().into_error()),
        }
    }
}

fn serialize_error<S: serde::Serializer>(error: &DomainError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&error.to_string())
}
