//! Domain error types for membership expansion.

use thiserror::Error;

/// Domain-specific errors for directory traversal.
///
/// Cycles are not represented here: a group reached again through its own
/// descendants is handled by the visited set and only shows up in the
/// traversal statistics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Identifier could not be interpreted (e.g. a DN without `DC=` components).
    #[error("malformed identifier '{value}': {reason}")]
    MalformedIdentifier { value: String, reason: String },

    /// Identifier did not resolve to any directory object.
    #[error("directory object not found: {identifier}")]
    NotFound { identifier: String },

    /// Identifier resolved to more than one directory object.
    #[error("identifier '{identifier}' is ambiguous ({matches} matches)")]
    Ambiguous { identifier: String, matches: usize },

    /// Transient connectivity or throttling failure talking to the directory.
    #[error("directory unavailable: {message}")]
    Unavailable { message: String },

    /// The directory refused the query.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Caller supplied an unusable request.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Traversal was cancelled by the caller.
    #[error("traversal cancelled")]
    Cancelled,

    /// Traversal exceeded its configured deadline.
    #[error("timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

impl DomainError {
    /// Returns true for failures that only affect the branch being expanded.
    ///
    /// `NotFound`, `Ambiguous` and `MalformedIdentifier` on a nested group are
    /// logged and skipped; everything else halts the traversal.
    pub fn is_branch_recoverable(&self) -> bool {
        matches!(
            self,
            DomainError::NotFound { .. }
                | DomainError::Ambiguous { .. }
                | DomainError::MalformedIdentifier { .. }
        )
    }

    pub(crate) fn malformed(value: impl Into<String>, reason: impl Into<String>) -> Self {
        DomainError::MalformedIdentifier {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
