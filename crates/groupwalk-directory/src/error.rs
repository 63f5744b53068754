//! Directory backend error types.

use std::path::PathBuf;

use groupwalk_domain::DomainError;
use thiserror::Error;

/// Errors raised while building or loading an in-memory directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Fixture file could not be read.
    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fixture is not valid JSON or does not match the fixture schema.
    #[error("invalid fixture: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },

    /// Two objects share the same key or distinguished name.
    #[error("duplicate object: {identifier}")]
    DuplicateObject { identifier: String },

    /// A group lists a member that does not exist.
    #[error("group {group} references unknown member {member}")]
    DanglingReference { group: String, member: String },

    /// An object definition is inconsistent.
    #[error("invalid object {key}: {message}")]
    InvalidObject { key: String, message: String },

    /// A recipient filter could not be parsed.
    #[error("invalid recipient filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

impl From<DirectoryError> for DomainError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::InvalidFilter { filter, message } => DomainError::MalformedIdentifier {
                value: filter,
                reason: message,
            },
            other => DomainError::InvalidRequest {
                message: other.to_string(),
            },
        }
    }
}
