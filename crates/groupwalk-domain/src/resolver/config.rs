//! Configuration for the traversal engine.

use std::time::Duration;

/// Default bound for level-annotated (expanded) traversals.
pub const DEFAULT_LEVELS_DEEP_TO_GO: u32 = 10;

/// Configuration for the traversal engine.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// Maximum number of directory calls in flight for one traversal.
    ///
    /// With a value of 1 flat traversals are strictly depth-first.
    pub max_concurrency: usize,
    /// Optional deadline for a whole traversal. When it elapses the partial
    /// result is returned marked incomplete.
    pub timeout: Option<Duration>,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            timeout: None,
        }
    }
}

impl TraversalConfig {
    /// Creates a new configuration with the specified concurrency limit.
    ///
    /// A limit of zero is treated as one.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Creates a new configuration with the specified timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
