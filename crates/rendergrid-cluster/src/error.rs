//! Control-plane error types.

use thiserror::Error;

/// Result type alias for control-plane operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur during control-plane operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Create on an existing resource. Callers treat this as a no-op.
    #[error("pool already exists: {0}")]
    AlreadyExists(String),

    #[error("pool not found: {0}")]
    PoolNotFound(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Anything else the control-plane API reports.
    #[error("control plane error: {0}")]
    Api(String),
}
