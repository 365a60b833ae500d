//! Dispatch error types.

use thiserror::Error;

/// Errors that can occur while provisioning or dispatching.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("state store error: {0}")]
    State(#[from] rendergrid_state::StateError),

    #[error("control plane error: {0}")]
    Cluster(#[from] rendergrid_cluster::ClusterError),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
