//! The `ControlPlane` trait — what the orchestrator needs from a cluster.
//!
//! A pool here is one node set plus its network endpoint plus one attached
//! observer process; the trait deliberately hides how those are built
//! (manifests, resource objects, images are out of scope).

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ClusterResult;

/// Live log lines from one node, in emission order. The stream ends when
/// the sender side (the node, or the transport) goes away.
pub type LogStream = mpsc::Receiver<String>;

/// Coarse lifecycle phase of a compute node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// Point-in-time status of one node in a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub name: String,
    pub phase: NodePhase,
    /// All of the node's containers report ready.
    pub ready: bool,
}

impl NodeStatus {
    /// A node counts as ready when it is running and its containers are up.
    pub fn is_ready(&self) -> bool {
        self.phase == NodePhase::Running && self.ready
    }
}

/// Cluster control-plane operations used by the orchestrator.
///
/// Implementations must be safe to share across tasks; components hold an
/// `Arc<dyn ControlPlane>` opened at process start.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create a pool (node set + endpoint + observer process).
    ///
    /// Fails with [`ClusterError::AlreadyExists`] when the name is taken;
    /// callers treat that as a no-op.
    ///
    /// [`ClusterError::AlreadyExists`]: crate::error::ClusterError::AlreadyExists
    async fn create_pool(&self, name: &str, nodes: u32) -> ClusterResult<()>;

    /// Delete a pool and everything in it. Deletion is asynchronous on real
    /// clusters; poll [`pool_exists`](Self::pool_exists) to confirm.
    async fn delete_pool(&self, name: &str) -> ClusterResult<()>;

    /// Whether a pool (or its terminating remains) still exists.
    async fn pool_exists(&self, name: &str) -> ClusterResult<bool>;

    /// Names of all pools carrying the RenderGrid prefix, ordinal-sorted.
    async fn list_pools(&self) -> ClusterResult<Vec<String>>;

    /// Scale a pool's node set to the given replica count.
    async fn scale_pool(&self, name: &str, nodes: u32) -> ClusterResult<()>;

    /// Status of every node currently in a pool.
    async fn node_statuses(&self, pool: &str) -> ClusterResult<Vec<NodeStatus>>;

    /// Run a command on a node without waiting for it to finish.
    async fn exec_detached(&self, pool: &str, node: &str, command: &[String]) -> ClusterResult<()>;

    /// Follow a node's combined output stream from now on.
    async fn tail_logs(&self, pool: &str, node: &str) -> ClusterResult<LogStream>;

    /// Direct liveness check for one node.
    async fn node_alive(&self, pool: &str, node: &str) -> ClusterResult<bool>;
}
