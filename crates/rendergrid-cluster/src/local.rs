//! LocalControlPlane — an in-process control plane (for testing and
//! standalone mode).
//!
//! Pools are plain map entries, nodes become ready as soon as the pool is
//! created (unless manual readiness is enabled), log streams are mpsc
//! channels, and `exec_detached` optionally replays a scripted log sequence
//! on the target node so a whole dispatch → observe round trip can run
//! without a cluster.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::naming;
use crate::plane::{ControlPlane, LogStream, NodePhase, NodeStatus};

/// Capacity of each simulated log channel.
const LOG_CHANNEL_CAPACITY: usize = 256;

/// One recorded control-plane mutation, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolOp {
    Created(String),
    Deleted(String),
    Scaled(String, u32),
    Exec(String, String),
}

struct LocalPool {
    nodes: u32,
    ready: bool,
    dead_nodes: Vec<String>,
    /// Live subscribers per node.
    subscribers: HashMap<String, Vec<mpsc::Sender<String>>>,
    /// Lines emitted before anyone subscribed.
    backlog: HashMap<String, Vec<String>>,
}

struct Inner {
    pools: HashMap<String, LocalPool>,
    ops: Vec<PoolOp>,
}

/// In-process [`ControlPlane`] implementation.
pub struct LocalControlPlane {
    inner: Mutex<Inner>,
    /// Lines replayed on the exec target node by `exec_detached`.
    exec_script: Option<Vec<String>>,
    /// When false, pools stay unready until `set_ready` is called.
    auto_ready: bool,
}

impl LocalControlPlane {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pools: HashMap::new(),
                ops: Vec::new(),
            }),
            exec_script: None,
            auto_ready: true,
        }
    }

    /// Replay these lines on the target node whenever a job launch (an
    /// `mpiexec` command) is executed there.
    pub fn with_exec_script(mut self, lines: Vec<String>) -> Self {
        self.exec_script = Some(lines);
        self
    }

    /// Keep new pools unready until `set_ready` flips them.
    pub fn with_manual_ready(mut self) -> Self {
        self.auto_ready = false;
        self
    }

    /// Flip a pool's node readiness.
    pub fn set_ready(&self, pool: &str, ready: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(p) = inner.pools.get_mut(pool) {
            p.ready = ready;
        }
    }

    /// Mark one node as dead (fails liveness checks, not ready).
    pub fn fail_node(&self, pool: &str, node: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(p) = inner.pools.get_mut(pool) {
            p.dead_nodes.push(node.to_string());
        }
    }

    /// Emit a log line on a node, as the node's process would.
    pub fn push_log(&self, pool: &str, node: &str, line: &str) {
        let mut inner = self.inner.lock().unwrap();
        let Some(p) = inner.pools.get_mut(pool) else {
            return;
        };
        deliver_line(p, node, line);
    }

    /// Drop every live log stream for a pool, as a transport outage would.
    /// The pool itself stays up.
    pub fn drop_streams(&self, pool: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(p) = inner.pools.get_mut(pool) {
            p.subscribers.clear();
        }
    }

    /// All control-plane mutations so far, in call order.
    pub fn operations(&self) -> Vec<PoolOp> {
        self.inner.lock().unwrap().ops.clone()
    }
}

impl Default for LocalControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver_line(pool: &mut LocalPool, node: &str, line: &str) {
    let senders = pool.subscribers.entry(node.to_string()).or_default();
    senders.retain(|tx| tx.try_send(line.to_string()).is_ok());
    if senders.is_empty() {
        pool.backlog
            .entry(node.to_string())
            .or_default()
            .push(line.to_string());
    }
}

#[async_trait]
impl ControlPlane for LocalControlPlane {
    async fn create_pool(&self, name: &str, nodes: u32) -> ClusterResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.pools.contains_key(name) {
            return Err(ClusterError::AlreadyExists(name.to_string()));
        }
        inner.pools.insert(
            name.to_string(),
            LocalPool {
                nodes,
                ready: self.auto_ready,
                dead_nodes: Vec::new(),
                subscribers: HashMap::new(),
                backlog: HashMap::new(),
            },
        );
        inner.ops.push(PoolOp::Created(name.to_string()));
        debug!(%name, nodes, "local pool created");
        Ok(())
    }

    async fn delete_pool(&self, name: &str) -> ClusterResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.pools.remove(name).is_none() {
            return Err(ClusterError::PoolNotFound(name.to_string()));
        }
        inner.ops.push(PoolOp::Deleted(name.to_string()));
        debug!(%name, "local pool deleted");
        Ok(())
    }

    async fn pool_exists(&self, name: &str) -> ClusterResult<bool> {
        Ok(self.inner.lock().unwrap().pools.contains_key(name))
    }

    async fn list_pools(&self) -> ClusterResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        let mut names: Vec<String> = inner
            .pools
            .keys()
            .filter(|name| naming::pool_ordinal(name).is_some())
            .cloned()
            .collect();
        names.sort_by_key(|name| naming::pool_ordinal(name));
        Ok(names)
    }

    async fn scale_pool(&self, name: &str, nodes: u32) -> ClusterResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let pool = inner
            .pools
            .get_mut(name)
            .ok_or_else(|| ClusterError::PoolNotFound(name.to_string()))?;
        pool.nodes = nodes;
        inner.ops.push(PoolOp::Scaled(name.to_string(), nodes));
        Ok(())
    }

    async fn node_statuses(&self, pool: &str) -> ClusterResult<Vec<NodeStatus>> {
        let inner = self.inner.lock().unwrap();
        let p = inner
            .pools
            .get(pool)
            .ok_or_else(|| ClusterError::PoolNotFound(pool.to_string()))?;
        Ok((0..p.nodes)
            .map(|i| {
                let name = naming::node_name(pool, i);
                let dead = p.dead_nodes.contains(&name);
                NodeStatus {
                    ready: p.ready && !dead,
                    phase: if dead {
                        NodePhase::Failed
                    } else {
                        NodePhase::Running
                    },
                    name,
                }
            })
            .collect())
    }

    async fn exec_detached(&self, pool: &str, node: &str, command: &[String]) -> ClusterResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let p = inner
            .pools
            .get_mut(pool)
            .ok_or_else(|| ClusterError::PoolNotFound(pool.to_string()))?;
        // Only a launched job replays the script; housekeeping commands
        // (hostfile pushes and the like) produce no output.
        if let Some(script) = &self.exec_script
            && command.iter().any(|part| part.contains("mpiexec"))
        {
            for line in script {
                deliver_line(p, node, line);
            }
        }
        inner
            .ops
            .push(PoolOp::Exec(node.to_string(), command.join(" ")));
        debug!(%pool, %node, "local exec recorded");
        Ok(())
    }

    async fn tail_logs(&self, pool: &str, node: &str) -> ClusterResult<LogStream> {
        let mut inner = self.inner.lock().unwrap();
        let p = inner
            .pools
            .get_mut(pool)
            .ok_or_else(|| ClusterError::PoolNotFound(pool.to_string()))?;
        let (tx, rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        for line in p.backlog.remove(node).unwrap_or_default() {
            let _ = tx.try_send(line);
        }
        p.subscribers.entry(node.to_string()).or_default().push(tx);
        Ok(rx)
    }

    async fn node_alive(&self, pool: &str, node: &str) -> ClusterResult<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .pools
            .get(pool)
            .is_some_and(|p| !p.dead_nodes.contains(&node.to_string())))
    }
}
