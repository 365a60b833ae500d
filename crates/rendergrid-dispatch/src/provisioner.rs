//! Pool provisioner — creates, readies, and recycles worker pools.
//!
//! A pool is a fixed-shape node set plus its endpoint and attached observer
//! process, all built by the control plane. The provisioner layers the
//! orchestration semantics on top: already-exists is a no-op, readiness is
//! polled with no deadline, and recycling waits for the old pool to be
//! confirmed gone before recreating it so the name never collides.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::sleep;
use tracing::{debug, info};

use rendergrid_cluster::{naming, ClusterError, ControlPlane};
use rendergrid_state::{PoolRecord, StateStore};

use crate::error::DispatchResult;

/// Provisioner tuning knobs.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Fixed node count for every pool.
    pub nodes_per_pool: u32,
    /// Poll interval while waiting for nodes to become ready.
    pub ready_poll_interval: Duration,
    /// Poll interval while waiting for a deleted pool to disappear.
    pub gone_poll_interval: Duration,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            nodes_per_pool: 4,
            ready_poll_interval: Duration::from_secs(2),
            gone_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Creates and recycles worker pools through the control plane, mirroring
/// each pool into the state store's registry.
#[derive(Clone)]
pub struct PoolProvisioner {
    cluster: Arc<dyn ControlPlane>,
    state: StateStore,
    config: ProvisionerConfig,
}

impl PoolProvisioner {
    pub fn new(
        cluster: Arc<dyn ControlPlane>,
        state: StateStore,
        config: ProvisionerConfig,
    ) -> Self {
        Self {
            cluster,
            state,
            config,
        }
    }

    /// Node count every pool is scaled to.
    pub fn nodes_per_pool(&self) -> u32 {
        self.config.nodes_per_pool
    }

    /// Create a pool if it doesn't exist, scale it to shape, and register it.
    ///
    /// Already-exists from the control plane is a no-op; the pool is still
    /// scaled and (re-)registered so a crash between steps heals here.
    pub async fn ensure_pool(&self, name: &str) -> DispatchResult<()> {
        match self
            .cluster
            .create_pool(name, self.config.nodes_per_pool)
            .await
        {
            Ok(()) => info!(%name, nodes = self.config.nodes_per_pool, "pool created"),
            Err(ClusterError::AlreadyExists(_)) => debug!(%name, "pool already exists"),
            Err(e) => return Err(e.into()),
        }
        self.cluster
            .scale_pool(name, self.config.nodes_per_pool)
            .await?;
        self.state.register_pool(&PoolRecord {
            name: name.to_string(),
            nodes: self.config.nodes_per_pool,
            created_at: epoch_secs(),
        })?;
        Ok(())
    }

    /// Block until every node in the pool reports ready.
    ///
    /// Polls at a fixed interval with no timeout: a pool that never comes
    /// up shows as an operator-visible stall, not a task failure.
    pub async fn wait_ready(&self, name: &str) -> DispatchResult<()> {
        loop {
            let statuses = self.cluster.node_statuses(name).await?;
            let ready = statuses.iter().filter(|s| s.is_ready()).count() as u32;
            if ready == self.config.nodes_per_pool {
                debug!(%name, ready, "pool ready");
                return Ok(());
            }
            debug!(%name, ready, total = self.config.nodes_per_pool, "waiting for pool");
            sleep(self.config.ready_poll_interval).await;
        }
    }

    /// Stable addresses of every node in a pool, coordinator first.
    pub fn roster(&self, name: &str) -> Vec<String> {
        (0..self.config.nodes_per_pool)
            .map(|i| naming::node_address(name, i))
            .collect()
    }

    /// Write the roster to the coordinator's hostfile so the job can reach
    /// every node of the pool.
    pub async fn push_roster(&self, name: &str) -> DispatchResult<()> {
        let coordinator = naming::coordinator_name(name);
        let hostfile = format!(
            "echo '{}' > /etc/rendergrid/hostfile",
            self.roster(name).join(",")
        );
        let command = vec!["/bin/sh".to_string(), "-c".to_string(), hostfile];
        self.cluster.exec_detached(name, &coordinator, &command).await?;
        Ok(())
    }

    /// Delete a pool, wait until the name is confirmed gone, and recreate it.
    ///
    /// The wait avoids a name collision with the terminating pool; the next
    /// dispatch to this name targets a clean environment.
    pub async fn recycle(&self, name: &str) -> DispatchResult<()> {
        match self.cluster.delete_pool(name).await {
            Ok(()) => {}
            Err(ClusterError::PoolNotFound(_)) => debug!(%name, "pool already gone"),
            Err(e) => return Err(e.into()),
        }
        self.state.deregister_pool(name)?;
        while self.cluster.pool_exists(name).await? {
            debug!(%name, "waiting for pool teardown");
            sleep(self.config.gone_poll_interval).await;
        }
        self.ensure_pool(name).await?;
        info!(%name, "pool recycled");
        Ok(())
    }

    /// Delete a pool without recreating it (scale-down path).
    pub async fn teardown(&self, name: &str) -> DispatchResult<()> {
        match self.cluster.delete_pool(name).await {
            Ok(()) => {}
            Err(ClusterError::PoolNotFound(_)) => debug!(%name, "pool already gone"),
            Err(e) => return Err(e.into()),
        }
        self.state.deregister_pool(name)?;
        info!(%name, "pool torn down");
        Ok(())
    }
}

/// Current Unix epoch in seconds.
pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendergrid_cluster::local::PoolOp;
    use rendergrid_cluster::LocalControlPlane;

    fn test_provisioner(plane: Arc<LocalControlPlane>) -> PoolProvisioner {
        PoolProvisioner::new(
            plane,
            StateStore::open_in_memory().unwrap(),
            ProvisionerConfig {
                nodes_per_pool: 2,
                ready_poll_interval: Duration::from_millis(10),
                gone_poll_interval: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn ensure_pool_creates_and_registers() {
        let plane = Arc::new(LocalControlPlane::new());
        let provisioner = test_provisioner(plane.clone());

        provisioner.ensure_pool("render-pool-1").await.unwrap();

        assert!(plane.pool_exists("render-pool-1").await.unwrap());
        assert_eq!(provisioner.state.count_pools().unwrap(), 1);
    }

    #[tokio::test]
    async fn ensure_pool_tolerates_existing() {
        let plane = Arc::new(LocalControlPlane::new());
        let provisioner = test_provisioner(plane.clone());

        provisioner.ensure_pool("render-pool-1").await.unwrap();
        // Second call must not error on the existing pool.
        provisioner.ensure_pool("render-pool-1").await.unwrap();

        assert_eq!(provisioner.state.count_pools().unwrap(), 1);
    }

    #[tokio::test]
    async fn wait_ready_returns_once_all_nodes_are_up() {
        let plane = Arc::new(LocalControlPlane::new().with_manual_ready());
        let provisioner = test_provisioner(plane.clone());
        provisioner.ensure_pool("render-pool-1").await.unwrap();

        let waiter = {
            let provisioner = provisioner.clone();
            tokio::spawn(async move { provisioner.wait_ready("render-pool-1").await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        plane.set_ready("render-pool-1", true);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn roster_lists_all_nodes_coordinator_first() {
        let plane = Arc::new(LocalControlPlane::new());
        let provisioner = test_provisioner(plane);

        let roster = provisioner.roster("render-pool-1");
        assert_eq!(
            roster,
            vec![
                "render-pool-1-node-0.render-pool-1.svc.cluster.local",
                "render-pool-1-node-1.render-pool-1.svc.cluster.local",
            ]
        );
    }

    #[tokio::test]
    async fn push_roster_execs_on_coordinator() {
        let plane = Arc::new(LocalControlPlane::new());
        let provisioner = test_provisioner(plane.clone());
        provisioner.ensure_pool("render-pool-1").await.unwrap();

        provisioner.push_roster("render-pool-1").await.unwrap();

        let ops = plane.operations();
        assert!(ops.iter().any(|op| matches!(
            op,
            PoolOp::Exec(node, cmd)
                if node == "render-pool-1-node-0" && cmd.contains("hostfile")
        )));
    }

    #[tokio::test]
    async fn recycle_deletes_before_recreating() {
        let plane = Arc::new(LocalControlPlane::new());
        let provisioner = test_provisioner(plane.clone());
        provisioner.ensure_pool("render-pool-1").await.unwrap();

        provisioner.recycle("render-pool-1").await.unwrap();

        let ops: Vec<_> = plane
            .operations()
            .into_iter()
            .filter(|op| matches!(op, PoolOp::Created(_) | PoolOp::Deleted(_)))
            .collect();
        assert_eq!(
            ops,
            vec![
                PoolOp::Created("render-pool-1".to_string()),
                PoolOp::Deleted("render-pool-1".to_string()),
                PoolOp::Created("render-pool-1".to_string()),
            ]
        );
        assert_eq!(provisioner.state.count_pools().unwrap(), 1);
    }

    #[tokio::test]
    async fn teardown_removes_pool_and_registration() {
        let plane = Arc::new(LocalControlPlane::new());
        let provisioner = test_provisioner(plane.clone());
        provisioner.ensure_pool("render-pool-1").await.unwrap();

        provisioner.teardown("render-pool-1").await.unwrap();

        assert!(!plane.pool_exists("render-pool-1").await.unwrap());
        assert_eq!(provisioner.state.count_pools().unwrap(), 0);
    }
}
