//! Dispatcher — the pull loop that binds queued tasks to pools.
//!
//! One task at a time: dequeue, record as running against a free pool,
//! bring the pool up, and fire the render command at its coordinator.
//! The dispatch is asynchronous by design; nothing here waits for the job
//! to finish. A dispatch error leaves the running record in place for the
//! autoscaler's failure path to reconcile.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use rendergrid_cluster::{naming, ControlPlane};
use rendergrid_state::{StateStore, TaskRecord, TaskSpec, TaskStatus};

use crate::args;
use crate::error::DispatchResult;
use crate::provisioner::{epoch_secs, PoolProvisioner};

/// Dispatcher tuning knobs.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sleep between polls when the queue is empty.
    pub idle_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(1),
        }
    }
}

/// Pulls tasks off the queue and dispatches them to pools.
pub struct Dispatcher {
    state: StateStore,
    cluster: Arc<dyn ControlPlane>,
    provisioner: PoolProvisioner,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        state: StateStore,
        cluster: Arc<dyn ControlPlane>,
        provisioner: PoolProvisioner,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            state,
            cluster,
            provisioner,
            config,
        }
    }

    /// Run the dispatch loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("dispatcher started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.state.dequeue() {
                Ok(Some(task)) => {
                    let id = task.id.clone();
                    if let Err(e) = self.dispatch(task).await {
                        // The running record stays; reconciliation retries it.
                        error!(%id, error = %e, "dispatch failed");
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = sleep(self.config.idle_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Err(e) => {
                    error!(error = %e, "dequeue failed");
                    sleep(self.config.idle_interval).await;
                }
            }
        }
        info!("dispatcher shutting down");
    }

    /// Dispatch a single task: bind, provision, and exec.
    pub async fn dispatch(&self, task: TaskSpec) -> DispatchResult<()> {
        let pool = self.select_pool().await?;

        // Mark running first; a crash anywhere past this point leaves a
        // record the autoscaler can reconcile.
        let now = epoch_secs();
        self.state.add_running(&TaskRecord {
            task: task.clone(),
            pool: pool.clone(),
            status: TaskStatus::Running,
            dispatched_at: now,
            updated_at: now,
        })?;

        self.provisioner.ensure_pool(&pool).await?;
        self.provisioner.wait_ready(&pool).await?;
        self.provisioner.push_roster(&pool).await?;

        let roster = self.provisioner.roster(&pool);
        let command = args::exec_command(
            self.provisioner.nodes_per_pool(),
            &roster,
            &args::build_args(&task.params),
        );
        let coordinator = naming::coordinator_name(&pool);
        self.cluster
            .exec_detached(&pool, &coordinator, &command)
            .await?;

        info!(id = %task.id, %pool, "task dispatched");
        Ok(())
    }

    /// Pick the lowest-ordinal pool with no bound task; provision the next
    /// ordinal when every registered pool is busy.
    async fn select_pool(&self) -> DispatchResult<String> {
        let pools = self.state.list_pools()?;
        let mut names: Vec<String> = pools.into_iter().map(|p| p.name).collect();
        names.sort_by_key(|name| naming::pool_ordinal(name));

        for name in &names {
            if self.state.find_running_for_pool(name)?.is_none() {
                return Ok(name.clone());
            }
        }

        let name = naming::pool_name(naming::next_ordinal(names.iter().map(String::as_str)));
        warn!(%name, "all pools busy, provisioning another");
        Ok(name)
    }
}
