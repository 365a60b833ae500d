//! Autoscaler — the scaling tick and running-set reconciliation.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use rendergrid_cluster::naming;
use rendergrid_dispatch::PoolProvisioner;
use rendergrid_state::{StateStore, TaskStatus};

/// Default load-ratio threshold for growing the fleet.
pub const DEFAULT_THRESHOLD: f64 = 10.0;

/// A scaling decision for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Provision one more pool.
    ScaleUp,
    /// Tear down the highest-ordinal pool.
    ScaleDown,
    /// Leave the fleet as is.
    Hold,
}

/// Pure scale decision from queue depth and pool count.
///
/// Never scales below one pool; a ratio exactly at the threshold holds.
pub fn evaluate(pending: u64, pools: u64, threshold: f64) -> ScaleDecision {
    let ratio = if pools == 0 {
        pending as f64
    } else {
        pending as f64 / pools as f64
    };
    if ratio > threshold {
        ScaleDecision::ScaleUp
    } else if ratio < threshold && pools > 1 {
        ScaleDecision::ScaleDown
    } else {
        ScaleDecision::Hold
    }
}

/// Autoscaler tuning knobs.
#[derive(Debug, Clone)]
pub struct AutoscalerConfig {
    /// Load ratio above which one pool is added.
    pub threshold: f64,
    /// Tick interval.
    pub interval: Duration,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            interval: Duration::from_secs(10),
        }
    }
}

/// Grows and shrinks the pool fleet and reconciles terminal tasks.
pub struct Autoscaler {
    state: StateStore,
    provisioner: PoolProvisioner,
    config: AutoscalerConfig,
}

impl Autoscaler {
    pub fn new(state: StateStore, provisioner: PoolProvisioner, config: AutoscalerConfig) -> Self {
        Self {
            state,
            provisioner,
            config,
        }
    }

    /// Provision the first pool when none exist yet.
    pub async fn bootstrap(&self) -> anyhow::Result<()> {
        if self.state.count_pools()? == 0 {
            let name = naming::pool_name(1);
            info!(%name, "no pools exist, provisioning bootstrap pool");
            self.provisioner.ensure_pool(&name).await?;
        }
        Ok(())
    }

    /// One tick: scale by at most one pool, then reconcile terminal tasks.
    pub async fn tick(&self) -> anyhow::Result<()> {
        self.scale().await?;
        self.reconcile().await?;
        Ok(())
    }

    async fn scale(&self) -> anyhow::Result<()> {
        let pending = self.state.queue_len()?;
        let pools = self.state.list_pools()?;
        let names: Vec<String> = pools.into_iter().map(|pool| pool.name).collect();
        let decision = evaluate(pending, names.len() as u64, self.config.threshold);
        debug!(pending, pools = names.len(), ?decision, "scale tick");

        match decision {
            ScaleDecision::ScaleUp => {
                let ordinal = naming::next_ordinal(names.iter().map(String::as_str));
                let name = naming::pool_name(ordinal);
                info!(%name, pending, pools = names.len(), "scaling up");
                self.provisioner.ensure_pool(&name).await?;
            }
            ScaleDecision::ScaleDown => {
                if let Some(victim) = naming::highest_pool(names.iter().map(String::as_str)) {
                    info!(%victim, pending, pools = names.len(), "scaling down");
                    self.provisioner.teardown(&victim).await?;
                }
            }
            ScaleDecision::Hold => {}
        }
        Ok(())
    }

    /// Clear completed records; re-queue failed ones and recycle their pool.
    async fn reconcile(&self) -> anyhow::Result<()> {
        for record in self.state.list_running()? {
            match record.status {
                TaskStatus::Success => {
                    self.state.remove_running(&record.task.id)?;
                    info!(id = %record.task.id, "completed task cleared");
                }
                TaskStatus::Failed => {
                    // Remove first so the id never sits in both places.
                    self.state.remove_running(&record.task.id)?;
                    self.state.enqueue(&record.task)?;
                    info!(id = %record.task.id, pool = %record.pool, "failed task re-queued");
                    self.provisioner.recycle(&record.pool).await?;
                }
                TaskStatus::Queued | TaskStatus::Running => {}
            }
        }
        Ok(())
    }

    /// Run the autoscaler loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            threshold = self.config.threshold,
            "autoscaler started"
        );

        if let Err(e) = self.bootstrap().await {
            error!(error = %e, "bootstrap failed");
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "autoscaler tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }
}
