//! ObserverSet — keeps one observer task per registered pool.
//!
//! Pools come and go with scaling and recycling; the set reconciles its
//! slot map against the store's pool registry on a fixed interval,
//! starting observers for new pools, stopping them for removed pools, and
//! replacing instances that terminated themselves (dead coordinator,
//! stream lost mid-task).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use rendergrid_cluster::ControlPlane;
use rendergrid_state::StateStore;

use crate::observer::{Observer, ObserverConfig};

/// Per-pool observer slot.
struct ObserverSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Manages observer tasks for all registered pools.
pub struct ObserverSet {
    state: StateStore,
    cluster: Arc<dyn ControlPlane>,
    config: ObserverConfig,
    /// Active observers: pool name → slot.
    observers: Arc<RwLock<HashMap<String, ObserverSlot>>>,
}

impl ObserverSet {
    pub fn new(state: StateStore, cluster: Arc<dyn ControlPlane>, config: ObserverConfig) -> Self {
        Self {
            state,
            cluster,
            config,
            observers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start observing a pool. Replaces any previous observer for it.
    pub async fn start_observer(&self, pool: &str) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let observer = Observer::new(
            pool.to_string(),
            self.state.clone(),
            self.cluster.clone(),
            self.config.clone(),
        );
        let handle = tokio::spawn(async move { observer.run(shutdown_rx).await });

        let mut observers = self.observers.write().await;
        if let Some(old) = observers.insert(
            pool.to_string(),
            ObserverSlot {
                handle,
                shutdown_tx,
            },
        ) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }
        info!(%pool, "observer slot started");
    }

    /// Stop observing a pool.
    pub async fn stop_observer(&self, pool: &str) {
        let mut observers = self.observers.write().await;
        if let Some(slot) = observers.remove(pool) {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            info!(%pool, "observer slot stopped");
        }
    }

    /// Stop every observer (for graceful shutdown).
    pub async fn stop_all(&self) {
        let mut observers = self.observers.write().await;
        for (pool, slot) in observers.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(%pool, "observer slot stopped");
        }
        info!("all observers stopped");
    }

    /// Pool names with an active observer slot.
    pub async fn active_observers(&self) -> Vec<String> {
        let observers = self.observers.read().await;
        observers.keys().cloned().collect()
    }

    /// Whether a pool has an observer slot.
    pub async fn is_observing(&self, pool: &str) -> bool {
        let observers = self.observers.read().await;
        observers.contains_key(pool)
    }

    /// Reconcile the slot map against the pool registry.
    pub async fn sync_pools(&self) -> rendergrid_state::StateResult<()> {
        let registered: HashSet<String> = self
            .state
            .list_pools()?
            .into_iter()
            .map(|pool| pool.name)
            .collect();

        // Stop observers for pools that no longer exist, and clear slots
        // whose observer terminated itself so they restart below.
        let stale: Vec<String> = {
            let observers = self.observers.read().await;
            observers
                .iter()
                .filter(|(pool, slot)| {
                    !registered.contains(*pool) || slot.handle.is_finished()
                })
                .map(|(pool, _)| pool.clone())
                .collect()
        };
        for pool in stale {
            self.stop_observer(&pool).await;
        }

        for pool in &registered {
            if !self.is_observing(pool).await {
                self.start_observer(pool).await;
            }
        }
        Ok(())
    }

    /// Run the reconcile loop until shutdown.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "observer supervisor started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.sync_pools().await {
                        error!(error = %e, "observer sync failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("observer supervisor shutting down");
                    break;
                }
            }
        }
        self.stop_all().await;
    }
}
