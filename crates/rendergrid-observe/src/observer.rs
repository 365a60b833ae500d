//! Observer — per-pool log streaming and status write-back.
//!
//! Exactly one observer owns one pool, so status writes for that pool's
//! task are totally ordered by this loop. Liveness of the coordinator is
//! verified directly before and after every streaming attempt; a dead
//! coordinator or a stream lost mid-task resolves to `failed` and ends
//! this observer instance — the autoscaler's recycle path brings up the
//! replacement.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use rendergrid_cluster::{naming, ControlPlane};
use rendergrid_state::{StateStore, TaskStatus};

use crate::classifier::classify;
use crate::watch::{TaskOutcome, TaskWatch};

/// Observer tuning knobs.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// How long an unchanged progress percentage counts as alive.
    pub stall_timeout: Duration,
    /// Delay before re-opening a stream that ended with no task running.
    pub reconnect_delay: Duration,
    /// Treat a stream lost mid-task as a failure (no retry). The
    /// permissive alternative keeps the task and reconnects.
    pub fail_on_stream_loss: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(5),
            fail_on_stream_loss: true,
        }
    }
}

/// How one streaming attempt ended.
enum StreamEnd {
    /// The log stream closed or errored.
    Ended,
    /// Shutdown was signalled.
    Shutdown,
}

/// Watches one pool's coordinator and writes task status to the store.
pub struct Observer {
    pool: String,
    state: StateStore,
    cluster: Arc<dyn ControlPlane>,
    config: ObserverConfig,
}

impl Observer {
    pub fn new(
        pool: String,
        state: StateStore,
        cluster: Arc<dyn ControlPlane>,
        config: ObserverConfig,
    ) -> Self {
        Self {
            pool,
            state,
            cluster,
            config,
        }
    }

    /// Run until shutdown, the coordinator dies, or a stream is lost
    /// mid-task.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let coordinator = naming::coordinator_name(&self.pool);
        let mut task_watch = TaskWatch::new(self.config.stall_timeout);
        info!(pool = %self.pool, %coordinator, "observer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if !self.coordinator_alive(&coordinator).await {
                self.fail_and_terminate(&task_watch, "coordinator not alive");
                return;
            }

            if matches!(
                self.stream_once(&coordinator, &mut task_watch, &mut shutdown)
                    .await,
                StreamEnd::Shutdown
            ) {
                break;
            }

            if !self.coordinator_alive(&coordinator).await {
                self.fail_and_terminate(&task_watch, "coordinator died during stream");
                return;
            }

            if task_watch.in_progress() && self.config.fail_on_stream_loss {
                // Indistinguishable from a stuck worker; resolve it now.
                self.fail_and_terminate(&task_watch, "log stream lost mid-task");
                return;
            }

            tokio::select! {
                _ = sleep(self.config.reconnect_delay) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!(pool = %self.pool, "observer shutting down");
    }

    /// One pass over a live log stream.
    async fn stream_once(
        &self,
        coordinator: &str,
        task_watch: &mut TaskWatch,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StreamEnd {
        let mut lines = match self.cluster.tail_logs(&self.pool, coordinator).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!(pool = %self.pool, error = %e, "log stream unavailable");
                return StreamEnd::Ended;
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.changed() => return StreamEnd::Shutdown,
                _ = stall_sleep(task_watch.deadline()) => {
                    if let Some(outcome) = task_watch.check_stall(Instant::now()) {
                        warn!(pool = %self.pool, "progress stalled");
                        self.write_outcome(outcome);
                    }
                }
                line = lines.recv() => match line {
                    Some(line) => {
                        debug!(pool = %self.pool, %line, "log line");
                        let event = classify(&line);
                        if let Some(outcome) = task_watch.observe(event, Instant::now()) {
                            self.write_outcome(outcome);
                        }
                    }
                    None => return StreamEnd::Ended,
                },
            }
        }
    }

    async fn coordinator_alive(&self, coordinator: &str) -> bool {
        match self.cluster.node_alive(&self.pool, coordinator).await {
            Ok(alive) => alive,
            Err(e) => {
                warn!(pool = %self.pool, error = %e, "liveness check failed");
                false
            }
        }
    }

    /// Write `failed` if a task is in progress, then let the caller return.
    fn fail_and_terminate(&self, task_watch: &TaskWatch, reason: &str) {
        warn!(pool = %self.pool, reason, "observer terminating");
        if task_watch.in_progress() {
            self.write_status(TaskStatus::Failed);
        }
    }

    fn write_outcome(&self, outcome: TaskOutcome) {
        let status = match outcome {
            TaskOutcome::Succeeded => TaskStatus::Success,
            TaskOutcome::Failed => TaskStatus::Failed,
        };
        self.write_status(status);
    }

    /// Update the running record bound to this pool (last-writer-wins).
    fn write_status(&self, status: TaskStatus) {
        match self.state.find_running_for_pool(&self.pool) {
            Ok(Some(mut record)) => {
                record.status = status;
                record.updated_at = epoch_secs();
                match self.state.update_running(&record) {
                    Ok(()) => {
                        info!(id = %record.task.id, pool = %self.pool, ?status, "task status written");
                    }
                    Err(e) => error!(pool = %self.pool, error = %e, "status write failed"),
                }
            }
            Ok(None) => warn!(pool = %self.pool, ?status, "no running task bound to pool"),
            Err(e) => error!(pool = %self.pool, error = %e, "running-record lookup failed"),
        }
    }
}

/// Sleep until the stall deadline, or forever when no task is in progress.
async fn stall_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use rendergrid_cluster::LocalControlPlane;
    use rendergrid_state::{ParamValue, TaskRecord, TaskSpec};

    const POOL: &str = "render-pool-1";
    const COORDINATOR: &str = "render-pool-1-node-0";

    fn test_record() -> TaskRecord {
        let mut params = BTreeMap::new();
        params.insert("width".to_string(), ParamValue::Int(640));
        TaskRecord {
            task: TaskSpec {
                id: "job-1".to_string(),
                params,
                callback: None,
            },
            pool: POOL.to_string(),
            status: TaskStatus::Running,
            dispatched_at: 1000,
            updated_at: 1000,
        }
    }

    fn fast_config() -> ObserverConfig {
        ObserverConfig {
            stall_timeout: Duration::from_millis(50),
            reconnect_delay: Duration::from_millis(10),
            fail_on_stream_loss: true,
        }
    }

    async fn setup() -> (Arc<LocalControlPlane>, StateStore, Observer) {
        let plane = Arc::new(LocalControlPlane::new());
        plane.create_pool(POOL, 1).await.unwrap();
        let state = StateStore::open_in_memory().unwrap();
        state.add_running(&test_record()).unwrap();
        let observer = Observer::new(
            POOL.to_string(),
            state.clone(),
            plane.clone(),
            fast_config(),
        );
        (plane, state, observer)
    }

    async fn wait_for_status(state: &StateStore, status: TaskStatus) {
        for _ in 0..100 {
            if let Some(record) = state.get_running("job-1").unwrap()
                && record.status == status
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("status never became {status:?}");
    }

    #[tokio::test]
    async fn success_marker_writes_success() {
        let (plane, state, observer) = setup().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { observer.run(shutdown_rx).await });

        plane.push_log(POOL, COORDINATOR, "[START] job-1");
        plane.push_log(POOL, COORDINATOR, "[STATUS] 50%");
        plane.push_log(POOL, COORDINATOR, "[SUCCESS] done");

        wait_for_status(&state, TaskStatus::Success).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn error_marker_writes_failed() {
        let (plane, state, observer) = setup().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { observer.run(shutdown_rx).await });

        plane.push_log(POOL, COORDINATOR, "[START] job-1");
        plane.push_log(POOL, COORDINATOR, "[ERROR] exit code 1");

        wait_for_status(&state, TaskStatus::Failed).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stalled_progress_writes_failed() {
        let (plane, state, observer) = setup().await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { observer.run(shutdown_rx).await });

        plane.push_log(POOL, COORDINATOR, "[START] job-1");
        plane.push_log(POOL, COORDINATOR, "[STATUS] 40%");
        // No further lines: the stall timer must fire on its own.

        wait_for_status(&state, TaskStatus::Failed).await;
        handle.abort();
    }

    #[tokio::test]
    async fn stream_loss_mid_task_fails_and_terminates() {
        let (plane, state, observer) = setup().await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { observer.run(shutdown_rx).await });

        plane.push_log(POOL, COORDINATOR, "[START] job-1");
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Transport outage: streams die, the coordinator itself stays up.
        plane.drop_streams(POOL);

        wait_for_status(&state, TaskStatus::Failed).await;
        // The observer instance ends itself; recycle brings a new one.
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn dead_coordinator_fails_in_progress_task() {
        let (plane, state, observer) = setup().await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { observer.run(shutdown_rx).await });

        plane.push_log(POOL, COORDINATOR, "[START] job-1");
        tokio::time::sleep(Duration::from_millis(30)).await;
        plane.fail_node(POOL, COORDINATOR);
        // End the stream so the post-attempt liveness check runs.
        plane.drop_streams(POOL);

        wait_for_status(&state, TaskStatus::Failed).await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stream_end_with_no_task_reconnects() {
        let (plane, state, observer) = setup().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { observer.run(shutdown_rx).await });

        // First stream attempt dies with no task in progress.
        tokio::time::sleep(Duration::from_millis(30)).await;
        plane.drop_streams(POOL);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The observer reconnected and still reacts to markers.
        plane.push_log(POOL, COORDINATOR, "[START] job-1");
        plane.push_log(POOL, COORDINATOR, "[SUCCESS] done");
        wait_for_status(&state, TaskStatus::Success).await;

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_observer() {
        let (_plane, _state, observer) = setup().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { observer.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
