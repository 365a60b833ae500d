//! StateStore — redb-backed shared state for RenderGrid.
//!
//! Holds the FIFO task queue, the running-task set, the pool registry,
//! result bindings, and artifact blobs. All values are JSON-serialized into
//! redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(QUEUE).map_err(map_err!(Table))?;
        txn.open_table(RUNNING).map_err(map_err!(Table))?;
        txn.open_table(POOLS).map_err(map_err!(Table))?;
        txn.open_table(BINDINGS).map_err(map_err!(Table))?;
        txn.open_table(ARTIFACTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Task queue ─────────────────────────────────────────────────

    /// Append a task to the tail of the queue.
    pub fn enqueue(&self, task: &TaskSpec) -> StateResult<()> {
        let value = serde_json::to_vec(task).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(QUEUE).map_err(map_err!(Table))?;
            let next = match table.last().map_err(map_err!(Read))? {
                Some((key, _)) => key.value() + 1,
                None => 0,
            };
            table
                .insert(next, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(id = %task.id, "task enqueued");
        Ok(())
    }

    /// Pop the head of the queue. Non-blocking; `None` when empty.
    pub fn dequeue(&self) -> StateResult<Option<TaskSpec>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let popped = {
            let mut table = txn.open_table(QUEUE).map_err(map_err!(Table))?;
            let head = match table.first().map_err(map_err!(Read))? {
                Some((key, value)) => Some((key.value(), value.value().to_vec())),
                None => None,
            };
            match head {
                Some((seq, bytes)) => {
                    table.remove(seq).map_err(map_err!(Write))?;
                    Some(bytes)
                }
                None => None,
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        match popped {
            Some(bytes) => {
                let task: TaskSpec =
                    serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
                debug!(id = %task.id, "task dequeued");
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// Number of queued tasks.
    pub fn queue_len(&self) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(QUEUE).map_err(map_err!(Table))?;
        table.len().map_err(map_err!(Read))
    }

    // ── Running set ────────────────────────────────────────────────

    /// Insert a task record into the running set.
    pub fn add_running(&self, record: &TaskRecord) -> StateResult<()> {
        self.put_running(record)?;
        debug!(id = %record.task.id, pool = %record.pool, "task recorded running");
        Ok(())
    }

    /// Replace a running record in place (last-writer-wins).
    pub fn update_running(&self, record: &TaskRecord) -> StateResult<()> {
        self.put_running(record)?;
        debug!(id = %record.task.id, status = ?record.status, "running record updated");
        Ok(())
    }

    fn put_running(&self, record: &TaskRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RUNNING).map_err(map_err!(Table))?;
            table
                .insert(record.task.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// List all in-flight task records.
    pub fn list_running(&self) -> StateResult<Vec<TaskRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RUNNING).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: TaskRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Get a running record by task id.
    pub fn get_running(&self, id: &str) -> StateResult<Option<TaskRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RUNNING).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: TaskRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Find the running record bound to a pool, if any.
    pub fn find_running_for_pool(&self, pool: &str) -> StateResult<Option<TaskRecord>> {
        Ok(self
            .list_running()?
            .into_iter()
            .find(|record| record.pool == pool))
    }

    /// Remove a running record by task id. Returns true if it existed.
    ///
    /// Removing an absent record is a no-op, so concurrent duplicate
    /// removal attempts are safe.
    pub fn remove_running(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(RUNNING).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%id, existed, "running record removed");
        Ok(existed)
    }

    // ── Pool registry ──────────────────────────────────────────────

    /// Insert or update a pool registration.
    pub fn register_pool(&self, pool: &PoolRecord) -> StateResult<()> {
        let value = serde_json::to_vec(pool).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(POOLS).map_err(map_err!(Table))?;
            table
                .insert(pool.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(name = %pool.name, "pool registered");
        Ok(())
    }

    /// Remove a pool registration. Returns true if it existed.
    pub fn deregister_pool(&self, name: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(POOLS).map_err(map_err!(Table))?;
            existed = table.remove(name).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%name, existed, "pool deregistered");
        Ok(existed)
    }

    /// List all registered pools.
    pub fn list_pools(&self) -> StateResult<Vec<PoolRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POOLS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let pool: PoolRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(pool);
        }
        Ok(results)
    }

    /// Number of registered pools.
    pub fn count_pools(&self) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POOLS).map_err(map_err!(Table))?;
        table.len().map_err(map_err!(Read))
    }

    // ── Result bindings ────────────────────────────────────────────

    /// Bind a task id to a result sink.
    pub fn bind_result(&self, id: &str, sink: &ResultSink) -> StateResult<()> {
        let value = serde_json::to_vec(sink).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Resolve the result sink for a task id.
    pub fn resolve_result(&self, id: &str) -> StateResult<Option<ResultSink>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let sink: ResultSink =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(sink))
            }
            None => Ok(None),
        }
    }

    /// Remove a result binding. Returns true if it existed.
    pub fn remove_binding(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Artifacts ──────────────────────────────────────────────────

    /// Mark a task id as awaiting its artifact (empty-blob marker).
    pub fn mark_pending(&self, id: &str) -> StateResult<()> {
        let empty: &[u8] = &[];
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ARTIFACTS).map_err(map_err!(Table))?;
            table.insert(id, empty).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Store a finished artifact, clearing the pending marker.
    pub fn store_artifact(&self, id: &str, bytes: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ARTIFACTS).map_err(map_err!(Table))?;
            table.insert(id, bytes).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%id, len = bytes.len(), "artifact stored");
        Ok(())
    }

    /// Take an artifact for a task id.
    ///
    /// A ready artifact is consumed by this call; a pending marker or a
    /// missing entry leaves the table untouched.
    pub fn take_artifact(&self, id: &str) -> StateResult<ArtifactState> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let state = {
            let mut table = txn.open_table(ARTIFACTS).map_err(map_err!(Table))?;
            let found = match table.get(id).map_err(map_err!(Read))? {
                Some(guard) => Some(guard.value().to_vec()),
                None => None,
            };
            match found {
                None => ArtifactState::NotFound,
                Some(bytes) if bytes.is_empty() => ArtifactState::Pending,
                Some(bytes) => {
                    table.remove(id).map_err(map_err!(Write))?;
                    ArtifactState::Ready(bytes)
                }
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn test_task(id: &str) -> TaskSpec {
        let mut params = BTreeMap::new();
        params.insert("width".to_string(), ParamValue::Int(1920));
        params.insert("height".to_string(), ParamValue::Int(1080));
        params.insert("zoom".to_string(), ParamValue::Float(1.5));
        TaskSpec {
            id: id.to_string(),
            params,
            callback: None,
        }
    }

    fn test_record(id: &str, pool: &str) -> TaskRecord {
        TaskRecord {
            task: test_task(id),
            pool: pool.to_string(),
            status: TaskStatus::Running,
            dispatched_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_pool(name: &str) -> PoolRecord {
        PoolRecord {
            name: name.to_string(),
            nodes: 4,
            created_at: 1000,
        }
    }

    // ── Queue ──────────────────────────────────────────────────────

    #[test]
    fn queue_is_fifo() {
        let store = StateStore::open_in_memory().unwrap();
        store.enqueue(&test_task("a")).unwrap();
        store.enqueue(&test_task("b")).unwrap();
        store.enqueue(&test_task("c")).unwrap();

        assert_eq!(store.dequeue().unwrap().unwrap().id, "a");
        assert_eq!(store.dequeue().unwrap().unwrap().id, "b");
        assert_eq!(store.dequeue().unwrap().unwrap().id, "c");
        assert!(store.dequeue().unwrap().is_none());
    }

    #[test]
    fn dequeue_empty_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.dequeue().unwrap().is_none());
    }

    #[test]
    fn queue_len_tracks_enqueue_dequeue() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.queue_len().unwrap(), 0);

        store.enqueue(&test_task("a")).unwrap();
        store.enqueue(&test_task("b")).unwrap();
        assert_eq!(store.queue_len().unwrap(), 2);

        store.dequeue().unwrap();
        assert_eq!(store.queue_len().unwrap(), 1);
    }

    #[test]
    fn queue_order_survives_interleaved_enqueues() {
        let store = StateStore::open_in_memory().unwrap();
        store.enqueue(&test_task("a")).unwrap();
        store.enqueue(&test_task("b")).unwrap();
        assert_eq!(store.dequeue().unwrap().unwrap().id, "a");

        store.enqueue(&test_task("c")).unwrap();
        assert_eq!(store.dequeue().unwrap().unwrap().id, "b");
        assert_eq!(store.dequeue().unwrap().unwrap().id, "c");
    }

    #[test]
    fn task_params_round_trip() {
        let store = StateStore::open_in_memory().unwrap();
        let task = test_task("a");
        store.enqueue(&task).unwrap();

        let back = store.dequeue().unwrap().unwrap();
        assert_eq!(back, task);
        assert_eq!(back.params["width"].as_int(), Some(1920));
        assert_eq!(back.params["zoom"].as_float(), Some(1.5));
    }

    // ── Running set ────────────────────────────────────────────────

    #[test]
    fn running_add_list_remove() {
        let store = StateStore::open_in_memory().unwrap();
        store.add_running(&test_record("a", "render-pool-1")).unwrap();
        store.add_running(&test_record("b", "render-pool-2")).unwrap();

        assert_eq!(store.list_running().unwrap().len(), 2);
        assert!(store.remove_running("a").unwrap());
        assert_eq!(store.list_running().unwrap().len(), 1);
    }

    #[test]
    fn remove_running_is_idempotent() {
        let store = StateStore::open_in_memory().unwrap();
        store.add_running(&test_record("a", "render-pool-1")).unwrap();

        assert!(store.remove_running("a").unwrap());
        // Second removal is a no-op, not an error.
        assert!(!store.remove_running("a").unwrap());
        assert!(store.list_running().unwrap().is_empty());
    }

    #[test]
    fn task_id_in_at_most_one_place() {
        let store = StateStore::open_in_memory().unwrap();
        let task = test_task("a");

        // Queued: in queue, not running.
        store.enqueue(&task).unwrap();
        assert_eq!(store.queue_len().unwrap(), 1);
        assert!(store.get_running("a").unwrap().is_none());

        // Dispatch: dequeue then mark running.
        let dispatched = store.dequeue().unwrap().unwrap();
        store
            .add_running(&TaskRecord {
                task: dispatched,
                pool: "render-pool-1".to_string(),
                status: TaskStatus::Running,
                dispatched_at: 1000,
                updated_at: 1000,
            })
            .unwrap();
        assert_eq!(store.queue_len().unwrap(), 0);
        assert!(store.get_running("a").unwrap().is_some());

        // Completion: removed from running, not re-queued.
        store.remove_running("a").unwrap();
        assert_eq!(store.queue_len().unwrap(), 0);
        assert!(store.get_running("a").unwrap().is_none());
    }

    #[test]
    fn update_running_is_last_writer_wins() {
        let store = StateStore::open_in_memory().unwrap();
        let mut record = test_record("a", "render-pool-1");
        store.add_running(&record).unwrap();

        record.status = TaskStatus::Failed;
        record.updated_at = 2000;
        store.update_running(&record).unwrap();

        let back = store.get_running("a").unwrap().unwrap();
        assert_eq!(back.status, TaskStatus::Failed);
        assert_eq!(back.updated_at, 2000);
        assert_eq!(store.list_running().unwrap().len(), 1);
    }

    #[test]
    fn find_running_for_pool() {
        let store = StateStore::open_in_memory().unwrap();
        store.add_running(&test_record("a", "render-pool-1")).unwrap();
        store.add_running(&test_record("b", "render-pool-2")).unwrap();

        let found = store.find_running_for_pool("render-pool-2").unwrap().unwrap();
        assert_eq!(found.task.id, "b");
        assert!(store.find_running_for_pool("render-pool-9").unwrap().is_none());
    }

    // ── Pool registry ──────────────────────────────────────────────

    #[test]
    fn pool_register_count_deregister() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.count_pools().unwrap(), 0);

        store.register_pool(&test_pool("render-pool-1")).unwrap();
        store.register_pool(&test_pool("render-pool-2")).unwrap();
        assert_eq!(store.count_pools().unwrap(), 2);

        assert!(store.deregister_pool("render-pool-2").unwrap());
        assert!(!store.deregister_pool("render-pool-2").unwrap());
        assert_eq!(store.count_pools().unwrap(), 1);
    }

    #[test]
    fn pool_register_is_upsert() {
        let store = StateStore::open_in_memory().unwrap();
        store.register_pool(&test_pool("render-pool-1")).unwrap();

        let mut pool = test_pool("render-pool-1");
        pool.created_at = 2000;
        store.register_pool(&pool).unwrap();

        let pools = store.list_pools().unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].created_at, 2000);
    }

    // ── Result bindings ────────────────────────────────────────────

    #[test]
    fn binding_bind_resolve_remove() {
        let store = StateStore::open_in_memory().unwrap();
        store.bind_result("a", &ResultSink::Stored).unwrap();
        store
            .bind_result(
                "b",
                &ResultSink::Callback {
                    url: "http://client:8080/done".to_string(),
                },
            )
            .unwrap();

        assert_eq!(store.resolve_result("a").unwrap(), Some(ResultSink::Stored));
        assert!(matches!(
            store.resolve_result("b").unwrap(),
            Some(ResultSink::Callback { .. })
        ));
        assert!(store.resolve_result("c").unwrap().is_none());

        assert!(store.remove_binding("a").unwrap());
        assert!(!store.remove_binding("a").unwrap());
        assert!(store.resolve_result("a").unwrap().is_none());
    }

    // ── Artifacts ──────────────────────────────────────────────────

    #[test]
    fn artifact_pending_then_ready() {
        let store = StateStore::open_in_memory().unwrap();
        store.mark_pending("a").unwrap();
        assert_eq!(store.take_artifact("a").unwrap(), ArtifactState::Pending);
        // Pending lookup does not consume the marker.
        assert_eq!(store.take_artifact("a").unwrap(), ArtifactState::Pending);

        store.store_artifact("a", b"\x89PNG...").unwrap();
        assert_eq!(
            store.take_artifact("a").unwrap(),
            ArtifactState::Ready(b"\x89PNG...".to_vec())
        );
        // Consumed.
        assert_eq!(store.take_artifact("a").unwrap(), ArtifactState::NotFound);
    }

    #[test]
    fn artifact_unknown_id_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.take_artifact("nope").unwrap(), ArtifactState::NotFound);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.enqueue(&test_task("a")).unwrap();
            store.register_pool(&test_pool("render-pool-1")).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.queue_len().unwrap(), 1);
        assert_eq!(store.count_pools().unwrap(), 1);
        assert_eq!(store.dequeue().unwrap().unwrap().id, "a");
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.dequeue().unwrap().is_none());
        assert!(store.list_running().unwrap().is_empty());
        assert!(store.list_pools().unwrap().is_empty());
        assert!(!store.remove_running("nope").unwrap());
        assert!(!store.deregister_pool("nope").unwrap());
        assert!(!store.remove_binding("nope").unwrap());
    }
}
