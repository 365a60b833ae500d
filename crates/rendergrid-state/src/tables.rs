//! redb table definitions for the RenderGrid state store.
//!
//! String-keyed tables use the task id or pool name as the key and hold
//! JSON-serialized domain types. The queue table is keyed by a monotonically
//! increasing `u64` sequence number so that iteration order is FIFO order.

use redb::TableDefinition;

/// Queued tasks keyed by enqueue sequence number.
pub const QUEUE: TableDefinition<u64, &[u8]> = TableDefinition::new("queue");

/// In-flight task records keyed by task id.
pub const RUNNING: TableDefinition<&str, &[u8]> = TableDefinition::new("running");

/// Registered worker pools keyed by pool name.
pub const POOLS: TableDefinition<&str, &[u8]> = TableDefinition::new("pools");

/// Result bindings keyed by task id.
pub const BINDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("bindings");

/// Artifact blobs keyed by task id. An empty value is the pending marker.
pub const ARTIFACTS: TableDefinition<&str, &[u8]> = TableDefinition::new("artifacts");
