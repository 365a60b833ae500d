//! Domain types for the RenderGrid state store.
//!
//! These types represent the persisted state of tasks, pools, and result
//! bindings. All types are serializable to/from JSON for storage in redb
//! tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier for a render task (opaque, assigned at submission).
pub type TaskId = String;

/// Name of a worker pool (`render-pool-<ordinal>`).
pub type PoolName = String;

// ── Task ──────────────────────────────────────────────────────────

/// A scalar task parameter as submitted by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Integer value, if this parameter is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value; integers coerce losslessly enough for camera params.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(v) => write!(f, "{v}"),
        }
    }
}

/// A submitted render task, as it sits in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    /// Job-specific scalar parameters (width, height, samples, ...).
    pub params: BTreeMap<String, ParamValue>,
    /// Callback URL for result delivery; `None` means store for pickup.
    pub callback: Option<String>,
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    /// Whether this status ends the task's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

/// An in-flight task record: the task plus its pool binding and status.
///
/// Lives in the running set from dispatch until the autoscaler reconciles
/// its terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task: TaskSpec,
    /// The pool this task is bound to.
    pub pool: PoolName,
    pub status: TaskStatus,
    /// Unix timestamp (seconds) when the task was dispatched.
    pub dispatched_at: u64,
    /// Unix timestamp (seconds) of the last status change.
    pub updated_at: u64,
}

// ── Pool ──────────────────────────────────────────────────────────

/// A registered worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRecord {
    pub name: PoolName,
    /// Fixed number of compute nodes in this pool.
    pub nodes: u32,
    /// Unix timestamp (seconds) when this pool was provisioned.
    pub created_at: u64,
}

// ── Result binding ────────────────────────────────────────────────

/// Where a finished artifact should go.
///
/// Exists for a task id from submission until the artifact is delivered
/// (or permanently fails).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultSink {
    /// Keep the artifact in the store for later pickup.
    Stored,
    /// Forward the artifact to a callback URL.
    Callback { url: String },
}

/// Outcome of an artifact lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactState {
    /// The artifact arrived; the bytes are consumed by this lookup.
    Ready(Vec<u8>),
    /// A pending marker exists but no payload has arrived yet.
    Pending,
    /// No artifact and no pending marker for this id.
    NotFound,
}
