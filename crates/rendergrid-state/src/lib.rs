//! rendergrid-state — shared state store for RenderGrid.
//!
//! Backed by [redb](https://docs.rs/redb), holds the task queue, the
//! in-flight running set, the pool registry, result bindings, and finished
//! artifacts. Every other component treats this store as the only source of
//! truth; none of them holds durable local state.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! The queue is a `u64`-sequence-keyed table (append at max+1, pop at min)
//! which gives FIFO order without a list primitive. Every operation is
//! atomic at single-record granularity; no multi-record transaction is
//! offered or assumed, so cross-record workflows must be sequences of
//! independently idempotent steps.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
