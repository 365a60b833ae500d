//! rendergrid-observe — log-derived progress and failure detection.
//!
//! One observer per active pool streams the coordinator node's output,
//! classifies each line into a lifecycle event, and writes the resulting
//! task status back to the state store. The observer is the only component
//! that can tell a live-but-stuck worker from a working one, and it does so
//! purely from the log stream: an unchanged progress percentage past the
//! stall timeout is a failure.
//!
//! # Architecture
//!
//! ```text
//! ObserverSet (one slot per registered pool)
//!   └── Observer::run
//!       ├── coordinator liveness check (before and after streaming)
//!       ├── classify() — pure line tagger
//!       ├── TaskWatch — progress/stall state machine
//!       └── status write-back (update running record, last-writer-wins)
//! ```

pub mod classifier;
pub mod observer;
pub mod supervisor;
pub mod watch;

pub use classifier::{classify, LineEvent};
pub use observer::{Observer, ObserverConfig};
pub use supervisor::ObserverSet;
pub use watch::{TaskOutcome, TaskWatch};
