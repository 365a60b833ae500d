//! rendergrid-autoscale — load-ratio pool scaling.
//!
//! Each tick reads queue depth and pool count from the state store and
//! moves the fleet by at most one pool:
//!
//! ```text
//! ratio = pending / max(pools, 1)      (pending itself when pools == 0)
//!
//! ratio > threshold            → provision pool (ordinal = max + 1)
//! ratio < threshold, pools > 1 → tear down the highest-ordinal pool
//! ```
//!
//! The same tick independently reconciles the running set: completed
//! records are cleared, failed records are re-queued exactly once and
//! their pool is recycled (delete, confirm gone, recreate) so the retry
//! lands on a clean environment.
//!
//! No state persists between ticks; a tick that fails is logged and the
//! loop simply runs again on the next interval.

pub mod scaler;

pub use scaler::{evaluate, Autoscaler, AutoscalerConfig, ScaleDecision, DEFAULT_THRESHOLD};
