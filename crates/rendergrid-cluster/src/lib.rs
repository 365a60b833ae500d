//! rendergrid-cluster — the control-plane seam for RenderGrid.
//!
//! The actual cluster (node sets, network endpoints, remote exec, log
//! tailing) is an external collaborator; this crate defines the
//! [`ControlPlane`] trait the orchestration components program against,
//! the pool/node naming scheme, and [`LocalControlPlane`], an in-process
//! implementation used by tests and `renderd`'s standalone mode.
//!
//! # Naming
//!
//! Pools are `render-pool-<ordinal>`; the ordinal set is gap-tolerant and
//! the next ordinal is always max + 1. Nodes inside a pool are
//! `<pool>-node-<index>` with stable DNS-style addresses; node 0 is the
//! pool's coordinator.

pub mod error;
pub mod local;
pub mod naming;
pub mod plane;

pub use error::{ClusterError, ClusterResult};
pub use local::LocalControlPlane;
pub use plane::{ControlPlane, LogStream, NodePhase, NodeStatus};
