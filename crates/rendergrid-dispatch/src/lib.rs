//! rendergrid-dispatch — pool provisioning and task dispatch.
//!
//! The dispatcher pulls one queued task at a time, binds it to a worker
//! pool (provisioning one when needed), and issues the render command to
//! the pool's coordinator node. Completion is never awaited here; the
//! observer reports it through the state store.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher
//!   ├── StateStore (dequeue, running records, pool registry)
//!   ├── PoolProvisioner
//!   │   ├── ensure_pool / wait_ready / recycle
//!   │   └── roster + hostfile push to the coordinator
//!   └── ARGS_V1 (versioned parameter → flag mapping)
//! ```

pub mod args;
pub mod dispatcher;
pub mod error;
pub mod provisioner;

pub use args::{build_args, exec_command, validate_params, ParamError, ARGS_V1};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{DispatchError, DispatchResult};
pub use provisioner::{PoolProvisioner, ProvisionerConfig};
