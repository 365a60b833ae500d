//! Task-parameter schema and the versioned flag mapping.
//!
//! `ARGS_V1` is the contract between submitted parameters and the render
//! binary's command line: documented keys are forwarded in this fixed
//! order, unknown keys are dropped. Required keys are enforced at
//! submission time by `validate_params`; by dispatch time they are assumed
//! present.

use std::collections::BTreeMap;

use rendergrid_state::ParamValue;
use thiserror::Error;

/// Path of the render binary inside a pool node.
pub const RENDER_BIN: &str = "/opt/render/pathtrace";

/// Wrapper that runs the binary and emits the lifecycle markers
/// (`[START]`, `[SUCCESS]`, `[ERROR]`) on the coordinator's output.
pub const RUNNER_BIN: &str = "/opt/render/run-and-mark";

/// Version 1 of the parameter → flag mapping, in forwarding order.
pub const ARGS_V1: &[(&str, &str)] = &[
    ("width", "--width"),
    ("height", "--height"),
    ("block_size", "--block-size"),
    ("samples", "--samples"),
    ("camera_x", "--camera-x"),
    ("camera_y", "--camera-y"),
    ("zoom", "--zoom"),
    ("render_type", "--type"),
    ("color_mode", "--color-mode"),
];

/// Required integer parameters.
const INT_PARAMS: &[&str] = &[
    "width",
    "height",
    "block_size",
    "samples",
    "render_type",
    "color_mode",
];

/// Required float parameters (integers coerce).
const FLOAT_PARAMS: &[&str] = &["camera_x", "camera_y", "zoom"];

/// A submitted parameter map that fails schema validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("missing required parameter: {0}")]
    Missing(String),

    #[error("parameter {key} must be {expected}")]
    WrongType { key: String, expected: &'static str },
}

/// Validate a parameter map against the documented schema.
///
/// This is the submission-time hook; the dispatcher never re-validates.
pub fn validate_params(params: &BTreeMap<String, ParamValue>) -> Result<(), ParamError> {
    for key in INT_PARAMS {
        match params.get(*key) {
            None => return Err(ParamError::Missing(key.to_string())),
            Some(value) if value.as_int().is_none() => {
                return Err(ParamError::WrongType {
                    key: key.to_string(),
                    expected: "an integer",
                });
            }
            Some(_) => {}
        }
    }
    for key in FLOAT_PARAMS {
        match params.get(*key) {
            None => return Err(ParamError::Missing(key.to_string())),
            Some(value) if value.as_float().is_none() => {
                return Err(ParamError::WrongType {
                    key: key.to_string(),
                    expected: "a number",
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Translate a parameter map into the ordered flag list.
///
/// Only keys documented in `ARGS_V1` are forwarded; anything else in the
/// map is ignored.
pub fn build_args(params: &BTreeMap<String, ParamValue>) -> Vec<String> {
    let mut args = Vec::new();
    for (key, flag) in ARGS_V1 {
        if let Some(value) = params.get(*key) {
            args.push(flag.to_string());
            args.push(value.to_string());
        }
    }
    args
}

/// Build the coordinator exec command for a task.
///
/// The command fans the job out over every node in the roster via
/// `mpiexec`, wrapped in the marker-emitting runner.
pub fn exec_command(nodes: u32, roster: &[String], args: &[String]) -> Vec<String> {
    let line = format!(
        "{RUNNER_BIN} mpiexec -n {nodes} -host {} {RENDER_BIN} {}",
        roster.join(","),
        args.join(" "),
    );
    vec!["/bin/sh".to_string(), "-c".to_string(), line]
}
