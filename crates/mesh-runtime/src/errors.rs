//! Runtime-level errors: orchestration failures around spawning and
//! supervising a node's five device tasks, layered the same way the core
//! crate layers its own errors (one enum per concern, unified with `#[from]`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("node runtime is already running")]
    AlreadyRunning,

    #[error("node runtime is not running")]
    NotRunning,

    #[error("no device is wired for orientation `{0}`")]
    UnknownDevice(&'static str),

    #[error("device task did not reply before the query timed out")]
    QueryTimedOut,

    #[error(transparent)]
    Mesh(#[from] mesh_core::MeshError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
