//! Error handling for the mesh node binary.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("mesh core error: {0}")]
    Mesh(#[from] mesh_core::MeshError),

    #[error("node runtime error: {0}")]
    Runtime(#[from] mesh_runtime::RuntimeError),

    #[error("simulation controller unreachable at `{0}`: {1}")]
    ControllerUnreachable(String, String),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
