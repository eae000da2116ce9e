//! Mesh node binary: command-line entry point. The observability HTTP
//! surface (§6) is an external collaborator this workspace only talks to
//! as a client (`pysim_url`); it is not implemented here. Library crate
//! exists so `cli::Cli` is unit-testable without going through `main`.

pub mod cli;
pub mod error;

pub use cli::Cli;
pub use error::{CliError, Result};
