//! Command-line front-end.

pub mod commands;
pub mod output;
pub mod types;

use std::process::ExitCode;

use crate::domain::errors::DomainError;

pub use types::{Cli, Commands};

/// Whether a failed command should end the process with a non-zero code.
///
/// Fatal stages, a missing state file and configuration problems are
/// failures; anything else is reported and the process exits cleanly.
pub fn is_failure(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<DomainError>() {
        Some(
            DomainError::FatalStage { .. }
            | DomainError::StateNotFound(_)
            | DomainError::ValidationFailed(_),
        ) => true,
        Some(_) => false,
        None => true,
    }
}

/// Report a command error on stderr and pick the exit code.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ExitCode {
    if json_mode {
        let body = serde_json::json!({ "error": format!("{err:#}") });
        eprintln!("{body}");
    } else {
        eprintln!("Error: {err:#}");
    }
    if is_failure(err) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
