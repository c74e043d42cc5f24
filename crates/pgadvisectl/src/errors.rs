//! Error codes and exit status for pgadvisectl

use pgadvise_common::AdvisorError;
use std::path::Path;

/// Exit code for success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for general errors
pub const EXIT_GENERAL_ERROR: i32 = 1;

/// Exit code for malformed input (unknown setting, bad value, empty batch)
pub const EXIT_INVALID_INPUT: i32 = 64;

/// Exit code when some items of an apply batch failed
pub const EXIT_PARTIAL_FAILURE: i32 = 65;

/// Exit code when the database is unavailable/unreachable
pub const EXIT_DATABASE_UNAVAILABLE: i32 = 70;

/// Exit code for an unusable configuration file
pub const EXIT_CONFIG_ERROR: i32 = 78;

/// Map an error to the process exit status.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<AdvisorError>() {
        Some(e) if e.is_client_error() => EXIT_INVALID_INPUT,
        Some(AdvisorError::PartialFailure { .. }) => EXIT_PARTIAL_FAILURE,
        Some(AdvisorError::Query(_)) => EXIT_DATABASE_UNAVAILABLE,
        Some(AdvisorError::Config(_)) => EXIT_CONFIG_ERROR,
        _ => EXIT_GENERAL_ERROR,
    }
}

/// Message shown to the user. Input mistakes and partial failures are
/// explained; anything else points to the log.
pub fn user_message(err: &anyhow::Error, log_file: Option<&Path>) -> String {
    match err.downcast_ref::<AdvisorError>() {
        Some(e) if e.is_client_error() => e.to_string(),
        Some(e @ AdvisorError::PartialFailure { .. }) => e.to_string(),
        Some(e @ AdvisorError::ReloadFailed { .. }) => e.to_string(),
        Some(e @ AdvisorError::Config(_)) => e.to_string(),
        _ => match log_file {
            Some(path) => format!("Operation failed. See {} for details.", path.display()),
            None => "Operation failed. Run with PGADVISE_LOG=debug for details.".to_string(),
        },
    }
}
