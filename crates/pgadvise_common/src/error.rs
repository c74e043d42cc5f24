//! Error taxonomy shared by the advisory engine and its drivers.

use thiserror::Error;

/// Result type used across pgadvise crates.
pub type Result<T> = std::result::Result<T, AdvisorError>;

/// Advisory engine errors.
#[derive(Error, Debug)]
pub enum AdvisorError {
    /// An operating system resource could not be read
    #[error("Host probe failed: {0}")]
    Probe(String),

    /// The database was unreachable or a catalog query failed
    #[error("Settings query failed: {0}")]
    Query(String),

    /// Unit token outside B, kB, 8kB, MB
    #[error("Unsupported unit: {0}")]
    UnsupportedUnit(String),

    /// Candidate value is absent from the live enum set
    #[error("'{value}' is not an allowed value for {setting} (allowed: {allowed})")]
    EnumValidation {
        setting: String,
        value: String,
        allowed: String,
    },

    /// One or more items of an apply batch failed
    #[error("{} suggestion(s) could not be applied: {}", failed.len(), failed.join(", "))]
    PartialFailure { failed: Vec<String> },

    /// Setting is not tracked by the advisor
    #[error("No resource setting named {0}")]
    NotFound(String),

    /// Malformed client input (empty batch, bad backup identifier, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Catalog value that does not fit the setting's declared type
    #[error("Setting {name} has a malformed value: {value}")]
    MalformedValue { name: String, value: String },

    /// A setting a rule depends on is absent from the snapshot
    #[error("Setting {0} is missing from the snapshot")]
    MissingSetting(String),

    /// Backup of the override file failed
    #[error("Backup failed: {0}")]
    Backup(String),

    /// Reload or restart of the database service failed
    #[error("Service reload failed: {0}")]
    Service(String),

    /// Overrides were written but the service did not pick them up
    #[error(
        "Service reload failed after writing {}: {reason}{}",
        applied.join(", "),
        not_applied(failed)
    )]
    ReloadFailed {
        reason: String,
        applied: Vec<String>,
        failed: Vec<String>,
    },

    /// Configuration file could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn not_applied(failed: &[String]) -> String {
    if failed.is_empty() {
        return String::new();
    }
    format!(" (not applied: {})", failed.join(", "))
}

impl AdvisorError {
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn malformed(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::MalformedValue {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Whether the error stems from what the caller sent rather than from
    /// the host, the database or the engine itself.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AdvisorError::InvalidInput(_)
                | AdvisorError::NotFound(_)
                | AdvisorError::EnumValidation { .. }
        )
    }
}
