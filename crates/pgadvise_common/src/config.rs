//! Advisor configuration
//!
//! Loads settings from /etc/pgadvise/config.toml or uses defaults.

use crate::error::{AdvisorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/pgadvise/config.toml";

/// Default directory for override file backups
pub const DEFAULT_BACKUP_DIR: &str = "/var/lib/pgadvise/backups";

/// Name of the file PostgreSQL writes `ALTER SYSTEM` overrides to
pub const AUTO_CONF_FILE: &str = "postgresql.auto.conf";

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a connection before giving up
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_database_url() -> String {
    "postgres://postgres@localhost:5432/postgres".to_string()
}

fn default_max_connections() -> u32 {
    2
}

fn default_connect_timeout() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// File system locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Primary postgresql.conf; discovered from the server when unset
    #[serde(default)]
    pub config_file: Option<PathBuf>,

    /// Override file; defaults to postgresql.auto.conf next to the primary file
    #[serde(default)]
    pub auto_conf_file: Option<PathBuf>,

    /// Where override file backups are kept
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BACKUP_DIR)
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            auto_conf_file: None,
            backup_dir: default_backup_dir(),
        }
    }
}

impl PathsConfig {
    /// Resolve the override file for a known primary config file.
    pub fn resolve_auto_conf(&self, config_file: &Path) -> PathBuf {
        match &self.auto_conf_file {
            Some(path) => path.clone(),
            None => config_file
                .parent()
                .unwrap_or_else(|| Path::new("/"))
                .join(AUTO_CONF_FILE),
        }
    }
}

/// How new settings are made effective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    /// Restart the service; required for startup-only parameters
    #[default]
    Restart,
    /// Ask the server to re-read its configuration files
    Reload,
}

/// Database service control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub mode: ServiceMode,

    /// Command run in restart mode
    #[serde(default = "default_restart_command")]
    pub restart_command: Vec<String>,
}

fn default_restart_command() -> Vec<String> {
    vec![
        "systemctl".to_string(),
        "restart".to_string(),
        "postgresql".to_string(),
    ]
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            mode: ServiceMode::default(),
            restart_command: default_restart_command(),
        }
    }
}

/// Rule tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Upper bound for max_stack_depth suggestions, in the setting's unit.
    /// Some platforms refuse values above this even though they are below
    /// the parameter's declared maximum. Zero disables the cap.
    #[serde(default = "default_stack_depth_cap")]
    pub max_stack_depth_cap: Option<i64>,
}

impl RulesConfig {
    /// Effective cap, `None` when disabled
    pub fn stack_depth_cap(&self) -> Option<i64> {
        self.max_stack_depth_cap.filter(|cap| *cap > 0)
    }
}

fn default_stack_depth_cap() -> Option<i64> {
    Some(4096)
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            max_stack_depth_cap: default_stack_depth_cap(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when PGADVISE_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file that error messages point users to
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Complete advisor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvisorConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AdvisorConfig {
    /// Load from `path`. A missing file yields defaults; an unreadable or
    /// malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| AdvisorError::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| AdvisorError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AdvisorError::Config(e.to_string()))
    }

    /// Load from the system path.
    pub fn load_system() -> Result<Self> {
        Self::load(CONFIG_PATH)
    }
}
