//! Override file backups
//!
//! Every apply and discard first copies the override file into the backup
//! directory as `<file-name>_<unix-timestamp>`. Copies are verified by
//! comparing SHA-256 digests of source and copy.

use chrono::{DateTime, TimeZone, Utc};
use pgadvise_common::config::{PathsConfig, AUTO_CONF_FILE};
use pgadvise_common::{AdvisorError, Result};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One backup copy on disk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupEntry {
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Backups of one override file
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    source: PathBuf,
    file_name: String,
    pattern: Regex,
}

impl BackupStore {
    /// Store for backups of `source` kept in `dir`.
    pub fn new(dir: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Result<Self> {
        let source = source.into();
        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                AdvisorError::Config(format!("invalid override file path {}", source.display()))
            })?
            .to_string();
        let pattern = Regex::new(&format!(r"^{}_(\d{{10}})$", regex::escape(&file_name)))
            .map_err(|e| AdvisorError::Config(e.to_string()))?;

        Ok(Self {
            dir: dir.into(),
            source,
            file_name,
            pattern,
        })
    }

    /// Store built from configuration alone, without asking the server where
    /// its configuration lives. Enough for listing backups; when no path is
    /// configured the override file keeps its stock name.
    pub fn from_paths(paths: &PathsConfig) -> Result<Self> {
        let source = match (&paths.auto_conf_file, &paths.config_file) {
            (Some(auto_conf), _) => auto_conf.clone(),
            (None, Some(config_file)) => paths.resolve_auto_conf(config_file),
            (None, None) => PathBuf::from(AUTO_CONF_FILE),
        };
        Self::new(&paths.backup_dir, source)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file being backed up
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Copy the override file into the backup directory.
    pub fn backup(&self) -> Result<BackupEntry> {
        self.backup_at(Utc::now())
    }

    fn backup_at(&self, now: DateTime<Utc>) -> Result<BackupEntry> {
        if !self.source.is_file() {
            return Err(AdvisorError::Backup(format!(
                "{} does not exist",
                self.source.display()
            )));
        }
        fs::create_dir_all(&self.dir).map_err(|e| {
            AdvisorError::Backup(format!("cannot create {}: {}", self.dir.display(), e))
        })?;

        let name = format!("{}_{}", self.file_name, now.timestamp());
        let path = self.dir.join(&name);
        fs::copy(&self.source, &path).map_err(|e| {
            AdvisorError::Backup(format!("cannot copy to {}: {}", path.display(), e))
        })?;

        let expected = digest(&self.source)?;
        let actual = digest(&path)?;
        if expected != actual {
            return Err(AdvisorError::Backup(format!(
                "checksum mismatch for {} ({} != {})",
                path.display(),
                actual,
                expected
            )));
        }

        info!(backup = %path.display(), sha256 = %actual, "Override file backed up");
        Ok(BackupEntry {
            name,
            path,
            created_at: now,
        })
    }

    /// Backups newest first. Files that do not follow the naming scheme are
    /// ignored; a missing directory means no backups.
    pub fn list(&self) -> Result<Vec<BackupEntry>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AdvisorError::Backup(format!(
                    "cannot read {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            match self.parse_backup_name(&name) {
                Ok(created_at) => backups.push(BackupEntry {
                    name,
                    path: entry.path(),
                    created_at,
                }),
                Err(_) => debug!(file = %name, "Ignoring file in backup directory"),
            }
        }

        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    /// Validate a backup identifier and return its creation time.
    pub fn parse_backup_name(&self, name: &str) -> Result<DateTime<Utc>> {
        let invalid = || {
            AdvisorError::invalid_input(format!("'{}' is not a backup of {}", name, self.file_name))
        };

        let captures = self.pattern.captures(name).ok_or_else(invalid)?;
        let seconds: i64 = captures[1].parse().map_err(|_| invalid())?;
        Utc.timestamp_opt(seconds, 0).single().ok_or_else(invalid)
    }
}

fn digest(path: &Path) -> Result<String> {
    let data = fs::read(path)
        .map_err(|e| AdvisorError::Backup(format!("cannot read {}: {}", path.display(), e)))?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}
