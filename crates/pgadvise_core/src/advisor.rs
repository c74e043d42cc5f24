//! The advisor aggregate
//!
//! Owns the collaborators (catalog, host probe, service controller, backup
//! store) and the rule registry, and exposes the four operations drivers
//! call: all suggestions, one suggestion, apply and discard.
//!
//! Every operation starts from a fresh snapshot. Operations are serialised
//! by one async mutex so a check never interleaves with an apply.

use crate::backup::{BackupEntry, BackupStore};
use crate::catalog::{self, load_snapshot, PgCatalog, SettingsCatalog, Snapshot};
use crate::probe::{collect_facts, HostProbe, LinuxHostProbe};
use crate::rules::RuleRegistry;
use crate::service::{self, ServiceController};
use chrono::{DateTime, Utc};
use pgadvise_common::{
    AdvisorConfig, AdvisorError, HostFacts, ResourceSetting, Result, SuggestionPatch,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// Counts over one report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Settings with a value to apply
    pub suggested: usize,
    /// Checks that failed
    pub errored: usize,
    /// Checks with nothing to change
    pub passed: usize,
}

/// Result of one check cycle
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub summary: Summary,
    pub settings: BTreeMap<String, ResourceSetting>,
}

impl Report {
    pub fn new(settings: BTreeMap<String, ResourceSetting>) -> Self {
        let mut summary = Summary::default();
        for setting in settings.values() {
            if setting.got_error {
                summary.errored += 1;
            } else if setting.suggested_value.is_some() {
                summary.suggested += 1;
            } else {
                summary.passed += 1;
            }
        }
        Self {
            generated_at: Utc::now(),
            summary,
            settings,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResourceSetting> {
        self.settings.get(name)
    }

    /// Every actionable suggestion as a patch
    pub fn patches(&self) -> Vec<SuggestionPatch> {
        self.settings
            .values()
            .filter(|s| !s.got_error)
            .filter_map(|s| {
                s.suggested_value
                    .as_ref()
                    .map(|v| SuggestionPatch::new(&s.name, v))
            })
            .collect()
    }
}

/// Result of a fully successful apply
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub backup: BackupEntry,
    pub applied: Vec<SuggestionPatch>,
    /// Applied settings that only change on restart
    pub restart_needed: Vec<String>,
}

/// The advisory engine
pub struct Advisor {
    catalog: Arc<dyn SettingsCatalog>,
    probe: Arc<dyn HostProbe>,
    service: Arc<dyn ServiceController>,
    backups: BackupStore,
    registry: RuleRegistry,
    cycle: Mutex<()>,
    last: RwLock<Option<Report>>,
}

impl Advisor {
    pub fn new(
        catalog: Arc<dyn SettingsCatalog>,
        probe: Arc<dyn HostProbe>,
        service: Arc<dyn ServiceController>,
        backups: BackupStore,
        registry: RuleRegistry,
    ) -> Self {
        Self {
            catalog,
            probe,
            service,
            backups,
            registry,
            cycle: Mutex::new(()),
            last: RwLock::new(None),
        }
    }

    /// Build a production advisor: connect to the server, discover the
    /// override file when it is not configured, and pick the service
    /// controller for the configured mode.
    pub async fn connect(config: &AdvisorConfig) -> Result<Self> {
        let catalog = PgCatalog::connect(&config.database).await?;

        let config_file: PathBuf = match &config.paths.config_file {
            Some(path) => path.clone(),
            None => catalog.config_file().await?,
        };
        let auto_conf = config.paths.resolve_auto_conf(&config_file);
        info!(
            config_file = %config_file.display(),
            override_file = %auto_conf.display(),
            "Configuration files resolved"
        );

        let backups = BackupStore::new(&config.paths.backup_dir, auto_conf)?;
        let service = service::from_config(&config.service, catalog.pool())?;

        Ok(Self::new(
            Arc::new(catalog),
            Arc::new(LinuxHostProbe::new()),
            service,
            backups,
            RuleRegistry::standard(&config.rules),
        ))
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Evaluate every tracked setting against a fresh snapshot.
    pub async fn all_suggestions(&self) -> Result<Report> {
        let _cycle = self.cycle.lock().await;
        let (snapshot, host) = self.observe().await?;

        let report = Report::new(self.registry.evaluate_all(&snapshot, &host));
        info!(
            suggested = report.summary.suggested,
            errored = report.summary.errored,
            passed = report.summary.passed,
            "Check cycle finished"
        );

        *self.last.write().await = Some(report.clone());
        Ok(report)
    }

    /// Evaluate one tracked setting against a fresh snapshot.
    pub async fn suggestion(&self, name: &str) -> Result<ResourceSetting> {
        if !catalog::is_tracked(name) {
            return Err(AdvisorError::NotFound(name.to_string()));
        }
        let _cycle = self.cycle.lock().await;
        let (snapshot, host) = self.observe().await?;
        self.registry.evaluate_one(name, &snapshot, &host)
    }

    /// Persist accepted suggestions and make them effective.
    ///
    /// The override file is backed up before anything is written. Items are
    /// applied independently; failed items are collected and reported as
    /// `PartialFailure` after the rest of the batch went through. A failing
    /// reload is reported as `ReloadFailed`, naming both the written and the
    /// failed items.
    pub async fn apply_suggestions(
        &self,
        patches: &[SuggestionPatch],
    ) -> Result<ApplyOutcome> {
        if patches.is_empty() {
            return Err(AdvisorError::invalid_input("no suggestions to apply"));
        }

        let _cycle = self.cycle.lock().await;
        let snapshot = load_snapshot(self.catalog.as_ref()).await?;
        let backup = self.backups.backup()?;

        let mut applied = Vec::new();
        let mut restart_needed = Vec::new();
        let mut failed = Vec::new();
        for patch in patches {
            match self.apply_one(&snapshot, patch).await {
                Ok(needs_restart) => {
                    info!(
                        setting = %patch.name,
                        value = %patch.suggested_value,
                        "Override persisted"
                    );
                    if needs_restart {
                        restart_needed.push(patch.name.clone());
                    }
                    applied.push(patch.clone());
                }
                Err(e) => {
                    warn!(setting = %patch.name, "Could not apply suggestion: {}", e);
                    failed.push(patch.name.clone());
                }
            }
        }

        *self.last.write().await = None;
        if !applied.is_empty() {
            if let Err(e) = self.service.reload().await {
                error!("Overrides persisted but the service did not reload: {}", e);
                return Err(AdvisorError::ReloadFailed {
                    reason: e.to_string(),
                    applied: applied.into_iter().map(|p| p.name).collect(),
                    failed,
                });
            }
        }

        if !failed.is_empty() {
            return Err(AdvisorError::PartialFailure { failed });
        }
        Ok(ApplyOutcome {
            backup,
            applied,
            restart_needed,
        })
    }

    /// Validate and persist one patch. Returns whether it needs a restart.
    async fn apply_one(&self, snapshot: &Snapshot, patch: &SuggestionPatch) -> Result<bool> {
        if !catalog::is_tracked(&patch.name) {
            return Err(AdvisorError::NotFound(patch.name.clone()));
        }
        let setting = snapshot.get(&patch.name)?;
        setting.validate_enum(&patch.suggested_value)?;
        self.catalog
            .alter_system(&patch.name, &patch.suggested_value)
            .await?;
        Ok(setting.is_postmaster())
    }

    /// Drop every override and reload. The override file is backed up first.
    pub async fn discard_overrides(&self) -> Result<BackupEntry> {
        let _cycle = self.cycle.lock().await;
        let backup = self.backups.backup()?;
        self.catalog.reset_all().await?;
        info!("All overrides removed");
        self.service.reload().await?;
        *self.last.write().await = None;
        Ok(backup)
    }

    /// Report of the last check cycle, if no apply or discard happened since.
    pub async fn last_report(&self) -> Option<Report> {
        self.last.read().await.clone()
    }

    async fn observe(&self) -> Result<(Snapshot, HostFacts)> {
        let snapshot = load_snapshot(self.catalog.as_ref()).await?;
        let probe = Arc::clone(&self.probe);
        let host = tokio::task::spawn_blocking(move || collect_facts(probe.as_ref()))
            .await
            .map_err(|e| AdvisorError::probe(format!("probe task failed: {}", e)))?;
        Ok((snapshot, host))
    }
}
