//! Settings catalog access
//!
//! Reads the tracked parameters from `pg_settings` and writes overrides with
//! `ALTER SYSTEM`. `PgCatalog` talks to a live server; `FakeCatalog` keeps
//! rows in memory and records writes for tests.

use async_trait::async_trait;
use pgadvise_common::config::DatabaseConfig;
use pgadvise_common::{AdvisorError, ResourceSetting, Result, SettingValue};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Parameters the advisor reports on
pub const TRACKED_SETTINGS: [&str; 13] = [
    "shared_buffers",
    "huge_pages",
    "huge_page_size",
    "temp_buffers",
    "max_prepared_transactions",
    "work_mem",
    "hash_mem_multiplier",
    "maintenance_work_mem",
    "autovacuum_work_mem",
    "logical_decoding_work_mem",
    "max_stack_depth",
    "shared_memory_type",
    "dynamic_shared_memory_type",
];

/// Parameters the rules read but never suggest values for
pub const DEPENDENCY_SETTINGS: [&str; 2] = ["max_connections", "autovacuum_max_workers"];

pub fn is_tracked(name: &str) -> bool {
    TRACKED_SETTINGS.contains(&name)
}

/// Raw `pg_settings` row
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SettingRow {
    pub name: String,
    pub setting: Option<String>,
    pub unit: Option<String>,
    pub vartype: String,
    pub enumvals: Option<Vec<String>>,
    pub boot_val: Option<String>,
    pub context: Option<String>,
}

impl SettingRow {
    /// Row for an integer parameter
    pub fn integer(name: &str, setting: i64, unit: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            setting: Some(setting.to_string()),
            unit: unit.map(str::to_string),
            vartype: "integer".to_string(),
            enumvals: None,
            boot_val: None,
            context: None,
        }
    }

    /// Row for a real parameter
    pub fn real(name: &str, setting: f64) -> Self {
        Self {
            vartype: "real".to_string(),
            ..Self::integer(name, 0, None)
        }
        .with_setting(&setting.to_string())
    }

    /// Row for an enum parameter
    pub fn enumerated(name: &str, setting: &str, allowed: &[&str]) -> Self {
        Self {
            vartype: "enum".to_string(),
            enumvals: Some(allowed.iter().map(|v| v.to_string()).collect()),
            ..Self::integer(name, 0, None)
        }
        .with_setting(setting)
    }

    pub fn with_setting(mut self, setting: &str) -> Self {
        self.setting = Some(setting.to_string());
        self
    }

    pub fn with_boot_val(mut self, boot_val: &str) -> Self {
        self.boot_val = Some(boot_val.to_string());
        self
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context = Some(context.to_string());
        self
    }

    /// Type the row. Rows without a value cannot be typed.
    pub fn into_setting(self) -> Result<ResourceSetting> {
        let raw = self
            .setting
            .ok_or_else(|| AdvisorError::malformed(&self.name, "<null>"))?;
        let value = SettingValue::from_catalog(&self.name, &self.vartype, &raw, self.enumvals)?;
        let mut setting = ResourceSetting::new(self.name, value, self.unit.as_deref());
        setting.boot_val = self.boot_val;
        setting.context = self.context;
        Ok(setting)
    }
}

/// Typed view of the tracked and dependency parameters at one instant
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    settings: BTreeMap<String, ResourceSetting>,
}

impl Snapshot {
    pub fn from_settings(settings: impl IntoIterator<Item = ResourceSetting>) -> Self {
        Self {
            settings: settings.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Result<&ResourceSetting> {
        self.settings
            .get(name)
            .ok_or_else(|| AdvisorError::MissingSetting(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.settings.contains_key(name)
    }

    pub fn insert(&mut self, setting: ResourceSetting) {
        self.settings.insert(setting.name.clone(), setting);
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    /// Replace a value as if it had been applied on the server
    pub fn set_value(&mut self, name: &str, raw: &str) -> Result<()> {
        let setting = self
            .settings
            .get_mut(name)
            .ok_or_else(|| AdvisorError::MissingSetting(name.to_string()))?;
        let value = match &setting.value {
            SettingValue::Integer(_) => raw
                .parse()
                .map(SettingValue::Integer)
                .map_err(|_| AdvisorError::malformed(name, raw))?,
            SettingValue::Real(_) => raw
                .parse()
                .map(SettingValue::Real)
                .map_err(|_| AdvisorError::malformed(name, raw))?,
            SettingValue::Bool(_) => match raw {
                "on" | "true" => SettingValue::Bool(true),
                "off" | "false" => SettingValue::Bool(false),
                _ => return Err(AdvisorError::malformed(name, raw)),
            },
            SettingValue::Enum { allowed, .. } => SettingValue::Enum {
                value: raw.to_string(),
                allowed: allowed.clone(),
            },
            SettingValue::Text(_) => SettingValue::Text(raw.to_string()),
        };
        setting.value = value;
        Ok(())
    }
}

/// Database settings catalog interface
#[async_trait]
pub trait SettingsCatalog: Send + Sync {
    /// Fetch rows for the given parameter names. Unknown names are absent
    /// from the result rather than an error.
    async fn fetch_settings(&self, names: &[&str]) -> Result<Vec<SettingRow>>;

    /// Path of the primary configuration file
    async fn config_file(&self) -> Result<PathBuf>;

    /// Persist one system-level override
    async fn alter_system(&self, name: &str, value: &str) -> Result<()>;

    /// Remove every system-level override
    async fn reset_all(&self) -> Result<()>;
}

/// Load the tracked and dependency parameters into a typed snapshot.
///
/// A missing row for one name is skipped rather than failing the snapshot,
/// as is a row whose value does not fit its declared type.
pub async fn load_snapshot(catalog: &dyn SettingsCatalog) -> Result<Snapshot> {
    let names: Vec<&str> = TRACKED_SETTINGS
        .iter()
        .chain(DEPENDENCY_SETTINGS.iter())
        .copied()
        .collect();

    let rows = catalog.fetch_settings(&names).await?;
    let mut snapshot = Snapshot::default();
    for row in rows {
        let name = row.name.clone();
        match row.into_setting() {
            Ok(setting) => snapshot.insert(setting),
            Err(e) => warn!(setting = %name, "Skipping catalog row: {}", e),
        }
    }

    for name in &names {
        if !snapshot.contains(name) {
            warn!(setting = %name, "Setting not reported by the server");
        }
    }

    debug!(count = snapshot.len(), "Settings snapshot loaded");
    Ok(snapshot)
}

/// Build an `ALTER SYSTEM SET` statement.
///
/// `ALTER SYSTEM` does not take bind parameters, so the name is restricted
/// to identifier characters and the value is quoted as a literal.
pub fn alter_system_sql(name: &str, value: &str) -> Result<String> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
        return Err(AdvisorError::invalid_input(format!(
            "invalid parameter name '{}'",
            name
        )));
    }
    Ok(format!(
        "ALTER SYSTEM SET {} = '{}'",
        name,
        value.replace('\'', "''")
    ))
}

/// Catalog backed by a live PostgreSQL server
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    /// Connect using the configured URL.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| AdvisorError::query(format!("could not connect: {}", e)))?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SettingsCatalog for PgCatalog {
    async fn fetch_settings(&self, names: &[&str]) -> Result<Vec<SettingRow>> {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        sqlx::query_as::<_, SettingRow>(
            "SELECT name, setting, unit, vartype, enumvals, boot_val, context \
             FROM pg_settings WHERE name = ANY($1) ORDER BY name",
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AdvisorError::query(e.to_string()))
    }

    async fn config_file(&self) -> Result<PathBuf> {
        let path: String =
            sqlx::query_scalar("SELECT setting FROM pg_settings WHERE name = 'config_file'")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AdvisorError::query(e.to_string()))?;
        Ok(PathBuf::from(path))
    }

    async fn alter_system(&self, name: &str, value: &str) -> Result<()> {
        let sql = alter_system_sql(name, value)?;
        sqlx::raw_sql(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| AdvisorError::query(format!("{}: {}", name, e)))?;
        Ok(())
    }

    async fn reset_all(&self) -> Result<()> {
        sqlx::raw_sql("ALTER SYSTEM RESET ALL")
            .execute(&self.pool)
            .await
            .map_err(|e| AdvisorError::query(e.to_string()))?;
        Ok(())
    }
}

/// Tracked and dependency rows as a fresh cluster reports them
pub fn stock_rows() -> Vec<SettingRow> {
    vec![
        SettingRow::integer("shared_buffers", 16384, Some("8kB")).with_context("postmaster"),
        SettingRow::enumerated("huge_pages", "try", &["off", "on", "try"])
            .with_boot_val("try")
            .with_context("postmaster"),
        SettingRow::integer("huge_page_size", 0, Some("kB")).with_context("postmaster"),
        SettingRow::integer("temp_buffers", 1024, Some("8kB")).with_context("user"),
        SettingRow::integer("max_prepared_transactions", 0, None).with_context("postmaster"),
        SettingRow::integer("work_mem", 4096, Some("kB")).with_context("user"),
        SettingRow::real("hash_mem_multiplier", 2.0).with_context("user"),
        SettingRow::integer("maintenance_work_mem", 65536, Some("kB")).with_context("user"),
        SettingRow::integer("autovacuum_work_mem", -1, Some("kB")).with_context("sighup"),
        SettingRow::integer("logical_decoding_work_mem", 65536, Some("kB")).with_context("user"),
        SettingRow::integer("max_stack_depth", 2048, Some("kB")).with_context("superuser"),
        SettingRow::enumerated("shared_memory_type", "mmap", &["sysv", "mmap"])
            .with_boot_val("mmap")
            .with_context("postmaster"),
        SettingRow::enumerated("dynamic_shared_memory_type", "posix", &["posix", "sysv", "mmap"])
            .with_boot_val("posix")
            .with_context("postmaster"),
        SettingRow::integer("max_connections", 100, None).with_context("postmaster"),
        SettingRow::integer("autovacuum_max_workers", 3, None).with_context("postmaster"),
    ]
}

/// In-memory catalog for tests
#[derive(Debug, Default)]
pub struct FakeCatalog {
    rows: Mutex<BTreeMap<String, SettingRow>>,
    config_file: PathBuf,
    writes: Mutex<Vec<(String, String)>>,
    resets: Mutex<usize>,
    rejected: Mutex<Vec<String>>,
    unreachable: AtomicBool,
}

impl FakeCatalog {
    pub fn new(rows: impl IntoIterator<Item = SettingRow>) -> Self {
        Self {
            rows: Mutex::new(rows.into_iter().map(|r| (r.name.clone(), r)).collect()),
            config_file: PathBuf::from("/var/lib/pgsql/data/postgresql.conf"),
            ..Default::default()
        }
    }

    /// Catalog holding the stock defaults of a fresh PostgreSQL 16 cluster
    pub fn stock() -> Self {
        Self::new(stock_rows())
    }

    /// Replace or add one row
    pub fn with_row(self, row: SettingRow) -> Self {
        self.lock_rows().insert(row.name.clone(), row);
        self
    }

    pub fn without(self, name: &str) -> Self {
        self.lock_rows().remove(name);
        self
    }

    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = path.into();
        self
    }

    /// Make `alter_system` fail for this parameter
    pub fn reject(&self, name: &str) {
        self.lock_rejected().push(name.to_string());
    }

    /// Simulate a lost connection
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Change a value behind the advisor's back
    pub fn set_value(&self, name: &str, value: &str) {
        if let Some(row) = self.lock_rows().get_mut(name) {
            row.setting = Some(value.to_string());
        }
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn reset_count(&self) -> usize {
        self.resets.lock().map(|r| *r).unwrap_or_default()
    }

    fn lock_rows(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, SettingRow>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_rejected(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.rejected.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AdvisorError::query("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsCatalog for FakeCatalog {
    async fn fetch_settings(&self, names: &[&str]) -> Result<Vec<SettingRow>> {
        self.check_reachable()?;
        let rows = self.lock_rows();
        Ok(names.iter().filter_map(|n| rows.get(*n).cloned()).collect())
    }

    async fn config_file(&self) -> Result<PathBuf> {
        self.check_reachable()?;
        Ok(self.config_file.clone())
    }

    async fn alter_system(&self, name: &str, value: &str) -> Result<()> {
        self.check_reachable()?;
        alter_system_sql(name, value)?;
        if self.lock_rejected().iter().any(|r| r == name) {
            return Err(AdvisorError::query(format!(
                "{}: invalid value for parameter",
                name
            )));
        }
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string(), value.to_string()));
        self.set_value(name, value);
        Ok(())
    }

    async fn reset_all(&self) -> Result<()> {
        self.check_reachable()?;
        *self.resets.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}
