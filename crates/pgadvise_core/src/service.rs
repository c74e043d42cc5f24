//! Database service control
//!
//! New overrides only take effect once the server re-reads its configuration.
//! `CommandController` restarts the service through an external command (the
//! only way startup-only parameters change); `PgReloadController` asks the
//! server to reload.

use async_trait::async_trait;
use pgadvise_common::config::{ServiceConfig, ServiceMode};
use pgadvise_common::{AdvisorError, Result};
use sqlx::postgres::PgPool;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

/// Makes persisted overrides effective
#[async_trait]
pub trait ServiceController: Send + Sync {
    async fn reload(&self) -> Result<()>;
}

/// Runs an external command, `systemctl restart postgresql` by default
pub struct CommandController {
    argv: Vec<String>,
}

impl CommandController {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() || argv[0].trim().is_empty() {
            return Err(AdvisorError::Config(
                "service restart_command is empty".to_string(),
            ));
        }
        Ok(Self { argv })
    }
}

#[async_trait]
impl ServiceController for CommandController {
    async fn reload(&self) -> Result<()> {
        let command_line = self.argv.join(" ");
        info!(command = %command_line, "Restarting database service");

        let output = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .output()
            .await
            .map_err(|e| AdvisorError::Service(format!("{}: {}", command_line, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(command = %command_line, status = %output.status, "Service command failed");
            return Err(AdvisorError::Service(format!(
                "{} exited with {}: {}",
                command_line,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Calls `pg_reload_conf()` on the server
pub struct PgReloadController {
    pool: PgPool,
}

impl PgReloadController {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceController for PgReloadController {
    async fn reload(&self) -> Result<()> {
        let reloaded: bool = sqlx::query_scalar("SELECT pg_reload_conf()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AdvisorError::Service(e.to_string()))?;
        if !reloaded {
            return Err(AdvisorError::Service(
                "server refused to reload its configuration".to_string(),
            ));
        }
        info!("Server configuration reloaded");
        Ok(())
    }
}

/// Controller for the configured service mode
pub fn from_config(config: &ServiceConfig, pool: &PgPool) -> Result<Arc<dyn ServiceController>> {
    Ok(match config.mode {
        ServiceMode::Restart => Arc::new(CommandController::new(config.restart_command.clone())?),
        ServiceMode::Reload => Arc::new(PgReloadController::new(pool.clone())),
    })
}

/// Counts reloads; can be told to fail
#[derive(Debug, Default)]
pub struct FakeServiceController {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl FakeServiceController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceController for FakeServiceController {
    async fn reload(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AdvisorError::Service("unit postgresql.service failed".to_string()));
        }
        Ok(())
    }
}
