//! Command handlers for pgadvisectl.

use crate::cli::{Cli, Command};
use crate::display;
use anyhow::Result;
use pgadvise_common::{AdvisorConfig, SuggestionPatch};
use pgadvise_core::{Advisor, BackupStore};
use serde::Serialize;
use tracing::info;

/// Load the configuration file and apply command line overrides.
pub fn load_config(cli: &Cli) -> Result<AdvisorConfig> {
    let mut config = AdvisorConfig::load(&cli.config)?;
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    Ok(config)
}

/// Run one command. Listing backups works without a database connection.
pub async fn dispatch(command: Command, config: &AdvisorConfig) -> Result<()> {
    if let Command::Backups { json } = command {
        let store = BackupStore::from_paths(&config.paths)?;
        return handle_backups(&store, json);
    }

    let advisor = Advisor::connect(config).await?;
    match command {
        Command::Check { json } => handle_check(&advisor, json).await,
        Command::Show { name, json } => handle_show(&advisor, &name, json).await,
        Command::Apply { all, patches } => {
            handle_apply(&advisor, all, patches).await?;
            Ok(())
        }
        Command::Discard => handle_discard(&advisor).await,
        Command::Backups { json } => handle_backups(advisor.backups(), json),
    }
}

pub async fn handle_check(advisor: &Advisor, json: bool) -> Result<()> {
    let report = advisor.all_suggestions().await?;
    if json {
        return print_json(&report);
    }
    display::print_report(&report);
    Ok(())
}

pub async fn handle_show(advisor: &Advisor, name: &str, json: bool) -> Result<()> {
    let setting = advisor.suggestion(name).await?;
    if json {
        return print_json(&setting);
    }
    display::print_setting(&setting);
    Ok(())
}

/// Apply explicit patches, or every current suggestion with `all`.
/// Returns the number of settings written.
pub async fn handle_apply(
    advisor: &Advisor,
    all: bool,
    patches: Vec<SuggestionPatch>,
) -> Result<usize> {
    let patches = if all {
        let patches = advisor.all_suggestions().await?.patches();
        if patches.is_empty() {
            display::print_nothing_to_apply();
            return Ok(0);
        }
        patches
    } else {
        patches
    };
    info!(count = patches.len(), "Applying suggestions");

    let outcome = advisor.apply_suggestions(&patches).await?;
    display::print_apply(&outcome);
    Ok(outcome.applied.len())
}

pub async fn handle_discard(advisor: &Advisor) -> Result<()> {
    let backup = advisor.discard_overrides().await?;
    display::print_discard(&backup);
    Ok(())
}

pub fn handle_backups(store: &BackupStore, json: bool) -> Result<()> {
    let backups = store.list()?;
    if json {
        return print_json(&backups);
    }
    display::print_backups(&backups);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
