//! Command line definition

use clap::{Parser, Subcommand};
use pgadvise_common::config::CONFIG_PATH;
use pgadvise_common::SuggestionPatch;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pgadvisectl")]
#[command(about = "PostgreSQL resource configuration advisor", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = CONFIG_PATH)]
    pub config: PathBuf,

    /// Connection URL, overrides the configuration file
    #[arg(long, global = true, env = "PGADVISE_DATABASE_URL")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Check every tracked setting
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check one setting
    Show {
        /// Setting name, e.g. work_mem
        name: String,

        #[arg(long)]
        json: bool,
    },

    /// Persist suggestions and reload the service
    Apply {
        /// Apply every current suggestion
        #[arg(long, conflicts_with = "patches")]
        all: bool,

        /// Values to apply
        #[arg(value_name = "NAME=VALUE", required_unless_present = "all")]
        patches: Vec<SuggestionPatch>,
    },

    /// Remove every override and reload the service
    Discard,

    /// List override file backups
    Backups {
        #[arg(long)]
        json: bool,
    },
}
