//! pgadvisectl - PostgreSQL resource configuration advisor
//!
//! Checks resource settings against the host, shows suggestions and applies
//! them as server overrides.

use clap::Parser;
use owo_colors::OwoColorize;
use pgadvise_core::logging;
use pgadvisectl::cli::Cli;
use pgadvisectl::commands;
use pgadvisectl::errors::{self, EXIT_SUCCESS};
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match commands::load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red(), e);
            std::process::exit(errors::exit_code(&e));
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("{} {}", "warning:".yellow(), e);
    }

    let code = match commands::dispatch(cli.command, &config).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!(
                "{} {}",
                "error:".red(),
                errors::user_message(&e, config.logging.file.as_deref())
            );
            errors::exit_code(&e)
        }
    };
    std::process::exit(code);
}
