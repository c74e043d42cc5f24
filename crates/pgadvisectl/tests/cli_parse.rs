//! Command line parsing

use clap::Parser;
use pgadvise_common::SuggestionPatch;
use pgadvisectl::cli::{Cli, Command};
use std::path::PathBuf;

#[test]
fn check_defaults_to_system_config() {
    let cli = Cli::try_parse_from(["pgadvisectl", "check"]).unwrap();
    assert_eq!(cli.config, PathBuf::from("/etc/pgadvise/config.toml"));
    assert_eq!(cli.command, Command::Check { json: false });
}

#[test]
fn global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "pgadvisectl",
        "show",
        "work_mem",
        "--json",
        "--config",
        "/tmp/pgadvise.toml",
        "--database-url",
        "postgres://advisor@db/postgres",
    ])
    .unwrap();
    assert_eq!(cli.config, PathBuf::from("/tmp/pgadvise.toml"));
    assert_eq!(
        cli.database_url.as_deref(),
        Some("postgres://advisor@db/postgres")
    );
    assert_eq!(
        cli.command,
        Command::Show {
            name: "work_mem".to_string(),
            json: true
        }
    );
}

#[test]
fn apply_parses_patches() {
    let cli = Cli::try_parse_from(["pgadvisectl", "apply", "work_mem=65536", "huge_pages=try"])
        .unwrap();
    assert_eq!(
        cli.command,
        Command::Apply {
            all: false,
            patches: vec![
                SuggestionPatch::new("work_mem", "65536"),
                SuggestionPatch::new("huge_pages", "try"),
            ],
        }
    );
}

#[test]
fn apply_needs_patches_or_all() {
    assert!(Cli::try_parse_from(["pgadvisectl", "apply"]).is_err());
    assert!(Cli::try_parse_from(["pgadvisectl", "apply", "--all", "work_mem=1"]).is_err());
    assert!(Cli::try_parse_from(["pgadvisectl", "apply", "work_mem"]).is_err());

    let cli = Cli::try_parse_from(["pgadvisectl", "apply", "--all"]).unwrap();
    assert_eq!(
        cli.command,
        Command::Apply {
            all: true,
            patches: vec![]
        }
    );
}

#[test]
fn discard_and_backups() {
    let cli = Cli::try_parse_from(["pgadvisectl", "discard"]).unwrap();
    assert_eq!(cli.command, Command::Discard);
    let cli = Cli::try_parse_from(["pgadvisectl", "backups", "--json"]).unwrap();
    assert_eq!(cli.command, Command::Backups { json: true });
}
