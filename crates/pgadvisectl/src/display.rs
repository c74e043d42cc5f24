//! Terminal rendering

use owo_colors::OwoColorize;
use pgadvise_common::ResourceSetting;
use pgadvise_core::{ApplyOutcome, BackupEntry, Report};

const HR: &str = "------------------------------------------------------------";

/// Key column width
const KW: usize = 28;

/// `value` followed by its unit, when the setting has one
pub fn with_unit(value: &str, unit: Option<&str>) -> String {
    match unit {
        Some(unit) if value != "-1" => format!("{} ({})", value, unit),
        _ => value.to_string(),
    }
}

pub fn print_report(report: &Report) {
    println!();
    println!(
        "{}  {}",
        "pgadvise report".bold(),
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC").dimmed()
    );
    println!("{}", HR.dimmed());

    for setting in report.settings.values() {
        print_row(setting);
    }

    println!("{}", HR.dimmed());
    println!(
        "{} suggested, {} ok, {} failed",
        report.summary.suggested.yellow(),
        report.summary.passed.green(),
        report.summary.errored.red()
    );
    if report.summary.suggested > 0 {
        println!("Run 'pgadvisectl show <name>' for details, 'pgadvisectl apply --all' to apply.");
    }
}

fn print_row(setting: &ResourceSetting) {
    let current = with_unit(&setting.value.to_string(), setting.unit.as_deref());
    if setting.got_error {
        println!("{:width$} {}  {}", setting.name, current, "[FAILED]".red(), width = KW);
        return;
    }
    match &setting.suggested_value {
        Some(suggested) => {
            let restart = if setting.requires_restart { "  (restart)" } else { "" };
            println!(
                "{:width$} {} -> {}{}",
                setting.name,
                current,
                with_unit(suggested, setting.unit.as_deref()).yellow(),
                restart.dimmed(),
                width = KW
            );
        }
        None => println!("{:width$} {}  {}", setting.name, current, "[OK]".green(), width = KW),
    }
}

pub fn print_setting(setting: &ResourceSetting) {
    println!();
    println!("{}", setting.name.bold());
    println!("{}", HR.dimmed());
    println!(
        "{:12} {}",
        "current",
        with_unit(&setting.value.to_string(), setting.unit.as_deref())
    );
    match (&setting.suggested_value, setting.got_error) {
        (_, true) => println!("{:12} {}", "status", "check failed, see log".red()),
        (Some(value), _) => println!(
            "{:12} {}",
            "suggested",
            with_unit(value, setting.unit.as_deref()).yellow()
        ),
        (None, _) => println!("{:12} {}", "status", "ok".green()),
    }
    println!(
        "{:12} {}",
        "restart",
        if setting.requires_restart { "required" } else { "not required" }
    );
    println!();
    println!("{}", setting.details);
}

pub fn print_apply(outcome: &ApplyOutcome) {
    for patch in &outcome.applied {
        println!("{} {} = {}", "[OK]".green(), patch.name, patch.suggested_value);
    }
    println!("Backup: {}", outcome.backup.path.display());
    if !outcome.restart_needed.is_empty() {
        println!(
            "{} takes effect only after a server restart: {}",
            "Note:".yellow(),
            outcome.restart_needed.join(", ")
        );
    }
}

pub fn print_nothing_to_apply() {
    println!("{} nothing to apply, every setting matches its suggestion", "[OK]".green());
}

pub fn print_discard(backup: &BackupEntry) {
    println!("{} all overrides removed", "[OK]".green());
    println!("Backup: {}", backup.path.display());
}

pub fn print_backups(backups: &[BackupEntry]) {
    if backups.is_empty() {
        println!("No backups.");
        return;
    }
    for backup in backups {
        println!(
            "{}  {}",
            backup.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            backup.name
        );
    }
}
