//! End-to-end advisor operations over fake collaborators

use pgadvise_common::config::RulesConfig;
use pgadvise_common::units::{GIB, MB};
use pgadvise_common::{AdvisorError, SuggestionPatch};
use pgadvise_core::catalog::SettingRow;
use pgadvise_core::{
    Advisor, BackupStore, FakeCatalog, FakeHostProbe, FakeServiceController, RuleRegistry,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    _tmp: TempDir,
    catalog: Arc<FakeCatalog>,
    service: Arc<FakeServiceController>,
    advisor: Advisor,
}

fn harness_with(catalog: FakeCatalog, probe: FakeHostProbe) -> Harness {
    let tmp = TempDir::new().unwrap();
    let auto_conf = tmp.path().join("postgresql.auto.conf");
    fs::write(&auto_conf, "# Do not edit this file manually!\n").unwrap();
    let backups = BackupStore::new(tmp.path().join("backups"), &auto_conf).unwrap();

    let catalog = Arc::new(catalog);
    let service = Arc::new(FakeServiceController::new());
    let advisor = Advisor::new(
        catalog.clone(),
        Arc::new(probe),
        service.clone(),
        backups,
        RuleRegistry::standard(&RulesConfig::default()),
    );
    Harness {
        _tmp: tmp,
        catalog,
        service,
        advisor,
    }
}

fn harness() -> Harness {
    harness_with(
        FakeCatalog::stock(),
        FakeHostProbe::new(16 * GIB, 8 * GIB, 0, 8 * MB),
    )
}

#[tokio::test]
async fn report_counts_and_cache() {
    let h = harness();
    assert!(h.advisor.last_report().await.is_none());

    let report = h.advisor.all_suggestions().await.unwrap();
    assert_eq!(report.settings.len(), 13);
    assert_eq!(report.summary.suggested, 8);
    assert_eq!(report.summary.passed, 5);
    assert_eq!(report.summary.errored, 0);
    assert!(!report.settings.contains_key("max_connections"));

    let cached = h.advisor.last_report().await.unwrap();
    assert_eq!(cached.summary, report.summary);
}

#[tokio::test]
async fn single_suggestion_lookup() {
    let h = harness();
    let work_mem = h.advisor.suggestion("work_mem").await.unwrap();
    assert_eq!(work_mem.suggested_value.as_deref(), Some("65536"));

    let err = h.advisor.suggestion("fsync").await.unwrap_err();
    assert!(matches!(err, AdvisorError::NotFound(_)));
    assert!(err.is_client_error());
}

#[tokio::test]
async fn external_changes_are_observed() {
    let h = harness();
    let before = h.advisor.suggestion("max_prepared_transactions").await.unwrap();
    assert_eq!(before.suggested_value.as_deref(), Some("100"));

    h.catalog.set_value("max_prepared_transactions", "50");
    let after = h.advisor.suggestion("max_prepared_transactions").await.unwrap();
    assert!(after.suggested_value.is_none());
}

#[tokio::test]
async fn empty_batch_rejected_without_side_effects() {
    let h = harness();
    let err = h.advisor.apply_suggestions(&[]).await.unwrap_err();
    assert!(matches!(err, AdvisorError::InvalidInput(_)));
    assert!(h.advisor.backups().list().unwrap().is_empty());
    assert_eq!(h.service.calls(), 0);
}

#[tokio::test]
async fn apply_whole_report() {
    let h = harness();
    let report = h.advisor.all_suggestions().await.unwrap();
    let patches = report.patches();
    assert_eq!(patches.len(), 8);

    let outcome = h.advisor.apply_suggestions(&patches).await.unwrap();
    assert_eq!(outcome.applied.len(), 8);
    assert!(outcome.restart_needed.contains(&"shared_buffers".to_string()));
    assert!(!outcome.restart_needed.contains(&"work_mem".to_string()));
    assert!(outcome.backup.path.exists());
    assert_eq!(h.catalog.writes().len(), 8);
    assert_eq!(h.service.calls(), 1);
    assert!(h.advisor.last_report().await.is_none());

    // only the multiplier follows the new work_mem
    let again = h.advisor.all_suggestions().await.unwrap();
    let remaining: Vec<_> = again.patches().into_iter().map(|p| p.name).collect();
    assert_eq!(remaining, vec!["hash_mem_multiplier"]);
}

#[tokio::test]
async fn partial_failure_names_failed_items() {
    let h = harness();
    h.catalog.reject("work_mem");

    let err = h
        .advisor
        .apply_suggestions(&[
            SuggestionPatch::new("work_mem", "65536"),
            SuggestionPatch::new("huge_pages", "off"),
            SuggestionPatch::new("fsync", "off"),
            SuggestionPatch::new("shared_memory_type", "shm"),
        ])
        .await
        .unwrap_err();

    match err {
        AdvisorError::PartialFailure { failed } => {
            assert_eq!(failed, vec!["work_mem", "fsync", "shared_memory_type"]);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(
        h.catalog.writes(),
        vec![("huge_pages".to_string(), "off".to_string())]
    );
    assert_eq!(h.service.calls(), 1);
}

#[tokio::test]
async fn nothing_applied_means_no_reload() {
    let h = harness();
    let err = h
        .advisor
        .apply_suggestions(&[SuggestionPatch::new("huge_pages", "maybe")])
        .await
        .unwrap_err();
    assert!(matches!(err, AdvisorError::PartialFailure { .. }));
    assert!(h.catalog.writes().is_empty());
    assert_eq!(h.service.calls(), 0);
}

#[tokio::test]
async fn reload_failure_takes_precedence() {
    let h = harness();
    h.service.set_failing(true);
    h.catalog.reject("work_mem");

    let err = h
        .advisor
        .apply_suggestions(&[
            SuggestionPatch::new("work_mem", "65536"),
            SuggestionPatch::new("max_prepared_transactions", "100"),
        ])
        .await
        .unwrap_err();
    match err {
        AdvisorError::ReloadFailed {
            applied, failed, ..
        } => {
            assert_eq!(applied, vec!["max_prepared_transactions".to_string()]);
            assert_eq!(failed, vec!["work_mem".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.catalog.writes().len(), 1);
    assert!(h.advisor.last_report().await.is_none());
}

#[tokio::test]
async fn quoted_enum_value_is_applied_verbatim() {
    let h = harness_with(
        FakeCatalog::stock().with_row(SettingRow::enumerated(
            "dynamic_shared_memory_type",
            "posix",
            &["posix", "o'brien"],
        )),
        FakeHostProbe::new(16 * GIB, 8 * GIB, 0, 8 * MB),
    );
    h.advisor
        .apply_suggestions(&[SuggestionPatch::new("dynamic_shared_memory_type", "o'brien")])
        .await
        .unwrap();
    assert_eq!(h.catalog.writes()[0].1, "o'brien");
}

#[tokio::test]
async fn discard_backs_up_resets_and_reloads() {
    let h = harness();
    let backup = h.advisor.discard_overrides().await.unwrap();
    assert!(backup.name.starts_with("postgresql.auto.conf_"));
    assert_eq!(h.catalog.reset_count(), 1);
    assert_eq!(h.service.calls(), 1);
    assert_eq!(h.advisor.backups().list().unwrap().len(), 1);
}

#[tokio::test]
async fn unreachable_database_is_query_error() {
    let h = harness();
    h.catalog.set_unreachable(true);
    assert!(matches!(
        h.advisor.all_suggestions().await,
        Err(AdvisorError::Query(_))
    ));
    assert!(matches!(
        h.advisor.discard_overrides().await,
        Err(AdvisorError::Query(_))
    ));
    assert_eq!(h.service.calls(), 0);
}

#[tokio::test]
async fn probe_failure_marks_dependent_settings_only() {
    let h = harness_with(
        FakeCatalog::stock(),
        FakeHostProbe::new(16 * GIB, 8 * GIB, 0, 8 * MB).failing_hugepages("permission denied"),
    );
    let report = h.advisor.all_suggestions().await.unwrap();
    assert_eq!(report.summary.errored, 2);
    assert!(report.settings["huge_pages"].got_error);
    assert!(report.settings["huge_page_size"].got_error);
    assert!(!report.settings["work_mem"].got_error);
}

#[tokio::test]
async fn missing_row_is_left_out_of_report() {
    let h = harness_with(
        FakeCatalog::stock().without("huge_page_size"),
        FakeHostProbe::new(16 * GIB, 8 * GIB, 0, 8 * MB),
    );
    let report = h.advisor.all_suggestions().await.unwrap();
    assert_eq!(report.settings.len(), 12);
    assert!(matches!(
        h.advisor.suggestion("huge_page_size").await,
        Err(AdvisorError::MissingSetting(_))
    ));
}

#[tokio::test]
async fn report_serializes_for_clients() {
    let h = harness();
    let report = h.advisor.all_suggestions().await.unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["summary"]["suggested"], 8);
    assert_eq!(json["settings"]["work_mem"]["suggested_value"], "65536");
    assert_eq!(json["settings"]["work_mem"]["value"], "4096");
}
