//! pgadvise core - PostgreSQL resource configuration advisory engine
//!
//! Reads a fixed set of server parameters and host resource facts, runs one
//! check rule per parameter and persists accepted suggestions as
//! `ALTER SYSTEM` overrides.

pub mod advisor;
pub mod backup;
pub mod catalog;
pub mod logging;
pub mod probe;
pub mod rules;
pub mod service;

pub use advisor::{Advisor, ApplyOutcome, Report, Summary};
pub use backup::{BackupEntry, BackupStore};
pub use catalog::{FakeCatalog, PgCatalog, SettingRow, SettingsCatalog, Snapshot};
pub use probe::{FakeHostProbe, HostProbe, LinuxHostProbe};
pub use rules::{Rule, RuleRegistry, Suggestion};
pub use service::{CommandController, FakeServiceController, PgReloadController, ServiceController};
