//! Memory sizing rules

use super::{as_mb, available_in, from_mb, positive_dependency, pow2, Rule, Suggestion};
use crate::catalog::Snapshot;
use pgadvise_common::units::{convert, format_integer, Unit, GIB};
use pgadvise_common::{round_to_power_of_two, HostFacts, Result};

/// Lowest shared_buffers worth suggesting, in MB
const SHARED_BUFFERS_FLOOR_MB: u64 = 128;

/// temp_buffers default, in 8kB blocks
const TEMP_BUFFERS_DEFAULT_BLOCKS: f64 = 1024.0;

/// work_mem above which hash tables may use more than the default multiplier
const HASH_MEM_WORK_MEM_THRESHOLD_MB: f64 = 40.0;

const HASH_MEM_DEFAULT: f64 = 2.0;
const HASH_MEM_MAX: f64 = 8.0;

/// maintenance_work_mem default, also the floor for derived work-mem sizes
const MAINTENANCE_DEFAULT_MB: u64 = 64;

pub struct SharedBuffers;

impl Rule for SharedBuffers {
    fn name(&self) -> &'static str {
        "shared_buffers"
    }

    fn description(&self) -> &'static str {
        "Memory the server uses for shared memory buffers."
    }

    fn evaluate(&self, snapshot: &Snapshot, host: &HostFacts) -> Result<Suggestion> {
        let setting = snapshot.get(self.name())?;
        let unit = setting.memory_unit()?;
        let total = host.total_memory()?;

        let (raw, rationale) = if total > GIB {
            (
                convert(total as f64, Unit::Bytes, unit) * 0.25,
                "Total memory is above 1GB, so a quarter of it is suggested.".to_string(),
            )
        } else {
            let raw = available_in(host, unit)? * 0.30;
            let floor = from_mb(SHARED_BUFFERS_FLOOR_MB, unit);
            if raw < floor {
                (
                    floor,
                    "Total memory is 1GB or less and 30% of available memory is below 128MB, \
                     so 128MB is suggested."
                        .to_string(),
                )
            } else {
                (
                    raw,
                    "Total memory is 1GB or less, so 30% of available memory is suggested."
                        .to_string(),
                )
            }
        };

        Ok(Suggestion::new(rationale)
            .suggest(pow2(raw).to_string())
            .restart())
    }
}

pub struct TempBuffers;

impl Rule for TempBuffers {
    fn name(&self) -> &'static str {
        "temp_buffers"
    }

    fn description(&self) -> &'static str {
        "Per-session memory for temporary table buffers."
    }

    fn evaluate(&self, snapshot: &Snapshot, _host: &HostFacts) -> Result<Suggestion> {
        let setting = snapshot.get(self.name())?;
        let unit = setting.memory_unit()?;
        let blocks = convert(setting.integer()? as f64, unit, Unit::Blocks);

        if blocks > TEMP_BUFFERS_DEFAULT_BLOCKS {
            return Ok(Suggestion::new(
                "Current value is above 8MB. Keep it that high only for applications that \
                 rely heavily on temporary tables, and consider setting it per database.",
            ));
        }
        if blocks < TEMP_BUFFERS_DEFAULT_BLOCKS {
            let default = convert(TEMP_BUFFERS_DEFAULT_BLOCKS, Unit::Blocks, unit);
            return Ok(Suggestion::new(
                "Current value is below 8MB. Unused temporary buffers cost only a descriptor \
                 each, so the 8MB default is suggested.",
            )
            .suggest(format_integer(default)));
        }
        Ok(Suggestion::none())
    }
}

pub struct WorkMem;

impl Rule for WorkMem {
    fn name(&self) -> &'static str {
        "work_mem"
    }

    fn description(&self) -> &'static str {
        "Memory a single sort or hash operation may use before spilling to disk."
    }

    fn evaluate(&self, snapshot: &Snapshot, host: &HostFacts) -> Result<Suggestion> {
        let setting = snapshot.get(self.name())?;
        let unit = setting.memory_unit()?;
        let connections = positive_dependency(snapshot, "max_connections")?;
        let available = host.available_memory()?;

        let bytes = round_to_power_of_two(available / connections as u64);
        let value = convert(bytes as f64, Unit::Bytes, unit);
        if value < 1.0 {
            return Ok(Suggestion::new(
                "Available memory is too small to give every connection a usable share; \
                 lower max_connections first.",
            ));
        }

        Ok(Suggestion::new(
            "Derived from available memory divided by max_connections. Workloads with \
             complex sorts or hashes, or a dedicated database host, can go higher.",
        )
        .suggest(format_integer(value)))
    }
}

pub struct HashMemMultiplier;

impl Rule for HashMemMultiplier {
    fn name(&self) -> &'static str {
        "hash_mem_multiplier"
    }

    fn description(&self) -> &'static str {
        "Multiple of work_mem that hash-based operations may use."
    }

    fn evaluate(&self, snapshot: &Snapshot, _host: &HostFacts) -> Result<Suggestion> {
        let setting = snapshot.get(self.name())?;
        let work_mem = snapshot.get("work_mem")?;
        let work_mem_mb = as_mb(work_mem.integer()? as f64, work_mem.memory_unit()?);

        if work_mem_mb > HASH_MEM_WORK_MEM_THRESHOLD_MB {
            let current = setting.number()?;
            let target = (current + work_mem_mb * 0.01).min(HASH_MEM_MAX);
            return Ok(Suggestion::new(
                "work_mem is above 40MB, so hash operations can be given more room in \
                 proportion to it.",
            )
            .suggest(format_multiplier(target)));
        }

        if !setting.value.matches("2") {
            return Ok(Suggestion::new(
                "work_mem is 40MB or less, so the multiplier should stay at its default. \
                 Raise work_mem first if hash operations spill to disk.",
            )
            .suggest(format_multiplier(HASH_MEM_DEFAULT)));
        }

        Ok(Suggestion::none())
    }
}

/// Two decimals, without trailing zeros
fn format_multiplier(value: f64) -> String {
    format!("{}", (value * 100.0).round() / 100.0)
}

/// Shared computation for maintenance_work_mem and autovacuum_work_mem:
/// available memory in the setting's unit divided by `divisor` and by
/// autovacuum_max_workers, rounded to a power of two.
fn per_worker_share(
    snapshot: &Snapshot,
    host: &HostFacts,
    unit: Unit,
    divisor: f64,
) -> Result<u64> {
    let workers = positive_dependency(snapshot, "autovacuum_max_workers")?;
    let available = available_in(host, unit)?;
    Ok(pow2(available / divisor / workers as f64))
}

pub struct MaintenanceWorkMem;

impl Rule for MaintenanceWorkMem {
    fn name(&self) -> &'static str {
        "maintenance_work_mem"
    }

    fn description(&self) -> &'static str {
        "Memory for maintenance operations such as VACUUM and CREATE INDEX."
    }

    fn evaluate(&self, snapshot: &Snapshot, host: &HostFacts) -> Result<Suggestion> {
        let setting = snapshot.get(self.name())?;
        let unit = setting.memory_unit()?;
        let share = per_worker_share(snapshot, host, unit, 8.0)?;

        if as_mb(share as f64, unit) < MAINTENANCE_DEFAULT_MB as f64 {
            let default = from_mb(MAINTENANCE_DEFAULT_MB, unit);
            if setting.integer()? as f64 == default {
                return Ok(Suggestion::new(
                    "Available memory does not allow going above the 64MB default.",
                ));
            }
            return Ok(Suggestion::new(
                "Available memory does not allow going above the 64MB default, so the \
                 default is suggested.",
            )
            .suggest(format_integer(default)));
        }

        Ok(Suggestion::new(
            "Derived from available memory divided by 8 and by autovacuum_max_workers. \
             Maintenance-heavy workloads may double it.",
        )
        .suggest(share.to_string()))
    }
}

pub struct AutovacuumWorkMem;

impl Rule for AutovacuumWorkMem {
    fn name(&self) -> &'static str {
        "autovacuum_work_mem"
    }

    fn description(&self) -> &'static str {
        "Memory each autovacuum worker may use."
    }

    fn evaluate(&self, snapshot: &Snapshot, host: &HostFacts) -> Result<Suggestion> {
        let setting = snapshot.get(self.name())?;
        let unit = setting.memory_unit()?;
        let share = per_worker_share(snapshot, host, unit, 4.0)?;

        if as_mb(share as f64, unit) < MAINTENANCE_DEFAULT_MB as f64 {
            if setting.integer()? == -1 {
                return Ok(Suggestion::new(
                    "Available memory is too low for a dedicated value; workers already \
                     use maintenance_work_mem.",
                ));
            }
            return Ok(Suggestion::new(
                "Available memory is too low for a dedicated value, so -1 is suggested to \
                 make workers use maintenance_work_mem.",
            )
            .suggest("-1"));
        }

        Ok(Suggestion::new(
            "Derived from available memory divided by 4 and by autovacuum_max_workers.",
        )
        .suggest(share.to_string()))
    }
}

pub struct LogicalDecodingWorkMem;

impl Rule for LogicalDecodingWorkMem {
    fn name(&self) -> &'static str {
        "logical_decoding_work_mem"
    }

    fn description(&self) -> &'static str {
        "Memory logical decoding may use before writing changes to disk."
    }

    fn evaluate(&self, snapshot: &Snapshot, host: &HostFacts) -> Result<Suggestion> {
        let setting = snapshot.get(self.name())?;
        let unit = setting.memory_unit()?;
        let value = pow2(available_in(host, unit)? / 8.0);

        if as_mb(value as f64, unit) < MAINTENANCE_DEFAULT_MB as f64 {
            return Ok(Suggestion::none());
        }
        Ok(Suggestion::new(
            "Available memory allows going above the default; an eighth of it is suggested.",
        )
        .suggest(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SettingRow;
    use pgadvise_common::units::MB;

    fn snapshot(rows: Vec<SettingRow>) -> Snapshot {
        Snapshot::from_settings(rows.into_iter().map(|r| r.into_setting().unwrap()))
    }

    #[test]
    fn test_shared_buffers_in_blocks() {
        let snap = snapshot(vec![SettingRow::integer("shared_buffers", 16384, Some("8kB"))]);
        let host = HostFacts::fixed(8 * GIB, 4 * GIB, 0, 8 * MB);
        let suggestion = SharedBuffers.evaluate(&snap, &host).unwrap();
        // 2GB in 8kB blocks
        assert_eq!(suggestion.value.as_deref(), Some("262144"));
        assert!(suggestion.requires_restart);
    }

    #[test]
    fn test_shared_buffers_small_host_uses_available() {
        let snap = snapshot(vec![SettingRow::integer("shared_buffers", 128, Some("MB"))]);
        let host = HostFacts::fixed(GIB, 900 * MB, 0, 8 * MB);
        let suggestion = SharedBuffers.evaluate(&snap, &host).unwrap();
        // 270MB rounds to 256
        assert_eq!(suggestion.value.as_deref(), Some("256"));
    }

    #[test]
    fn test_temp_buffers_above_default_is_advice_only() {
        let snap = snapshot(vec![SettingRow::integer("temp_buffers", 4096, Some("8kB"))]);
        let host = HostFacts::fixed(GIB, GIB, 0, 8 * MB);
        let suggestion = TempBuffers.evaluate(&snap, &host).unwrap();
        assert!(suggestion.value.is_none());
        assert!(!suggestion.rationale.is_empty());
    }

    #[test]
    fn test_temp_buffers_below_default_in_kb() {
        let snap = snapshot(vec![SettingRow::integer("temp_buffers", 1024, Some("kB"))]);
        let host = HostFacts::fixed(GIB, GIB, 0, 8 * MB);
        let suggestion = TempBuffers.evaluate(&snap, &host).unwrap();
        assert_eq!(suggestion.value.as_deref(), Some("8192"));
    }

    #[test]
    fn test_work_mem_rejects_zero_connections() {
        let snap = snapshot(vec![
            SettingRow::integer("work_mem", 4096, Some("kB")),
            SettingRow::integer("max_connections", 0, None),
        ]);
        let host = HostFacts::fixed(GIB, GIB, 0, 8 * MB);
        assert!(WorkMem.evaluate(&snap, &host).is_err());
    }

    #[test]
    fn test_work_mem_starved_host_gets_no_value() {
        let snap = snapshot(vec![
            SettingRow::integer("work_mem", 4096, Some("kB")),
            SettingRow::integer("max_connections", 100, None),
        ]);
        // 64 bytes per connection is below one kB
        let host = HostFacts::fixed(GIB, 6400, 0, 8 * MB);
        let suggestion = WorkMem.evaluate(&snap, &host).unwrap();
        assert!(suggestion.value.is_none());
        assert!(suggestion.rationale.contains("max_connections"));
    }

    #[test]
    fn test_hash_mem_multiplier_capped_at_eight() {
        let snap = snapshot(vec![
            SettingRow::real("hash_mem_multiplier", 7.5),
            SettingRow::integer("work_mem", 512 * 1024, Some("kB")),
        ]);
        let host = HostFacts::fixed(GIB, GIB, 0, 8 * MB);
        let suggestion = HashMemMultiplier.evaluate(&snap, &host).unwrap();
        assert_eq!(suggestion.value.as_deref(), Some("8"));
    }

    #[test]
    fn test_maintenance_work_mem_floor() {
        let snap = snapshot(vec![
            SettingRow::integer("maintenance_work_mem", 16384, Some("kB")),
            SettingRow::integer("autovacuum_max_workers", 3, None),
        ]);
        let host = HostFacts::fixed(GIB, 512 * MB, 0, 8 * MB);
        let suggestion = MaintenanceWorkMem.evaluate(&snap, &host).unwrap();
        assert_eq!(suggestion.value.as_deref(), Some("65536"));
    }

    #[test]
    fn test_logical_decoding_suppressed_below_default() {
        let snap = snapshot(vec![SettingRow::integer(
            "logical_decoding_work_mem",
            65536,
            Some("kB"),
        )]);
        let small = HostFacts::fixed(GIB, 256 * MB, 0, 8 * MB);
        assert!(LogicalDecodingWorkMem
            .evaluate(&snap, &small)
            .unwrap()
            .value
            .is_none());

        let large = HostFacts::fixed(16 * GIB, 8 * GIB, 0, 8 * MB);
        let suggestion = LogicalDecodingWorkMem.evaluate(&snap, &large).unwrap();
        assert_eq!(suggestion.value.as_deref(), Some("1048576"));
    }
}
