//! Count and stack limit rules

use super::{positive_dependency, Rule, Suggestion};
use crate::catalog::Snapshot;
use pgadvise_common::units::{convert, Unit};
use pgadvise_common::{HostFacts, Result};

pub struct MaxPreparedTransactions;

impl Rule for MaxPreparedTransactions {
    fn name(&self) -> &'static str {
        "max_prepared_transactions"
    }

    fn description(&self) -> &'static str {
        "How many transactions can be in the prepared state at once."
    }

    fn evaluate(&self, snapshot: &Snapshot, _host: &HostFacts) -> Result<Suggestion> {
        let setting = snapshot.get(self.name())?;
        if setting.integer()? != 0 {
            return Ok(Suggestion::none().restart());
        }

        let connections = positive_dependency(snapshot, "max_connections")?;
        Ok(Suggestion::new(
            "Prepared transactions are disabled. Applications that use them need at \
             least as many slots as max_connections so every session can hold one.",
        )
        .suggest(connections.to_string())
        .restart())
    }
}

/// Suggests the kernel stack limit, optionally capped.
pub struct MaxStackDepth {
    cap: Option<i64>,
}

impl MaxStackDepth {
    /// `cap` is in the setting's unit; `None` suggests the limit unchanged.
    pub fn new(cap: Option<i64>) -> Self {
        Self { cap }
    }
}

impl Rule for MaxStackDepth {
    fn name(&self) -> &'static str {
        "max_stack_depth"
    }

    fn description(&self) -> &'static str {
        "Maximum safe depth of the server's execution stack."
    }

    fn evaluate(&self, snapshot: &Snapshot, host: &HostFacts) -> Result<Suggestion> {
        let setting = snapshot.get(self.name())?;
        let unit = setting.memory_unit()?;
        let current = setting.integer()?;
        let limit = convert(host.stack_limit()? as f64, Unit::Bytes, unit).floor() as i64;

        let mut rationale = String::from(
            "Ideally this matches the kernel stack size limit (ulimit -s).",
        );
        let target = match self.cap {
            Some(cap) if limit > cap => {
                rationale.push_str(&format!(
                    " Capped at {}{}: some platforms reject larger values even though they \
                     are within the parameter's range.",
                    cap, unit
                ));
                cap
            }
            _ => limit,
        };

        if target == current {
            return Ok(Suggestion::none());
        }
        Ok(Suggestion::new(rationale).suggest(target.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SettingRow;

    fn stack_depth(kb: i64) -> Snapshot {
        Snapshot::from_settings(vec![SettingRow::integer("max_stack_depth", kb, Some("kB"))
            .into_setting()
            .unwrap()])
    }

    #[test]
    fn test_stack_limit_capped() {
        let host = HostFacts::fixed(1 << 30, 1 << 30, 0, 8 << 20);
        let suggestion = MaxStackDepth::new(Some(4096))
            .evaluate(&stack_depth(2048), &host)
            .unwrap();
        assert_eq!(suggestion.value.as_deref(), Some("4096"));
        assert!(suggestion.rationale.contains("Capped"));

        let uncapped = MaxStackDepth::new(None)
            .evaluate(&stack_depth(2048), &host)
            .unwrap();
        assert_eq!(uncapped.value.as_deref(), Some("8192"));
    }

    #[test]
    fn test_stack_limit_below_cap_and_current() {
        let host = HostFacts::fixed(1 << 30, 1 << 30, 0, 4 << 20);
        let rule = MaxStackDepth::new(Some(4096));
        assert!(rule.evaluate(&stack_depth(4096), &host).unwrap().value.is_none());
        assert_eq!(
            rule.evaluate(&stack_depth(2048), &host).unwrap().value.as_deref(),
            Some("4096")
        );
    }

    #[test]
    fn test_unreadable_stack_limit_fails() {
        let mut host = HostFacts::fixed(1 << 30, 1 << 30, 0, 0);
        host.stack_limit = Err("stack soft limit is unlimited".to_string());
        assert!(MaxStackDepth::new(Some(4096))
            .evaluate(&stack_depth(2048), &host)
            .is_err());
    }

    #[test]
    fn test_prepared_transactions_follow_connections() {
        let snap = Snapshot::from_settings(vec![
            SettingRow::integer("max_prepared_transactions", 0, None)
                .into_setting()
                .unwrap(),
            SettingRow::integer("max_connections", 100, None)
                .into_setting()
                .unwrap(),
        ]);
        let host = HostFacts::fixed(1 << 30, 1 << 30, 0, 8 << 20);
        let suggestion = MaxPreparedTransactions.evaluate(&snap, &host).unwrap();
        assert_eq!(suggestion.value.as_deref(), Some("100"));
        assert!(suggestion.requires_restart);
    }
}
