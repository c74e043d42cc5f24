//! Check rules
//!
//! One rule per tracked parameter. A rule is a pure function of the settings
//! snapshot and the host facts; it never touches the database or the OS.
//! `evaluate_setting` applies the post-processing every rule shares: error
//! trapping, the restart flag from the catalog context and clearing of
//! suggestions equal to the live value.

mod defaults;
mod limits;
mod memory;
mod pages;

pub use defaults::BootDefault;
pub use limits::{MaxPreparedTransactions, MaxStackDepth};
pub use memory::{
    AutovacuumWorkMem, HashMemMultiplier, LogicalDecodingWorkMem, MaintenanceWorkMem,
    SharedBuffers, TempBuffers, WorkMem,
};
pub use pages::{HugePageSize, HugePages};

use crate::catalog::Snapshot;
use pgadvise_common::config::RulesConfig;
use pgadvise_common::units::{convert, Unit, MB};
use pgadvise_common::{round_to_power_of_two, AdvisorError, HostFacts, ResourceSetting, Result};
use std::collections::BTreeMap;
use tracing::{debug, error, warn};

/// Outcome of one rule
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Suggestion {
    /// New value in the setting's own unit; `None` when nothing should change
    pub value: Option<String>,
    /// Why a value was (or was not) suggested
    pub rationale: String,
    pub requires_restart: bool,
}

impl Suggestion {
    pub fn new(rationale: impl Into<String>) -> Self {
        Self {
            rationale: rationale.into(),
            ..Default::default()
        }
    }

    /// Rule with nothing to say
    pub fn none() -> Self {
        Self::default()
    }

    pub fn suggest(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn restart(mut self) -> Self {
        self.requires_restart = true;
        self
    }
}

/// A check for one tracked parameter
pub trait Rule: Send + Sync {
    /// Parameter this rule evaluates
    fn name(&self) -> &'static str;

    /// What the parameter controls
    fn description(&self) -> &'static str;

    fn evaluate(&self, snapshot: &Snapshot, host: &HostFacts) -> Result<Suggestion>;
}

/// Run one rule against the snapshot.
///
/// Returns `None` when the parameter is absent from the snapshot. Failures
/// are trapped here: the returned setting carries `got_error` and no
/// suggestion, and sibling rules are unaffected.
pub fn evaluate_setting(
    rule: &dyn Rule,
    snapshot: &Snapshot,
    host: &HostFacts,
) -> Option<ResourceSetting> {
    let mut setting = match snapshot.get(rule.name()) {
        Ok(setting) => setting.clone(),
        Err(_) => {
            warn!(setting = rule.name(), "Not in snapshot, skipping check");
            return None;
        }
    };
    setting.reset_verdict();
    setting.details = rule.description().to_string();
    setting.requires_restart = setting.is_postmaster();

    match rule.evaluate(snapshot, host) {
        Ok(suggestion) => {
            if !suggestion.rationale.is_empty() {
                setting.details.push(' ');
                setting.details.push_str(&suggestion.rationale);
            }
            setting.suggested_value = suggestion.value;
            setting.requires_restart |= suggestion.requires_restart;
            setting.clear_if_current();
            debug!(
                setting = rule.name(),
                suggested = ?setting.suggested_value,
                "Check finished"
            );
        }
        Err(e) => {
            error!(setting = rule.name(), "Check failed: {}", e);
            setting.got_error = true;
        }
    }

    Some(setting)
}

/// Ordered set of rules, one per tracked parameter
pub struct RuleRegistry {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleRegistry {
    /// The thirteen standard rules in reporting order.
    pub fn standard(config: &RulesConfig) -> Self {
        let rules: Vec<Box<dyn Rule>> = vec![
            Box::new(SharedBuffers),
            Box::new(HugePages),
            Box::new(HugePageSize),
            Box::new(TempBuffers),
            Box::new(MaxPreparedTransactions),
            Box::new(WorkMem),
            Box::new(HashMemMultiplier),
            Box::new(MaintenanceWorkMem),
            Box::new(AutovacuumWorkMem),
            Box::new(LogicalDecodingWorkMem),
            Box::new(MaxStackDepth::new(config.stack_depth_cap())),
            Box::new(BootDefault::shared_memory_type()),
            Box::new(BootDefault::dynamic_shared_memory_type()),
        ];
        Self { rules }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a rule; a rule for an already registered name replaces it.
    pub fn register(&mut self, rule: Box<dyn Rule>) {
        self.rules.retain(|r| r.name() != rule.name());
        self.rules.push(rule);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Rule> {
        self.rules
            .iter()
            .find(|r| r.name() == name)
            .map(|r| r.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.name())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate every rule. Parameters missing from the snapshot are left out.
    pub fn evaluate_all(
        &self,
        snapshot: &Snapshot,
        host: &HostFacts,
    ) -> BTreeMap<String, ResourceSetting> {
        self.rules
            .iter()
            .filter_map(|rule| evaluate_setting(rule.as_ref(), snapshot, host))
            .map(|setting| (setting.name.clone(), setting))
            .collect()
    }

    /// Evaluate the rule for one parameter.
    pub fn evaluate_one(
        &self,
        name: &str,
        snapshot: &Snapshot,
        host: &HostFacts,
    ) -> Result<ResourceSetting> {
        let rule = self
            .get(name)
            .ok_or_else(|| AdvisorError::NotFound(name.to_string()))?;
        evaluate_setting(rule, snapshot, host)
            .ok_or_else(|| AdvisorError::MissingSetting(name.to_string()))
    }
}

/// Available memory expressed in `unit`
fn available_in(host: &HostFacts, unit: Unit) -> Result<f64> {
    Ok(convert(host.available_memory()? as f64, Unit::Bytes, unit))
}

/// Power-of-two normalisation of a computed quantity. Fractions are dropped
/// first, so anything below one rounds to the zero sentinel.
fn pow2(value: f64) -> u64 {
    round_to_power_of_two(value.max(0.0) as u64)
}

/// Quantity in `unit` expressed in megabytes
fn as_mb(value: f64, unit: Unit) -> f64 {
    convert(value, unit, Unit::Megabytes)
}

/// `mb` megabytes expressed in `unit`
fn from_mb(mb: u64, unit: Unit) -> f64 {
    (mb * MB) as f64 / unit.bytes() as f64
}

/// Positive integer dependency such as max_connections
fn positive_dependency(snapshot: &Snapshot, name: &str) -> Result<i64> {
    let setting = snapshot.get(name)?;
    match setting.integer()? {
        n if n > 0 => Ok(n),
        n => Err(AdvisorError::malformed(name, n.to_string())),
    }
}
