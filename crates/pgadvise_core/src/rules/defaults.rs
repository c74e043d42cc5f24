//! Suggest the compiled-in default

use super::{Rule, Suggestion};
use crate::catalog::Snapshot;
use pgadvise_common::{AdvisorError, HostFacts, Result};

/// Suggests the parameter's boot value whenever the live value differs.
pub struct BootDefault {
    name: &'static str,
    description: &'static str,
    rationale: &'static str,
}

impl BootDefault {
    pub fn new(name: &'static str, description: &'static str, rationale: &'static str) -> Self {
        Self {
            name,
            description,
            rationale,
        }
    }

    pub fn shared_memory_type() -> Self {
        Self::new(
            "shared_memory_type",
            "Shared memory implementation for the main region holding shared buffers.",
            "sysv usually needs non-default kernel settings for large allocations. \
             The default is suggested.",
        )
    }

    pub fn dynamic_shared_memory_type() -> Self {
        Self::new(
            "dynamic_shared_memory_type",
            "Dynamic shared memory implementation.",
            "The default is usually best. It is suggested.",
        )
    }
}

impl Rule for BootDefault {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn evaluate(&self, snapshot: &Snapshot, _host: &HostFacts) -> Result<Suggestion> {
        let setting = snapshot.get(self.name)?;
        let boot_val = setting
            .boot_val
            .as_deref()
            .ok_or_else(|| {
                AdvisorError::query(format!("no boot value reported for {}", self.name))
            })?;

        if setting.value.matches(boot_val) {
            return Ok(Suggestion::none().restart());
        }
        setting.validate_enum(boot_val)?;
        Ok(Suggestion::new(self.rationale).suggest(boot_val).restart())
    }
}
