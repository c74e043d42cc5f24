//! Host resource facts consumed by the check rules.
//!
//! Each reading is kept as its own result so that one unreadable facility
//! fails only the rules that depend on it.

use crate::error::{AdvisorError, Result};
use serde::Serialize;

/// Outcome of reading one OS facility
pub type Reading = std::result::Result<u64, String>;

/// Snapshot of host resources taken at the start of a check cycle
#[derive(Debug, Clone, Serialize)]
pub struct HostFacts {
    /// Total memory in bytes
    pub total_memory: Reading,
    /// Available memory in bytes
    pub available_memory: Reading,
    /// Kernel `vm.nr_hugepages`
    pub nr_hugepages: Reading,
    /// Stack soft limit in bytes
    pub stack_limit: Reading,
}

impl HostFacts {
    /// Facts where every reading succeeded
    pub fn fixed(
        total_memory: u64,
        available_memory: u64,
        nr_hugepages: u64,
        stack_limit: u64,
    ) -> Self {
        Self {
            total_memory: Ok(total_memory),
            available_memory: Ok(available_memory),
            nr_hugepages: Ok(nr_hugepages),
            stack_limit: Ok(stack_limit),
        }
    }

    pub fn total_memory(&self) -> Result<u64> {
        read("total memory", &self.total_memory)
    }

    pub fn available_memory(&self) -> Result<u64> {
        read("available memory", &self.available_memory)
    }

    pub fn nr_hugepages(&self) -> Result<u64> {
        read("vm.nr_hugepages", &self.nr_hugepages)
    }

    pub fn stack_limit(&self) -> Result<u64> {
        read("stack limit", &self.stack_limit)
    }
}

fn read(what: &str, reading: &Reading) -> Result<u64> {
    reading
        .clone()
        .map_err(|e| AdvisorError::probe(format!("could not read {}: {}", what, e)))
}
