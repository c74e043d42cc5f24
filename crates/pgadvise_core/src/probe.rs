//! Host resource probing
//!
//! Production code uses `LinuxHostProbe`, which reads memory through sysinfo,
//! the huge page count through procfs and the stack limit through getrlimit.
//! Tests use `FakeHostProbe` with pre-configured readings.

use pgadvise_common::{AdvisorError, HostFacts, Result};
use std::fs;
use std::path::PathBuf;
use sysinfo::System;
use tracing::{debug, warn};

/// procfs view of `vm.nr_hugepages`
pub const NR_HUGEPAGES_PATH: &str = "/proc/sys/vm/nr_hugepages";

/// Host resource probe interface
pub trait HostProbe: Send + Sync {
    /// Total memory in bytes
    fn total_memory(&self) -> Result<u64>;

    /// Available memory in bytes
    fn available_memory(&self) -> Result<u64>;

    /// Kernel-configured huge page count
    fn nr_hugepages(&self) -> Result<u64>;

    /// Process stack soft limit in bytes
    fn stack_limit(&self) -> Result<u64>;
}

/// Read every facility once. Failures are kept per reading.
pub fn collect_facts(probe: &dyn HostProbe) -> HostFacts {
    let facts = HostFacts {
        total_memory: reading(probe.total_memory()),
        available_memory: reading(probe.available_memory()),
        nr_hugepages: reading(probe.nr_hugepages()),
        stack_limit: reading(probe.stack_limit()),
    };
    debug!(?facts, "Host facts collected");
    facts
}

fn reading(result: Result<u64>) -> std::result::Result<u64, String> {
    result.map_err(|e| {
        warn!("{}", e);
        match e {
            AdvisorError::Probe(message) => message,
            other => other.to_string(),
        }
    })
}

/// Probe backed by the running Linux host
pub struct LinuxHostProbe {
    nr_hugepages_path: PathBuf,
}

impl LinuxHostProbe {
    pub fn new() -> Self {
        Self {
            nr_hugepages_path: PathBuf::from(NR_HUGEPAGES_PATH),
        }
    }

    /// Read the huge page count from another file (containers, tests)
    pub fn with_nr_hugepages_path(path: impl Into<PathBuf>) -> Self {
        Self {
            nr_hugepages_path: path.into(),
        }
    }

    fn memory() -> System {
        let mut sys = System::new();
        sys.refresh_memory();
        sys
    }
}

impl Default for LinuxHostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for LinuxHostProbe {
    fn total_memory(&self) -> Result<u64> {
        match Self::memory().total_memory() {
            0 => Err(AdvisorError::probe("total memory reported as 0")),
            bytes => Ok(bytes),
        }
    }

    fn available_memory(&self) -> Result<u64> {
        let sys = Self::memory();
        if sys.total_memory() == 0 {
            return Err(AdvisorError::probe("memory statistics unavailable"));
        }
        Ok(sys.available_memory())
    }

    fn nr_hugepages(&self) -> Result<u64> {
        let raw = fs::read_to_string(&self.nr_hugepages_path).map_err(|e| {
            AdvisorError::probe(format!("{}: {}", self.nr_hugepages_path.display(), e))
        })?;
        raw.trim().parse::<u64>().map_err(|_| {
            AdvisorError::probe(format!(
                "{}: unexpected content '{}'",
                self.nr_hugepages_path.display(),
                raw.trim()
            ))
        })
    }

    fn stack_limit(&self) -> Result<u64> {
        use nix::sys::resource::{getrlimit, Resource};

        let (soft, _hard) = getrlimit(Resource::RLIMIT_STACK)
            .map_err(|e| AdvisorError::probe(format!("getrlimit(RLIMIT_STACK): {}", e)))?;
        if soft == libc::RLIM_INFINITY {
            return Err(AdvisorError::probe("stack soft limit is unlimited"));
        }
        Ok(soft as u64)
    }
}

/// Probe with fixed readings for tests
#[derive(Debug, Clone)]
pub struct FakeHostProbe {
    pub facts: HostFacts,
}

impl FakeHostProbe {
    pub fn new(
        total_memory: u64,
        available_memory: u64,
        nr_hugepages: u64,
        stack_limit: u64,
    ) -> Self {
        Self {
            facts: HostFacts::fixed(total_memory, available_memory, nr_hugepages, stack_limit),
        }
    }

    /// Make one facility unreadable
    pub fn failing_hugepages(mut self, message: &str) -> Self {
        self.facts.nr_hugepages = Err(message.to_string());
        self
    }

    pub fn failing_memory(mut self, message: &str) -> Self {
        self.facts.total_memory = Err(message.to_string());
        self.facts.available_memory = Err(message.to_string());
        self
    }
}

fn fake_reading(reading: &std::result::Result<u64, String>) -> Result<u64> {
    reading.clone().map_err(AdvisorError::Probe)
}

impl HostProbe for FakeHostProbe {
    fn total_memory(&self) -> Result<u64> {
        fake_reading(&self.facts.total_memory)
    }

    fn available_memory(&self) -> Result<u64> {
        fake_reading(&self.facts.available_memory)
    }

    fn nr_hugepages(&self) -> Result<u64> {
        fake_reading(&self.facts.nr_hugepages)
    }

    fn stack_limit(&self) -> Result<u64> {
        fake_reading(&self.facts.stack_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_nr_hugepages_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nr_hugepages");
        fs::write(&path, "128\n").unwrap();

        let probe = LinuxHostProbe::with_nr_hugepages_path(&path);
        assert_eq!(probe.nr_hugepages().unwrap(), 128);
    }

    #[test]
    fn test_nr_hugepages_unreadable_is_probe_error() {
        let tmp = TempDir::new().unwrap();
        let probe = LinuxHostProbe::with_nr_hugepages_path(tmp.path().join("missing"));
        assert!(matches!(probe.nr_hugepages(), Err(AdvisorError::Probe(_))));

        let garbage = tmp.path().join("garbage");
        fs::write(&garbage, "lots").unwrap();
        let probe = LinuxHostProbe::with_nr_hugepages_path(&garbage);
        assert!(matches!(probe.nr_hugepages(), Err(AdvisorError::Probe(_))));
    }

    #[test]
    fn test_collect_keeps_failures_per_reading() {
        let probe = FakeHostProbe::new(4 << 30, 2 << 30, 0, 8 << 20).failing_hugepages("denied");
        let facts = collect_facts(&probe);
        assert_eq!(facts.total_memory().unwrap(), 4 << 30);
        assert!(facts.nr_hugepages().is_err());
        assert_eq!(facts.stack_limit().unwrap(), 8 << 20);
    }
}
