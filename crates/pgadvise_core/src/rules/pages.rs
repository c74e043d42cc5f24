//! Huge page rules
//!
//! Both rules key off the kernel's `vm.nr_hugepages`: with no huge pages
//! reserved the server cannot use them, whatever it is configured to do.

use super::{Rule, Suggestion};
use crate::catalog::Snapshot;
use pgadvise_common::{HostFacts, Result};

pub struct HugePages;

impl Rule for HugePages {
    fn name(&self) -> &'static str {
        "huge_pages"
    }

    fn description(&self) -> &'static str {
        "Whether huge pages are requested for the main shared memory area."
    }

    fn evaluate(&self, snapshot: &Snapshot, host: &HostFacts) -> Result<Suggestion> {
        let setting = snapshot.get(self.name())?;
        let reserved = host.nr_hugepages()?;

        let suggestion = if reserved == 0 {
            Suggestion::new(
                "The kernel reserves no huge pages (vm.nr_hugepages is 0), so the server \
                 cannot use them either.",
            )
            .suggest("off")
        } else {
            match setting.value.to_string().as_str() {
                "on" => Suggestion::new(
                    "With 'on' the server refuses to start when huge pages cannot be \
                     allocated. 'try' uses them when possible and falls back otherwise.",
                )
                .suggest("try"),
                "off" => Suggestion::new(
                    "The kernel reserves huge pages. 'try' uses them for smaller page tables \
                     and less memory management overhead, and falls back if they fail.",
                )
                .suggest("try"),
                _ => Suggestion::none(),
            }
        };

        if let Some(target) = &suggestion.value {
            setting.validate_enum(target)?;
        }
        Ok(suggestion.restart())
    }
}

pub struct HugePageSize;

impl Rule for HugePageSize {
    fn name(&self) -> &'static str {
        "huge_page_size"
    }

    fn description(&self) -> &'static str {
        "Size of huge pages when huge_pages is enabled."
    }

    fn evaluate(&self, snapshot: &Snapshot, host: &HostFacts) -> Result<Suggestion> {
        let setting = snapshot.get(self.name())?;
        if host.nr_hugepages()? == 0 {
            return Ok(Suggestion::none());
        }

        if setting.integer()? != 0 {
            return Ok(Suggestion::new(
                "A size other than the kernel's fragments memory. 0 uses the system \
                 default huge page size.",
            )
            .suggest("0")
            .restart());
        }
        Ok(Suggestion::none().restart())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SettingRow;
    use pgadvise_common::AdvisorError;

    fn huge_pages(value: &str, allowed: &[&str]) -> Snapshot {
        Snapshot::from_settings(vec![SettingRow::enumerated("huge_pages", value, allowed)
            .into_setting()
            .unwrap()])
    }

    #[test]
    fn test_try_left_alone_when_pages_reserved() {
        let snap = huge_pages("try", &["off", "on", "try"]);
        let host = HostFacts::fixed(1 << 30, 1 << 30, 64, 8 << 20);
        assert!(HugePages.evaluate(&snap, &host).unwrap().value.is_none());
    }

    #[test]
    fn test_target_outside_live_set_is_error() {
        let snap = huge_pages("on", &["off", "on"]);
        let host = HostFacts::fixed(1 << 30, 1 << 30, 64, 8 << 20);
        let err = HugePages.evaluate(&snap, &host).unwrap_err();
        assert!(matches!(err, AdvisorError::EnumValidation { ref value, .. } if value == "try"));
    }

    #[test]
    fn test_huge_page_size_inert_without_pages() {
        let snap = Snapshot::from_settings(vec![SettingRow::integer(
            "huge_page_size",
            2048,
            Some("kB"),
        )
        .into_setting()
        .unwrap()]);
        let none = HostFacts::fixed(1 << 30, 1 << 30, 0, 8 << 20);
        assert_eq!(HugePageSize.evaluate(&snap, &none).unwrap(), Suggestion::none());

        let some = HostFacts::fixed(1 << 30, 1 << 30, 16, 8 << 20);
        let suggestion = HugePageSize.evaluate(&snap, &some).unwrap();
        assert_eq!(suggestion.value.as_deref(), Some("0"));
        assert!(suggestion.requires_restart);
    }
}
