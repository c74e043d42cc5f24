//! Resource settings as read from `pg_settings`
//!
//! Values are typed once, when a catalog row enters the snapshot, so rules
//! never re-parse strings:
//! - `integer` rows become `SettingValue::Integer`
//! - `real` rows become `SettingValue::Real`
//! - `bool` rows become `SettingValue::Bool`
//! - `enum` rows carry their live value set along with the value

use crate::error::{AdvisorError, Result};
use crate::units::Unit;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Tolerance used when comparing real-valued settings
const REAL_EPSILON: f64 = 1e-9;

/// Typed value of a catalog setting
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Integer(i64),
    Real(f64),
    Bool(bool),
    Enum { value: String, allowed: Vec<String> },
    Text(String),
}

impl SettingValue {
    /// Decide the value's variant from the catalog's `vartype` column.
    pub fn from_catalog(
        name: &str,
        vartype: &str,
        setting: &str,
        enumvals: Option<Vec<String>>,
    ) -> Result<Self> {
        match vartype {
            "integer" => setting
                .trim()
                .parse::<i64>()
                .map(SettingValue::Integer)
                .map_err(|_| AdvisorError::malformed(name, setting)),
            "real" => setting
                .trim()
                .parse::<f64>()
                .map(SettingValue::Real)
                .map_err(|_| AdvisorError::malformed(name, setting)),
            "bool" => match setting {
                "on" | "true" => Ok(SettingValue::Bool(true)),
                "off" | "false" => Ok(SettingValue::Bool(false)),
                _ => Err(AdvisorError::malformed(name, setting)),
            },
            "enum" => Ok(SettingValue::Enum {
                value: setting.to_string(),
                allowed: enumvals.unwrap_or_default(),
            }),
            _ => Ok(SettingValue::Text(setting.to_string())),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SettingValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of integer and real values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Integer(v) => Some(*v as f64),
            SettingValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// Live enum set, if this is an enum setting
    pub fn allowed(&self) -> Option<&[String]> {
        match self {
            SettingValue::Enum { allowed, .. } => Some(allowed),
            _ => None,
        }
    }

    /// Whether `candidate` (in catalog text form) denotes this same value.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            SettingValue::Integer(v) => candidate.trim().parse::<i64>().map_or(false, |c| c == *v),
            SettingValue::Real(v) => candidate
                .trim()
                .parse::<f64>()
                .map_or(false, |c| (c - v).abs() < REAL_EPSILON),
            SettingValue::Bool(v) => match candidate {
                "on" | "true" => *v,
                "off" | "false" => !*v,
                _ => false,
            },
            SettingValue::Enum { value, .. } => value == candidate,
            SettingValue::Text(value) => value == candidate,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Integer(v) => write!(f, "{}", v),
            SettingValue::Real(v) => write!(f, "{}", v),
            SettingValue::Bool(v) => write!(f, "{}", if *v { "on" } else { "off" }),
            SettingValue::Enum { value, .. } => write!(f, "{}", value),
            SettingValue::Text(value) => write!(f, "{}", value),
        }
    }
}

impl Serialize for SettingValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A tracked server parameter together with the advisor's verdict on it
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSetting {
    /// Name of the setting
    pub name: String,
    /// Current value
    pub value: SettingValue,
    /// s, ms, kB, 8kB, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Compiled-in default
    #[serde(skip)]
    pub boot_val: Option<String>,
    /// Catalog context (postmaster, sighup, user, ...)
    #[serde(skip)]
    pub context: Option<String>,
    /// Value suggested by the last check, in the setting's own unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_value: Option<String>,
    /// Why a value was (or was not) suggested
    pub details: String,
    /// Whether the check failed
    pub got_error: bool,
    /// Whether applying a new value needs a server restart
    pub requires_restart: bool,
}

impl ResourceSetting {
    pub fn new(name: impl Into<String>, value: SettingValue, unit: Option<&str>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.map(str::to_string),
            boot_val: None,
            context: None,
            suggested_value: None,
            details: String::new(),
            got_error: false,
            requires_restart: false,
        }
    }

    pub fn with_boot_val(mut self, boot_val: impl Into<String>) -> Self {
        self.boot_val = Some(boot_val.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Unit of the value; fails for settings without a byte-oriented unit.
    pub fn memory_unit(&self) -> Result<Unit> {
        Unit::from_catalog(self.unit.as_deref())
    }

    /// Integer value, or a malformed-value error naming the setting.
    pub fn integer(&self) -> Result<i64> {
        self.value
            .as_integer()
            .ok_or_else(|| AdvisorError::malformed(&self.name, self.value.to_string()))
    }

    /// Numeric value, or a malformed-value error naming the setting.
    pub fn number(&self) -> Result<f64> {
        self.value
            .as_f64()
            .ok_or_else(|| AdvisorError::malformed(&self.name, self.value.to_string()))
    }

    /// Startup-only parameters can only change with a restart.
    pub fn is_postmaster(&self) -> bool {
        self.context.as_deref() == Some("postmaster")
    }

    /// Check `candidate` against the live enum set of this setting.
    pub fn validate_enum(&self, candidate: &str) -> Result<()> {
        let allowed = match self.value.allowed() {
            Some(allowed) => allowed,
            None => return Ok(()),
        };
        if allowed.iter().any(|v| v == candidate) {
            Ok(())
        } else {
            Err(AdvisorError::EnumValidation {
                setting: self.name.clone(),
                value: candidate.to_string(),
                allowed: allowed.join(","),
            })
        }
    }

    /// No-op suggestions are never surfaced.
    pub fn clear_if_current(&mut self) {
        if let Some(suggested) = &self.suggested_value {
            if self.value.matches(suggested) {
                self.suggested_value = None;
            }
        }
    }

    /// Reset the verdict before a new evaluation.
    pub fn reset_verdict(&mut self) {
        self.suggested_value = None;
        self.details.clear();
        self.got_error = false;
        self.requires_restart = false;
    }
}

/// One accepted suggestion sent back for persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionPatch {
    pub name: String,
    pub suggested_value: String,
}

impl SuggestionPatch {
    pub fn new(name: impl Into<String>, suggested_value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suggested_value: suggested_value.into(),
        }
    }
}

impl std::str::FromStr for SuggestionPatch {
    type Err = AdvisorError;

    /// Parse `name=value`.
    fn from_str(s: &str) -> Result<Self> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| {
                AdvisorError::invalid_input(format!("expected NAME=VALUE, got '{}'", s))
            })?;
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() || value.is_empty() {
            return Err(AdvisorError::invalid_input(format!(
                "expected NAME=VALUE, got '{}'",
                s
            )));
        }
        Ok(Self::new(name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn huge_pages(value: &str) -> ResourceSetting {
        let value = SettingValue::from_catalog(
            "huge_pages",
            "enum",
            value,
            Some(vec!["off".into(), "on".into(), "try".into()]),
        )
        .unwrap();
        ResourceSetting::new("huge_pages", value, None)
    }

    #[test]
    fn test_typed_from_catalog() {
        assert_eq!(
            SettingValue::from_catalog("work_mem", "integer", "4096", None).unwrap(),
            SettingValue::Integer(4096)
        );
        assert_eq!(
            SettingValue::from_catalog("hash_mem_multiplier", "real", "2", None).unwrap(),
            SettingValue::Real(2.0)
        );
        assert_eq!(
            SettingValue::from_catalog("fsync", "bool", "on", None).unwrap(),
            SettingValue::Bool(true)
        );
        assert!(SettingValue::from_catalog("work_mem", "integer", "4MB", None).is_err());
    }

    #[test]
    fn test_matches_is_type_aware() {
        assert!(SettingValue::Real(2.0).matches("2"));
        assert!(SettingValue::Real(2.5).matches("2.50"));
        assert!(SettingValue::Integer(-1).matches("-1"));
        assert!(!SettingValue::Integer(64).matches("64.5"));
        assert!(SettingValue::Bool(false).matches("off"));
    }

    #[test]
    fn test_clear_if_current() {
        let mut setting = huge_pages("try");
        setting.suggested_value = Some("try".to_string());
        setting.clear_if_current();
        assert!(setting.suggested_value.is_none());

        setting.suggested_value = Some("off".to_string());
        setting.clear_if_current();
        assert_eq!(setting.suggested_value.as_deref(), Some("off"));
    }

    #[test]
    fn test_validate_enum_rejects_unknown() {
        let setting = huge_pages("on");
        assert!(setting.validate_enum("try").is_ok());
        let err = setting.validate_enum("maybe").unwrap_err();
        assert!(matches!(err, AdvisorError::EnumValidation { .. }));
    }

    #[test]
    fn test_serialized_value_is_text() {
        let setting = ResourceSetting::new("work_mem", SettingValue::Integer(4096), Some("kB"));
        let json = serde_json::to_value(&setting).unwrap();
        assert_eq!(json["value"], "4096");
        assert_eq!(json["unit"], "kB");
        assert!(json.get("suggested_value").is_none());
    }

    #[test]
    fn test_patch_from_str() {
        let patch: SuggestionPatch = "work_mem = 65536".parse().unwrap();
        assert_eq!(patch, SuggestionPatch::new("work_mem", "65536"));
        assert!("work_mem".parse::<SuggestionPatch>().is_err());
        assert!("=1".parse::<SuggestionPatch>().is_err());
    }
}
