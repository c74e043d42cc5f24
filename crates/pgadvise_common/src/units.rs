//! Memory unit conversion
//!
//! PostgreSQL reports memory settings in B, kB, 8kB (blocks) or MB. Block
//! sized values assume the default `block_size` of 8192 bytes.

use crate::error::{AdvisorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Assumed server block size in bytes
pub const BLOCK_SIZE: u64 = 8192;

/// One mebibyte in bytes
pub const MB: u64 = 1024 * 1024;

/// One gibibyte in bytes
pub const GIB: u64 = 1024 * MB;

/// Byte-oriented units understood by the advisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "B")]
    Bytes,
    #[serde(rename = "kB")]
    Kilobytes,
    #[serde(rename = "8kB")]
    Blocks,
    #[serde(rename = "MB")]
    Megabytes,
}

impl Unit {
    pub const ALL: [Unit; 4] = [Unit::Bytes, Unit::Kilobytes, Unit::Blocks, Unit::Megabytes];

    /// Size of one unit in bytes
    pub fn bytes(&self) -> u64 {
        match self {
            Unit::Bytes => 1,
            Unit::Kilobytes => 1024,
            Unit::Blocks => BLOCK_SIZE,
            Unit::Megabytes => MB,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Bytes => "B",
            Unit::Kilobytes => "kB",
            Unit::Blocks => "8kB",
            Unit::Megabytes => "MB",
        }
    }

    /// Parse the unit column of a catalog row; an absent unit is an error
    /// for every rule that needs to do arithmetic on the value.
    pub fn from_catalog(unit: Option<&str>) -> Result<Unit> {
        match unit {
            Some(token) => token.parse(),
            None => Err(AdvisorError::UnsupportedUnit("<none>".to_string())),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Unit {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "B" => Ok(Unit::Bytes),
            "kB" => Ok(Unit::Kilobytes),
            "8kB" => Ok(Unit::Blocks),
            "MB" => Ok(Unit::Megabytes),
            other => Err(AdvisorError::UnsupportedUnit(other.to_string())),
        }
    }
}

/// Convert `value` expressed in `from` into `to`.
pub fn convert(value: f64, from: Unit, to: Unit) -> f64 {
    if from == to {
        return value;
    }
    value * from.bytes() as f64 / to.bytes() as f64
}

/// Convert between unit tokens as they appear in the catalog.
pub fn convert_tokens(value: f64, from: &str, to: &str) -> Result<f64> {
    let from: Unit = from.parse()?;
    let to: Unit = to.parse()?;
    Ok(convert(value, from, to))
}

/// Format a quantity as the integer text PostgreSQL accepts for integer settings.
pub fn format_integer(value: f64) -> String {
    format!("{}", value.round() as i64)
}
