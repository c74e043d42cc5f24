//! pgadvise common - shared types for the PostgreSQL resource advisor
//!
//! Database-free pieces: error taxonomy, unit arithmetic, power-of-two
//! rounding, typed settings, host facts and configuration.

pub mod config;
pub mod error;
pub mod host;
pub mod power_of_two;
pub mod setting;
pub mod units;

pub use config::AdvisorConfig;
pub use error::{AdvisorError, Result};
pub use host::HostFacts;
pub use power_of_two::round_to_power_of_two;
pub use setting::{ResourceSetting, SettingValue, SuggestionPatch};
pub use units::Unit;
