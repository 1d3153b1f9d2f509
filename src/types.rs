//! Type definitions and aliases

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Which way bytes flow during a benchmark phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Read from the server
    Download,
    /// Write to the server
    Upload,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Download => "Download",
            Direction::Upload => "Upload",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Measurement intensity for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementMode {
    /// All configured connections, no byte cap
    Full,
    /// Fewer connections and a per-phase byte cap to limit data usage
    Saving,
}

impl MeasurementMode {
    pub fn from_saving_flag(saving: bool) -> Self {
        if saving {
            Self::Saving
        } else {
            Self::Full
        }
    }

    pub fn is_saving(&self) -> bool {
        matches!(self, Self::Saving)
    }
}

/// How per-server failures affect the process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitPolicy {
    /// Succeed when at least one server session completed
    #[default]
    AnySuccess,
    /// Fail when any server session failed
    AllSuccess,
}

impl FromStr for ExitPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "any-success" | "any" => Ok(Self::AnySuccess),
            "all-success" | "all" => Ok(Self::AllSuccess),
            other => Err(AppError::parse(format!("Invalid exit policy: {}", other))),
        }
    }
}

impl fmt::Display for ExitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnySuccess => f.write_str("any-success"),
            Self::AllSuccess => f.write_str("all-success"),
        }
    }
}

/// Outcome of one server session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Latency and both throughput phases completed
    Completed,
    /// A probe or benchmark stage failed; the server is excluded from averages
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_policy_parsing() {
        assert_eq!("any-success".parse::<ExitPolicy>().unwrap(), ExitPolicy::AnySuccess);
        assert_eq!("ALL".parse::<ExitPolicy>().unwrap(), ExitPolicy::AllSuccess);
        assert!("sometimes".parse::<ExitPolicy>().is_err());
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(MeasurementMode::from_saving_flag(true), MeasurementMode::Saving);
        assert!(!MeasurementMode::from_saving_flag(false).is_saving());
    }

    #[test]
    fn test_direction_serialization() {
        assert_eq!(serde_json::to_string(&Direction::Upload).unwrap(), "\"upload\"");
        assert_eq!(Direction::Download.to_string(), "Download");
    }
}
