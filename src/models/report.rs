//! Per-session records and the final run report

use super::server::{Server, UserInfo};
use crate::types::{MeasurementMode, SessionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Non-fatal annotation attached to a suspicious result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// Latency was measured but a phase moved no data
    ZeroThroughput { direction: String },
    /// Throughput is negative, not finite, or above the plausibility bound
    OutOfBounds { direction: String, mbps: f64 },
    /// Download and upload differ by more than the allowed ratio
    Asymmetric { ratio: f64 },
    /// A phase has no recorded value at all
    Missing { field: String },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroThroughput { direction } => {
                write!(f, "{} throughput is zero despite a reachable server", direction)
            }
            Self::OutOfBounds { direction, mbps } => {
                write!(f, "{} throughput {:.2} Mbit/s is outside plausible bounds", direction, mbps)
            }
            Self::Asymmetric { ratio } => {
                write!(f, "download/upload ratio {:.1} is implausible", ratio)
            }
            Self::Missing { field } => write!(f, "{} was not measured", field),
        }
    }
}

/// Stage of a server session, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Probing,
    Download,
    Upload,
    Validating,
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Probing => "latency probe",
            Self::Download => "download benchmark",
            Self::Upload => "upload benchmark",
            Self::Validating => "validation",
        };
        f.write_str(name)
    }
}

/// Everything reported about one server session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(flatten)]
    pub server: Server,
    pub mode: MeasurementMode,
    pub status: SessionStatus,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ValidationWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<SessionStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionRecord {
    pub fn completed(server: Server, mode: MeasurementMode, warnings: Vec<ValidationWarning>) -> Self {
        Self {
            server,
            mode,
            status: SessionStatus::Completed,
            valid: warnings.is_empty(),
            warnings,
            failed_stage: None,
            error: None,
        }
    }

    pub fn failed(server: Server, mode: MeasurementMode, stage: SessionStage, error: String) -> Self {
        Self {
            server,
            mode,
            status: SessionStatus::Failed,
            valid: false,
            warnings: Vec::new(),
            failed_stage: Some(stage),
            error: Some(error),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

/// Arithmetic mean over completed sessions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AverageResult {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub server_count: usize,
}

/// Structured result of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub user_info: Option<UserInfo>,
    pub servers: Vec<SessionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<AverageResult>,
}

impl RunReport {
    pub fn new(user_info: Option<UserInfo>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_info,
            servers: Vec::new(),
            average: None,
        }
    }

    pub fn completed_sessions(&self) -> impl Iterator<Item = &SessionRecord> {
        self.servers.iter().filter(|r| r.is_completed())
    }

    pub fn completed_count(&self) -> usize {
        self.completed_sessions().count()
    }

    pub fn failed_count(&self) -> usize {
        self.servers.len() - self.completed_count()
    }
}
