//! Data models and structures for the speed observer

pub mod config;
pub mod report;
pub mod server;

// Re-export main model types
pub use config::Config;
pub use report::{AverageResult, RunReport, SessionRecord, SessionStage, ValidationWarning};
pub use server::{CandidateList, Server, UserInfo};
