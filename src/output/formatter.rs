//! Core formatting trait and the plain text implementation
//!
//! Line formats follow the classic speedtest console output so scripts that
//! scrape it keep working.

use crate::{
    error::AppError,
    models::{AverageResult, Server, SessionRecord, UserInfo},
    types::Direction,
};
use std::fmt::Write as _;

/// Main trait for text report formatting
pub trait ReportFormatter: Send + Sync {
    /// `Testing From IP: ...`
    fn format_user(&self, user: &UserInfo) -> String;

    /// One `[  ID]    dist km Name (Country) by Sponsor` line per server
    fn format_server_list(&self, servers: &[Server]) -> String;

    /// Header printed before a server session starts
    fn format_target(&self, server: &Server) -> String;

    fn format_latency(&self, server: &Server) -> String;

    /// Prefix printed before the progress dots of a phase
    fn format_phase_label(&self, direction: Direction) -> String;

    /// Throughput lines of a finished session, or its failure
    fn format_session_result(&self, record: &SessionRecord) -> String;

    fn format_average(&self, average: &AverageResult) -> String;

    fn format_warning(&self, warning: &str) -> String;

    fn format_error(&self, error: &AppError) -> String;
}

/// Configuration options for formatting
#[derive(Debug, Clone, Default)]
pub struct FormattingOptions {
    /// Enable colored output
    pub enable_color: bool,
    /// Show jitter, validation details and failure stages
    pub verbose_mode: bool,
}

pub const INVALID_RESULT_WARNING: &str = "Warning: Result seems to be wrong. Please speedtest again.";

pub(crate) fn server_line(server: &Server) -> String {
    server.to_string()
}

pub(crate) fn latency_text(server: &Server) -> String {
    match server.latency {
        Some(latency) => format!("{:?}", latency),
        None => "n/a".to_string(),
    }
}

pub(crate) fn mbps_text(value: Option<f64>) -> String {
    match value {
        Some(mbps) => format!("{:5.2}", mbps),
        None => "  n/a".to_string(),
    }
}

/// Uncolored output
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FormattingOptions {
        &self.options
    }
}

impl ReportFormatter for PlainFormatter {
    fn format_user(&self, user: &UserInfo) -> String {
        format!("Testing From IP: {}", user)
    }

    fn format_server_list(&self, servers: &[Server]) -> String {
        let mut output = String::new();
        for server in servers {
            let _ = writeln!(output, "{}", server_line(server));
        }
        output
    }

    fn format_target(&self, server: &Server) -> String {
        format!(" \nTarget Server: {}", server_line(server))
    }

    fn format_latency(&self, server: &Server) -> String {
        let mut line = format!("Latency: {}", latency_text(server));
        if self.options.verbose_mode {
            if let Some(jitter) = server.jitter {
                let _ = write!(line, " (jitter {:?})", jitter);
            }
        }
        line
    }

    fn format_phase_label(&self, direction: Direction) -> String {
        format!("{} Test: ", direction.label())
    }

    fn format_session_result(&self, record: &SessionRecord) -> String {
        let mut output = String::new();

        if let (Some(stage), Some(error)) = (&record.failed_stage, &record.error) {
            let _ = writeln!(output, " ");
            let _ = writeln!(output, "{}", self.format_warning(&format!("{} failed: {}", stage, error)));
            return output;
        }

        let _ = writeln!(output, " ");
        let _ = writeln!(output, "Download: {} Mbit/s", mbps_text(record.server.download_mbps));
        let _ = writeln!(output, "Upload: {} Mbit/s", mbps_text(record.server.upload_mbps));
        let _ = writeln!(output);

        if !record.valid {
            let _ = writeln!(output, "{}", INVALID_RESULT_WARNING);
            if self.options.verbose_mode {
                for warning in &record.warnings {
                    let _ = writeln!(output, "  - {}", warning);
                }
            }
        }
        output
    }

    fn format_average(&self, average: &AverageResult) -> String {
        format!(
            "Download Avg: {:5.2} Mbit/s\nUpload Avg: {:5.2} Mbit/s",
            average.download_mbps, average.upload_mbps
        )
    }

    fn format_warning(&self, warning: &str) -> String {
        if warning.starts_with("Warning:") {
            warning.to_string()
        } else {
            format!("Warning: {}", warning)
        }
    }

    fn format_error(&self, error: &AppError) -> String {
        error.format_for_console(false)
    }
}
