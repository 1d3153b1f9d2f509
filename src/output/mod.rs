//! Output formatting and display system
//!
//! Text mode streams a transcript while sessions run (through
//! [`ConsoleObserver`]) and ends with the averages; JSON mode stays silent
//! until the whole [`RunReport`] is serialized.

mod colored;
mod formatter;
mod json;
mod progress;

pub use colored::{ColorScheme, ColoredFormatter, SpeedLevel};
pub use formatter::{FormattingOptions, PlainFormatter, ReportFormatter, INVALID_RESULT_WARNING};
pub use json::render_json;
pub use progress::{stdout_writer, ConsoleObserver, PhaseProgress, SharedWriter};

use crate::{
    error::Result,
    models::{CandidateList, Config, RunReport, UserInfo},
};

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Create a formatter based on color support and preferences
    pub fn create_formatter(enable_color: bool, verbose: bool) -> Box<dyn ReportFormatter> {
        let options = FormattingOptions {
            enable_color,
            verbose_mode: verbose,
        };

        if enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }

    pub fn from_config(config: &Config) -> Box<dyn ReportFormatter> {
        Self::create_formatter(config.enable_color, config.verbose || config.debug)
    }
}

/// Renders everything that is not streamed live
pub struct OutputCoordinator {
    formatter: Box<dyn ReportFormatter>,
    json: bool,
}

impl OutputCoordinator {
    pub fn new(formatter: Box<dyn ReportFormatter>, json: bool) -> Self {
        Self { formatter, json }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(OutputFormatterFactory::from_config(config), config.json_output)
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Preamble for text mode; `None` in JSON mode or without user info
    pub fn render_user(&self, user: Option<&UserInfo>) -> Option<String> {
        match (self.json, user) {
            (false, Some(user)) => Some(self.formatter.format_user(user)),
            _ => None,
        }
    }

    pub fn render_user_warning(&self, config_url: &str) -> String {
        self.formatter.format_warning(&format!(
            "Cannot fetch user information. {} is temporarily unavailable.",
            config_url
        ))
    }

    /// Candidate listing for `--list`
    pub fn render_candidates(&self, candidates: &CandidateList) -> Result<String> {
        if self.json {
            return Ok(serde_json::to_string(candidates)?);
        }
        Ok(self.formatter.format_server_list(candidates.as_slice()))
    }

    /// Final output after all sessions ran
    pub fn render_report(&self, report: &RunReport) -> Result<String> {
        if self.json {
            return render_json(report, false);
        }

        Ok(report
            .average
            .as_ref()
            .map(|average| self.formatter.format_average(average))
            .unwrap_or_default())
    }

    pub fn formatter(&self) -> &dyn ReportFormatter {
        self.formatter.as_ref()
    }
}
