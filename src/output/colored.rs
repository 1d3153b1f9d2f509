//! Colored formatter implementation with terminal color support

use super::formatter::{
    latency_text, mbps_text, server_line, FormattingOptions, PlainFormatter, ReportFormatter,
    INVALID_RESULT_WARNING,
};
use crate::{
    error::AppError,
    models::{AverageResult, Server, SessionRecord, UserInfo},
    types::Direction,
};
use colored::*;
use std::fmt::Write as _;

/// Speed classification for color coding
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedLevel {
    Fast,     // >= 100 Mbit/s
    Good,     // 25-100 Mbit/s
    Fair,     // 5-25 Mbit/s
    Slow,     // < 5 Mbit/s
}

impl SpeedLevel {
    pub fn from_mbps(mbps: f64) -> Self {
        if mbps >= 100.0 {
            Self::Fast
        } else if mbps >= 25.0 {
            Self::Good
        } else if mbps >= 5.0 {
            Self::Fair
        } else {
            Self::Slow
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Fast => Color::Green,
            Self::Good => Color::Cyan,
            Self::Fair => Color::Yellow,
            Self::Slow => Color::Red,
        }
    }
}

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub warning: Color,
    pub info: Color,
    pub muted: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            warning: Color::Yellow,
            info: Color::Cyan,
            muted: Color::BrightBlack,
        }
    }
}

/// Colored formatter; falls back to the plain one for layout
pub struct ColoredFormatter {
    plain: PlainFormatter,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self {
            plain: PlainFormatter::new(options),
            color_scheme: ColorScheme::default(),
        }
    }

    pub fn with_color_scheme(mut self, color_scheme: ColorScheme) -> Self {
        self.color_scheme = color_scheme;
        self
    }

    fn speed(&self, value: Option<f64>) -> ColoredString {
        let text = mbps_text(value);
        match value {
            Some(mbps) if mbps.is_finite() => text.color(SpeedLevel::from_mbps(mbps).color()).bold(),
            _ => text.color(self.color_scheme.muted),
        }
    }
}

impl ReportFormatter for ColoredFormatter {
    fn format_user(&self, user: &UserInfo) -> String {
        format!("{} {}", "Testing From IP:".color(self.color_scheme.header).bold(), user)
    }

    fn format_server_list(&self, servers: &[Server]) -> String {
        let mut output = String::new();
        for server in servers {
            let _ = writeln!(output, "{}", server_line(server).color(self.color_scheme.muted));
        }
        output
    }

    fn format_target(&self, server: &Server) -> String {
        format!(
            " \n{} {}",
            "Target Server:".color(self.color_scheme.header).bold(),
            server_line(server)
        )
    }

    fn format_latency(&self, server: &Server) -> String {
        let mut line = format!(
            "{} {}",
            "Latency:".color(self.color_scheme.info),
            latency_text(server).bold()
        );
        if self.plain.options().verbose_mode {
            if let Some(jitter) = server.jitter {
                let _ = write!(line, " {}", format!("(jitter {:?})", jitter).color(self.color_scheme.muted));
            }
        }
        line
    }

    fn format_phase_label(&self, direction: Direction) -> String {
        self.plain
            .format_phase_label(direction)
            .color(self.color_scheme.info)
            .to_string()
    }

    fn format_session_result(&self, record: &SessionRecord) -> String {
        if record.failed_stage.is_some() {
            return self.plain.format_session_result(record).color(self.color_scheme.warning).to_string();
        }

        let mut output = String::new();
        let _ = writeln!(output, " ");
        let _ = writeln!(output, "Download: {} Mbit/s", self.speed(record.server.download_mbps));
        let _ = writeln!(output, "Upload: {} Mbit/s", self.speed(record.server.upload_mbps));
        let _ = writeln!(output);

        if !record.valid {
            let _ = writeln!(output, "{}", INVALID_RESULT_WARNING.color(self.color_scheme.warning).bold());
            if self.plain.options().verbose_mode {
                for warning in &record.warnings {
                    let _ = writeln!(output, "  - {}", warning.to_string().color(self.color_scheme.warning));
                }
            }
        }
        output
    }

    fn format_average(&self, average: &AverageResult) -> String {
        format!(
            "{} {} Mbit/s\n{} {} Mbit/s",
            "Download Avg:".color(self.color_scheme.header).bold(),
            self.speed(Some(average.download_mbps)),
            "Upload Avg:".color(self.color_scheme.header).bold(),
            self.speed(Some(average.upload_mbps)),
        )
    }

    fn format_warning(&self, warning: &str) -> String {
        self.plain.format_warning(warning).color(self.color_scheme.warning).to_string()
    }

    fn format_error(&self, error: &AppError) -> String {
        error.format_for_console(true)
    }
}
