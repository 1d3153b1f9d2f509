//! Command-line interface

use crate::types::ExitPolicy;
use clap::{ArgAction, Parser};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT"),
    ", built ",
    env!("BUILD_TIME"),
    ", ",
    env!("TARGET_TRIPLE"),
    ")"
);

/// DSL Speed Observer - measure latency, download and upload speed against speedtest servers
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "dso")]
#[command(version, long_version = LONG_VERSION, about, long_about = None)]
#[command(after_help = "Environment variables and a .env file in the working directory supply defaults; flags win.")]
pub struct Cli {
    /// Use fewer connections and cap the bytes moved per phase
    #[arg(long)]
    pub saving_mode: bool,

    /// Print one JSON report instead of the text transcript
    #[arg(long)]
    pub json: bool,

    /// Test only this server id (can be used multiple times)
    #[arg(short, long = "server", value_name = "ID", action = ArgAction::Append)]
    pub servers: Vec<String>,

    /// Number of servers to benchmark; 0 picks the single best
    #[arg(short = 'm', long, value_name = "N")]
    pub max_servers: Option<usize>,

    /// Latency samples per server
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..=100))]
    pub count: Option<u32>,

    /// Concurrent connections per benchmark phase
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..=64))]
    pub connections: Option<u32>,

    /// Measured seconds per phase, after warm-up
    #[arg(short, long, value_name = "SECS", value_parser = parse_duration)]
    pub duration: Option<u64>,

    /// Request timeout in seconds
    #[arg(short, long, value_name = "SECS", value_parser = parse_duration)]
    pub timeout: Option<u64>,

    /// List candidate servers and exit without measuring
    #[arg(short, long)]
    pub list: bool,

    /// When partial failures make the run fail: any-success or all-success
    #[arg(long, value_name = "POLICY")]
    pub exit_policy: Option<ExitPolicy>,

    /// Describe supported environment variables and check the environment and .env, then exit
    #[arg(long)]
    pub env_help: bool,

    /// Write an example .env.example into the working directory, then exit
    #[arg(long)]
    pub init_env: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        !self.no_color && !self.json && supports_color()
    }

    /// Get configuration summary for display
    pub fn get_config_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("Command line:\n");
        summary.push_str(&format!("  Saving mode: {}\n", self.saving_mode));
        summary.push_str(&format!("  JSON output: {}\n", self.json));
        if !self.servers.is_empty() {
            summary.push_str(&format!("  Servers: {}\n", self.servers.join(", ")));
        }
        if let Some(max) = self.max_servers {
            summary.push_str(&format!("  Max servers: {}\n", max));
        }
        if let Some(count) = self.count {
            summary.push_str(&format!("  Ping count: {}\n", count));
        }
        if let Some(connections) = self.connections {
            summary.push_str(&format!("  Connections: {}\n", connections));
        }
        if let Some(duration) = self.duration {
            summary.push_str(&format!("  Duration: {}s\n", duration));
        }
        if let Some(timeout) = self.timeout {
            summary.push_str(&format!("  Timeout: {}s\n", timeout));
        }
        if let Some(policy) = self.exit_policy {
            summary.push_str(&format!("  Exit policy: {}\n", policy));
        }

        summary
    }
}

/// Parse a whole number of seconds between 1 and 300
fn parse_duration(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid duration: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Duration must be greater than 0".to_string())
            } else if secs > 300 {
                Err("Duration cannot exceed 300 seconds".to_string())
            } else {
                Ok(secs)
            }
        })
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(target_os = "windows")]
    {
        if std::env::var("ANSICON").is_ok() || std::env::var("ConEmuANSI").is_ok() {
            return true;
        }
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}
