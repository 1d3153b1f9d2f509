//! Environment variable handling and .env file management

use crate::config::parser::display_config_summary;
use crate::error::{AppError, Result};
use crate::models::Config;
use crate::types::ExitPolicy;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file if it exists
    pub fn load_env_file(debug: bool) -> Result<()> {
        if Path::new(".env").exists() {
            dotenv::from_filename(".env")
                .map_err(|e| AppError::config(format!("Failed to load .env file: {}", e)))?;

            if debug {
                eprintln!("Loaded configuration from .env file");
            }
        } else if debug {
            eprintln!("No .env file found, using defaults and CLI arguments");
        }

        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        let defaults = Config::default();
        format!(
            r#"# DSL Speed Observer Configuration
#
# Values here are defaults for every run; command-line flags override them.

# Client config endpoint (reports your IP, ISP and location)
# CONFIG_URL={config_url}

# Server list endpoint
# SERVERS_URL={servers_url}

# Test only these server ids (comma-separated)
# SERVER_IDS=1234,5678

# Number of servers to benchmark; 0 picks the single best
# MAX_SERVERS={max_servers}

# Nearest candidates probed while choosing servers
# PROBE_SUBSET={probe_subset}

# Latency samples per server (1-100)
# PING_COUNT={ping_count}

# Concurrent connections per phase (1-64), and in saving mode
# CONNECTIONS={connections}
# SAVING_CONNECTIONS={saving_connections}

# Measured seconds per phase and the discarded warm-up before it
# MEASURE_SECONDS={measure_seconds}
# WARMUP_MS={warmup_ms}

# Request timeout in seconds
# TIMEOUT_SECONDS={timeout}

# Exit policy for partially failed runs (any-success/all-success)
# EXIT_POLICY={exit_policy}

# Enable colored output (true/false)
# ENABLE_COLOR=true
"#,
            config_url = defaults.config_url,
            servers_url = defaults.servers_url,
            max_servers = defaults.max_servers,
            probe_subset = defaults.probe_subset,
            ping_count = defaults.ping_count,
            connections = defaults.connections,
            saving_connections = defaults.saving_connections,
            measure_seconds = defaults.measure_seconds,
            warmup_ms = defaults.warmup_ms,
            timeout = defaults.timeout_seconds,
            exit_policy = defaults.exit_policy,
        )
    }

    /// Save example .env file to disk; an existing file is left untouched
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        if path.exists() {
            return Err(AppError::config(format!(
                "{} already exists; remove it first to regenerate",
                path.display()
            )));
        }

        let content = Self::create_example_env_content();
        std::fs::write(path, content)
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))?;

        Ok(())
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "CONFIG_URL" | "SERVERS_URL" => {
                url::Url::parse(value)
                    .map_err(|e| AppError::config(format!("Invalid {} '{}': {}", key, value, e)))?;
            }
            "SERVER_IDS" => {
                for id in value.split(',') {
                    let id = id.trim();
                    if !id.is_empty() && !id.chars().all(|c| c.is_ascii_alphanumeric()) {
                        return Err(AppError::config(format!("Invalid SERVER_IDS entry '{}'", id)));
                    }
                }
            }
            "MAX_SERVERS" | "WARMUP_MS" => {
                value
                    .parse::<u64>()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
            "PROBE_SUBSET" | "SAVING_CONNECTIONS" => {
                check_range(key, value, 1, u64::MAX)?;
            }
            "PING_COUNT" => check_range(key, value, 1, 100)?,
            "CONNECTIONS" => check_range(key, value, 1, 64)?,
            "MEASURE_SECONDS" => check_range(key, value, 1, 120)?,
            "TIMEOUT_SECONDS" => check_range(key, value, 1, 300)?,
            "EXIT_POLICY" => {
                value.parse::<ExitPolicy>()?;
            }
            "ENABLE_COLOR" => {
                value
                    .parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", value, e)))?;
            }
            _ => {
                // Unknown environment variable, ignore
            }
        }

        Ok(())
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("CONFIG_URL", "Client config endpoint", "https://www.speedtest.net/speedtest-config.php"),
            ("SERVERS_URL", "Server list endpoint", "https://www.speedtest.net/api/js/servers?engine=js"),
            ("SERVER_IDS", "Comma-separated server ids to test", "1234,5678"),
            ("MAX_SERVERS", "Servers to benchmark, 0 for the single best", "3"),
            ("PROBE_SUBSET", "Nearest candidates probed during selection", "10"),
            ("PING_COUNT", "Latency samples per server (1-100)", "5"),
            ("CONNECTIONS", "Concurrent connections per phase (1-64)", "4"),
            ("SAVING_CONNECTIONS", "Connections per phase in saving mode", "1"),
            ("MEASURE_SECONDS", "Measured seconds per phase (1-120)", "8"),
            ("WARMUP_MS", "Discarded warm-up per phase in milliseconds", "1000"),
            ("TIMEOUT_SECONDS", "Request timeout in seconds (1-300)", "10"),
            ("EXIT_POLICY", "any-success or all-success", "any-success"),
            ("ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<20} {}\n", var, description));
            help.push_str(&format!("  {:<20} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n\n");
        help.push_str("Defaults:\n");
        help.push_str(&display_config_summary(&Config::default()));
        help.push('\n');

        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(name, _, _)| {
                let value = std::env::var(name).ok()?;
                Self::validate_env_var(name, &value)
                    .err()
                    .map(|e| format!("Warning: {}", e))
            })
            .collect()
    }

    /// Check the given .env file; `None` when it does not exist
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read .env file: {}", e)))?;

        let mut warnings = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match line.split_once('=') {
                Some((key, value)) => {
                    if let Err(e) = Self::validate_env_var(key.trim(), value) {
                        warnings.push(format!("Line '{}': {}", line, e));
                    }
                }
                None => warnings.push(format!("Line '{}': expected KEY=VALUE", line)),
            }
        }

        Ok(Some(warnings))
    }

    /// Variable reference followed by problems found in the environment and `env_file`
    pub fn env_report(env_file: &Path) -> Result<String> {
        let mut report = Self::display_env_help();

        let current = Self::validate_current_env();
        if !current.is_empty() {
            report.push_str("\nEnvironment:\n");
            for warning in &current {
                report.push_str(&format!("  {}\n", warning));
            }
        }

        match Self::check_env_file(env_file)? {
            None => report.push_str(&format!("\nNo {} file found\n", env_file.display())),
            Some(warnings) if warnings.is_empty() => {
                report.push_str(&format!("\n{} file is valid\n", env_file.display()));
            }
            Some(warnings) => {
                report.push_str(&format!("\n{} file:\n", env_file.display()));
                for warning in &warnings {
                    report.push_str(&format!("  {}\n", warning));
                }
            }
        }

        Ok(report)
    }
}

fn check_range(key: &str, value: &str, min: u64, max: u64) -> Result<()> {
    let parsed: u64 = value
        .parse()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
    if parsed < min || parsed > max {
        return Err(AppError::config(format!(
            "{} must be between {} and {}, got: {}",
            key, min, max, parsed
        )));
    }
    Ok(())
}
