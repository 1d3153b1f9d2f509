//! Configuration data model and validation

use crate::defaults;
use crate::types::{AppError, ExitPolicy, MeasurementMode, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Client config endpoint (user IP and location)
    #[serde(default = "default_config_url")]
    pub config_url: String,

    /// Server list endpoint
    #[serde(default = "default_servers_url")]
    pub servers_url: String,

    /// Explicit server ids to test; empty means automatic selection
    #[serde(default)]
    pub server_ids: Vec<String>,

    /// Maximum number of servers to benchmark; 0 selects the single best
    #[serde(default)]
    pub max_servers: usize,

    /// Number of nearest candidates probed during selection
    #[serde(default = "default_probe_subset")]
    pub probe_subset: usize,

    /// Latency samples per session probe
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,

    /// Latency samples per candidate during selection
    #[serde(default = "default_selection_ping_count")]
    pub selection_ping_count: u32,

    /// Concurrent connections per benchmark phase
    #[serde(default = "default_connections")]
    pub connections: usize,

    /// Concurrent connections per phase in saving mode
    #[serde(default = "default_saving_connections")]
    pub saving_connections: usize,

    /// Upload payload size per request
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,

    /// Edge length of the `random{N}x{N}.jpg` download resource
    #[serde(default = "default_download_size")]
    pub download_size: u32,

    /// Discarded ramp-up at the start of each phase
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,

    /// Steady-state measurement window per phase
    #[serde(default = "default_measure_seconds")]
    pub measure_seconds: u64,

    /// Sampling tick of the pool coordinator
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// How long all connections may make no progress before the phase fails
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,

    /// Per-phase byte cap applied in saving mode
    #[serde(default = "default_saving_byte_cap")]
    pub saving_byte_cap: u64,

    /// Extra attempts for a connection that fails to establish
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Initial backoff between connection attempts (doubles per retry)
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    /// Throughput above this is reported as implausible
    #[serde(default = "default_max_plausible_mbps")]
    pub max_plausible_mbps: f64,

    /// Download/upload ratio beyond which a result is flagged
    #[serde(default = "default_max_asymmetry_ratio")]
    pub max_asymmetry_ratio: f64,

    /// Reduced data usage mode
    #[serde(default)]
    pub saving_mode: bool,

    /// Emit a JSON report instead of text
    #[serde(default)]
    pub json_output: bool,

    /// Print the candidate list and exit without measuring
    #[serde(default)]
    pub list_only: bool,

    /// Exit status policy for partially failed runs
    #[serde(default)]
    pub exit_policy: ExitPolicy,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_url: default_config_url(),
            servers_url: default_servers_url(),
            server_ids: Vec::new(),
            max_servers: 0,
            probe_subset: default_probe_subset(),
            ping_count: default_ping_count(),
            selection_ping_count: default_selection_ping_count(),
            connections: default_connections(),
            saving_connections: default_saving_connections(),
            chunk_bytes: default_chunk_bytes(),
            download_size: default_download_size(),
            warmup_ms: default_warmup_ms(),
            measure_seconds: default_measure_seconds(),
            tick_ms: default_tick_ms(),
            stall_timeout_ms: default_stall_timeout_ms(),
            saving_byte_cap: default_saving_byte_cap(),
            connect_retries: default_connect_retries(),
            connect_backoff_ms: default_connect_backoff_ms(),
            timeout_seconds: default_timeout_secs(),
            max_plausible_mbps: default_max_plausible_mbps(),
            max_asymmetry_ratio: default_max_asymmetry_ratio(),
            saving_mode: false,
            json_output: false,
            list_only: false,
            exit_policy: ExitPolicy::default(),
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn mode(&self) -> MeasurementMode {
        MeasurementMode::from_saving_flag(self.saving_mode)
    }

    /// Connections used for one phase in the given mode
    pub fn connections_for(&self, mode: MeasurementMode) -> usize {
        match mode {
            MeasurementMode::Full => self.connections,
            MeasurementMode::Saving => self.saving_connections.min(self.connections).max(1),
        }
    }

    /// Byte cap for one phase in the given mode
    pub fn byte_cap_for(&self, mode: MeasurementMode) -> Option<u64> {
        match mode {
            MeasurementMode::Full => None,
            MeasurementMode::Saving => Some(self.saving_byte_cap),
        }
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("config URL", &self.config_url), ("servers URL", &self.servers_url)] {
            if value.is_empty() {
                return Err(AppError::config(format!("The {} cannot be empty", name)));
            }
            if let Err(e) = url::Url::parse(value) {
                return Err(AppError::config(format!("Invalid {} '{}': {}", name, value, e)));
            }
        }

        if self.server_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(AppError::config("Server id cannot be empty"));
        }

        if self.ping_count == 0 || self.ping_count > 100 {
            return Err(AppError::config("Ping count must be between 1 and 100"));
        }

        if self.selection_ping_count == 0 || self.selection_ping_count > 20 {
            return Err(AppError::config("Selection ping count must be between 1 and 20"));
        }

        if self.probe_subset == 0 {
            return Err(AppError::config("Probe subset must be greater than 0"));
        }

        if self.connections == 0 || self.connections > 64 {
            return Err(AppError::config("Connections must be between 1 and 64"));
        }

        if self.saving_connections == 0 {
            return Err(AppError::config("Saving connections must be greater than 0"));
        }

        if self.chunk_bytes < 1024 || self.chunk_bytes > 64 * 1024 * 1024 {
            return Err(AppError::config("Chunk size must be between 1 KiB and 64 MiB"));
        }

        if !defaults::DOWNLOAD_SIZES.contains(&self.download_size) {
            return Err(AppError::config(format!(
                "Download size must be one of {:?}",
                defaults::DOWNLOAD_SIZES
            )));
        }

        if self.measure_seconds == 0 || self.measure_seconds > 120 {
            return Err(AppError::config("Measurement window must be between 1 and 120 seconds"));
        }

        if self.tick_ms == 0 || self.tick_ms >= self.measure_seconds * 1000 {
            return Err(AppError::config("Sampling tick must be positive and shorter than the window"));
        }

        if self.stall_timeout_ms < self.tick_ms {
            return Err(AppError::config("Stall timeout cannot be shorter than the sampling tick"));
        }

        if self.connect_retries > 5 {
            return Err(AppError::config("Connection retries cannot exceed 5"));
        }

        if self.timeout_seconds == 0 || self.timeout_seconds > 300 {
            return Err(AppError::config("Timeout must be between 1 and 300 seconds"));
        }

        if !(self.max_plausible_mbps.is_finite() && self.max_plausible_mbps > 0.0) {
            return Err(AppError::config("Plausibility bound must be a positive number"));
        }

        if !(self.max_asymmetry_ratio.is_finite() && self.max_asymmetry_ratio > 1.0) {
            return Err(AppError::config("Asymmetry ratio must be greater than 1"));
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CONFIG_URL") {
            self.config_url = url.trim().to_string();
        }

        if let Ok(url) = std::env::var("SERVERS_URL") {
            self.servers_url = url.trim().to_string();
        }

        if let Ok(ids) = std::env::var("SERVER_IDS") {
            self.server_ids = split_list(&ids);
        }

        if let Ok(v) = std::env::var("MAX_SERVERS") {
            self.max_servers = parse_env("MAX_SERVERS", &v)?;
        }

        if let Ok(v) = std::env::var("PROBE_SUBSET") {
            self.probe_subset = parse_env("PROBE_SUBSET", &v)?;
        }

        if let Ok(v) = std::env::var("PING_COUNT") {
            self.ping_count = parse_env("PING_COUNT", &v)?;
        }

        if let Ok(v) = std::env::var("CONNECTIONS") {
            self.connections = parse_env("CONNECTIONS", &v)?;
        }

        if let Ok(v) = std::env::var("SAVING_CONNECTIONS") {
            self.saving_connections = parse_env("SAVING_CONNECTIONS", &v)?;
        }

        if let Ok(v) = std::env::var("MEASURE_SECONDS") {
            self.measure_seconds = parse_env("MEASURE_SECONDS", &v)?;
        }

        if let Ok(v) = std::env::var("WARMUP_MS") {
            self.warmup_ms = parse_env("WARMUP_MS", &v)?;
        }

        if let Ok(v) = std::env::var("TIMEOUT_SECONDS") {
            self.timeout_seconds = parse_env("TIMEOUT_SECONDS", &v)?;
        }

        if let Ok(v) = std::env::var("EXIT_POLICY") {
            self.exit_policy = v
                .parse()
                .map_err(|e| AppError::config(format!("Invalid EXIT_POLICY value '{}': {}", v, e)))?;
        }

        if let Ok(v) = std::env::var("ENABLE_COLOR") {
            self.enable_color = parse_env("ENABLE_COLOR", &v)?;
        }

        Ok(())
    }
}

/// Split a comma-separated list, dropping blanks
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))
}

// Default value functions for serde
fn default_config_url() -> String {
    defaults::DEFAULT_CONFIG_URL.to_string()
}

fn default_servers_url() -> String {
    defaults::DEFAULT_SERVERS_URL.to_string()
}

fn default_probe_subset() -> usize {
    defaults::DEFAULT_PROBE_SUBSET
}

fn default_ping_count() -> u32 {
    defaults::DEFAULT_PING_COUNT
}

fn default_selection_ping_count() -> u32 {
    defaults::DEFAULT_SELECTION_PING_COUNT
}

fn default_connections() -> usize {
    defaults::DEFAULT_CONNECTIONS
}

fn default_saving_connections() -> usize {
    defaults::DEFAULT_SAVING_CONNECTIONS
}

fn default_chunk_bytes() -> usize {
    defaults::DEFAULT_CHUNK_BYTES
}

fn default_download_size() -> u32 {
    defaults::DEFAULT_DOWNLOAD_SIZE
}

fn default_warmup_ms() -> u64 {
    defaults::DEFAULT_WARMUP.as_millis() as u64
}

fn default_measure_seconds() -> u64 {
    defaults::DEFAULT_MEASURE_WINDOW.as_secs()
}

fn default_tick_ms() -> u64 {
    defaults::DEFAULT_SAMPLE_TICK.as_millis() as u64
}

fn default_stall_timeout_ms() -> u64 {
    defaults::DEFAULT_STALL_TIMEOUT.as_millis() as u64
}

fn default_saving_byte_cap() -> u64 {
    defaults::DEFAULT_SAVING_BYTE_CAP
}

fn default_connect_retries() -> u32 {
    defaults::DEFAULT_CONNECT_RETRIES
}

fn default_connect_backoff_ms() -> u64 {
    defaults::DEFAULT_CONNECT_BACKOFF.as_millis() as u64
}

fn default_timeout_secs() -> u64 {
    defaults::DEFAULT_TIMEOUT.as_secs()
}

fn default_max_plausible_mbps() -> f64 {
    defaults::DEFAULT_MAX_PLAUSIBLE_MBPS
}

fn default_max_asymmetry_ratio() -> f64 {
    defaults::DEFAULT_MAX_ASYMMETRY_RATIO
}

fn default_enable_color() -> bool {
    defaults::DEFAULT_ENABLE_COLOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_servers_url() {
        let mut config = Config::default();
        config.servers_url = "not-a-url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_connections_invalid() {
        let mut config = Config::default();
        config.connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_download_size_invalid() {
        let mut config = Config::default();
        config.download_size = 1234;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stall_timeout_shorter_than_tick_invalid() {
        let mut config = Config::default();
        config.tick_ms = 500;
        config.stall_timeout_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_saving_mode_reduces_connections_and_caps_bytes() {
        let config = Config {
            connections: 8,
            saving_connections: 2,
            ..Default::default()
        };
        assert_eq!(config.connections_for(MeasurementMode::Full), 8);
        assert_eq!(config.connections_for(MeasurementMode::Saving), 2);
        assert_eq!(config.byte_cap_for(MeasurementMode::Full), None);
        assert_eq!(
            config.byte_cap_for(MeasurementMode::Saving),
            Some(defaults::DEFAULT_SAVING_BYTE_CAP)
        );
    }

    #[test]
    fn test_saving_connections_never_exceed_full() {
        let config = Config {
            connections: 2,
            saving_connections: 6,
            ..Default::default()
        };
        assert_eq!(config.connections_for(MeasurementMode::Saving), 2);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" 1, 2,,3 "), vec!["1", "2", "3"]);
        assert!(split_list("").is_empty());
    }
}
