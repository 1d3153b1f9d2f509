//! Configuration parsing from CLI arguments and environment variables

use crate::{cli::Cli, config::env::EnvManager, error::Result, models::Config};

/// Configuration parser that layers defaults, `.env`, environment and CLI flags
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        self.load_env_file()?;

        config.merge_from_env()?;

        self.apply_cli_overrides(&mut config);

        config.validate()?;

        Ok(config)
    }

    /// Load .env file if it exists
    fn load_env_file(&self) -> Result<()> {
        EnvManager::load_env_file(self.cli.debug)
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        if !cli.servers.is_empty() {
            config.server_ids = cli.servers.iter().map(|s| s.trim().to_string()).collect();
        }
        if let Some(max) = cli.max_servers {
            config.max_servers = max;
        }
        if let Some(count) = cli.count {
            config.ping_count = count;
        }
        if let Some(connections) = cli.connections {
            config.connections = connections as usize;
        }
        if let Some(duration) = cli.duration {
            config.measure_seconds = duration;
        }
        if let Some(timeout) = cli.timeout {
            config.timeout_seconds = timeout;
        }
        if let Some(policy) = cli.exit_policy {
            config.exit_policy = policy;
        }

        if cli.saving_mode {
            config.saving_mode = true;
        }
        if cli.no_color || cli.json {
            config.enable_color = false;
        }

        // CLI-only switches
        config.json_output = cli.json;
        config.list_only = cli.list;
        config.verbose = cli.verbose;
        config.debug = cli.debug;
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Config URL: {}", config.config_url));
    summary.push(format!("Servers URL: {}", config.servers_url));
    if !config.server_ids.is_empty() {
        summary.push(format!("Server IDs: {}", config.server_ids.join(", ")));
    }
    summary.push(format!("Max Servers: {}", config.max_servers));
    summary.push(format!("Mode: {:?}", config.mode()));
    summary.push(format!(
        "Connections: {} (saving mode: {})",
        config.connections, config.saving_connections
    ));
    summary.push(format!(
        "Window: {}ms warm-up + {}s, tick {}ms",
        config.warmup_ms, config.measure_seconds, config.tick_ms
    ));
    summary.push(format!("Ping Count: {}", config.ping_count));
    summary.push(format!("Timeout: {}s", config.timeout_seconds));
    summary.push(format!("Exit Policy: {}", config.exit_policy));
    summary.push(format!("Color Output: {}", config.enable_color));

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::tests::ENV_LOCK;
    use crate::types::ExitPolicy;
    use clap::Parser;
    use std::env;

    fn clear_env() {
        for (key, _, _) in EnvManager::get_supported_env_vars() {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_cli_overrides_env() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("PING_COUNT", "9");
        env::set_var("CONNECTIONS", "6");

        let cli = Cli::parse_from(["dso", "--count", "3", "--saving-mode", "--json"]);
        let mut config = Config::default();
        config.merge_from_env().unwrap();
        ConfigParser::new(cli).apply_cli_overrides(&mut config);
        clear_env();

        assert_eq!(config.ping_count, 3);
        assert_eq!(config.connections, 6);
        assert!(config.saving_mode);
        assert!(config.json_output);
        assert!(!config.enable_color);
    }

    #[test]
    fn test_server_flags_replace_env_ids() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("SERVER_IDS", "1,2,3");

        let cli = Cli::parse_from(["dso", "--server", "42", "--exit-policy", "all"]);
        let mut config = Config::default();
        config.merge_from_env().unwrap();
        assert_eq!(config.server_ids, vec!["1", "2", "3"]);

        ConfigParser::new(cli).apply_cli_overrides(&mut config);
        clear_env();

        assert_eq!(config.server_ids, vec!["42"]);
        assert_eq!(config.exit_policy, ExitPolicy::AllSuccess);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_env_value_is_config_error() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("MEASURE_SECONDS", "lots");

        let mut config = Config::default();
        let result = config.merge_from_env();
        clear_env();

        assert!(matches!(result, Err(crate::error::AppError::Config(_))));
    }

    #[test]
    fn test_display_config_summary() {
        let summary = display_config_summary(&Config::default());
        assert!(summary.contains("Servers URL: https://www.speedtest.net/api/js/servers"));
        assert!(summary.contains("Exit Policy: any-success"));
    }
}
