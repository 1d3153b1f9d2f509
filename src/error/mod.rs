//! Error handling for the speed observer
//!
//! Errors are split by blast radius: discovery and selection failures end the
//! whole run, probe and transfer failures end a single server session. The
//! orchestrator decides which is which through [`AppError::is_session_scoped`].

use thiserror::Error;

/// Custom error types for the speed observer
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Server list or client config could not be fetched
    #[error("Discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// Candidate selection produced nothing usable
    #[error("Server selection failed: {0}")]
    Selection(String),

    /// Every latency sample to a server failed
    #[error("Server {server_id} unreachable: {message}")]
    ProbeUnreachable { server_id: String, message: String },

    /// A single connection could not be established after its retries
    #[error("Connection to {server_id} failed after {attempts} attempt(s): {message}")]
    ConnectionEstablishFailed {
        server_id: String,
        attempts: u32,
        message: String,
    },

    /// No bytes moved on any connection for longer than the stall timeout,
    /// or the pool ran out of live connections
    #[error("Transfer stalled on {server_id}: {message}")]
    TransferStalled { server_id: String, message: String },

    /// The exit policy rejected a run with failed server sessions
    #[error("{failed} of {total} server session(s) failed")]
    SessionsFailed { failed: usize, total: usize },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network connectivity errors
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Parsing errors (URLs, JSON, XML attributes)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn discovery<S: Into<String>>(message: S) -> Self {
        Self::DiscoveryUnavailable(message.into())
    }

    pub fn selection<S: Into<String>>(message: S) -> Self {
        Self::Selection(message.into())
    }

    pub fn probe_unreachable<I: Into<String>, S: Into<String>>(server_id: I, message: S) -> Self {
        Self::ProbeUnreachable {
            server_id: server_id.into(),
            message: message.into(),
        }
    }

    pub fn connection_failed<I: Into<String>, S: Into<String>>(
        server_id: I,
        attempts: u32,
        message: S,
    ) -> Self {
        Self::ConnectionEstablishFailed {
            server_id: server_id.into(),
            attempts,
            message: message.into(),
        }
    }

    pub fn transfer_stalled<I: Into<String>, S: Into<String>>(server_id: I, message: S) -> Self {
        Self::TransferStalled {
            server_id: server_id.into(),
            message: message.into(),
        }
    }

    pub fn sessions_failed(failed: usize, total: usize) -> Self {
        Self::SessionsFailed { failed, total }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network(message.into())
    }

    /// Create a new HTTP request error
    pub fn http_request<S: Into<String>>(message: S) -> Self {
        Self::HttpRequest(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::DiscoveryUnavailable(_) => "DISCOVERY",
            Self::Selection(_) => "SELECT",
            Self::ProbeUnreachable { .. } => "PROBE",
            Self::ConnectionEstablishFailed { .. } => "CONNECT",
            Self::TransferStalled { .. } => "STALL",
            Self::SessionsFailed { .. } => "SESSION",
            Self::Config(_) => "CONFIG",
            Self::Network(_) => "NETWORK",
            Self::HttpRequest(_) => "HTTP",
            Self::Timeout(_) => "TIMEOUT",
            Self::Parse(_) => "PARSE",
            Self::Io(_) => "IO",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Check if error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::HttpRequest(_)
                | Self::Timeout(_)
                | Self::ConnectionEstablishFailed { .. }
        )
    }

    /// Failures that end one server session but leave the run going
    pub fn is_session_scoped(&self) -> bool {
        matches!(
            self,
            Self::ProbeUnreachable { .. }
                | Self::ConnectionEstablishFailed { .. }
                | Self::TransferStalled { .. }
                | Self::Network(_)
                | Self::HttpRequest(_)
                | Self::Timeout(_)
        )
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Parse(_) => 1,
            Self::DiscoveryUnavailable(_) | Self::Network(_) | Self::HttpRequest(_) => 2,
            Self::Timeout(_) => 3,
            Self::Selection(_) | Self::ProbeUnreachable { .. } => 4,
            Self::Io(_) => 5,
            Self::ConnectionEstablishFailed { .. } | Self::TransferStalled { .. } => 6,
            Self::SessionsFailed { .. } => 7,
            Self::Internal(_) => 99,
        }
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::DiscoveryUnavailable(msg) => format!(
                "Could not fetch the speedtest server list: {}\n\nSuggestion: Check your internet connection or override SERVERS_URL.",
                msg
            ),
            Self::Selection(msg) => format!(
                "No usable server: {}\n\nSuggestion: Drop --server filters or raise --max-servers.",
                msg
            ),
            Self::Config(msg) => format!(
                "Configuration problem: {}\n\nSuggestion: Check your .env file or command line arguments.",
                msg
            ),
            Self::Timeout(msg) => format!(
                "Request timed out: {}\n\nSuggestion: Increase the timeout value using --timeout.",
                msg
            ),
            other => other.to_string(),
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::DiscoveryUnavailable(_) | Self::Selection(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
                Self::ProbeUnreachable { .. }
                | Self::ConnectionEstablishFailed { .. }
                | Self::TransferStalled { .. } => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Timeout(_) => format!("[{}] {}", category.blue().bold(), message.blue()),
                _ => format!("[{}] {}", category.cyan().bold(), message.cyan()),
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            Self::network(error.to_string())
        } else {
            Self::http_request(error.to_string())
        }
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::num::ParseFloatError> for AppError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::parse(format!("Float parse error: {}", error))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::internal(format!("Task join error: {}", error))
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;
