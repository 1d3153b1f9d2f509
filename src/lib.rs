//! DSL Speed Observer
//!
//! Measures latency, download and upload throughput against speedtest.net
//! servers. Candidate servers are discovered over HTTP, ranked by probed
//! latency, and benchmarked with parallel connections whose byte counters are
//! sampled by a single coordinator.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod output;
pub mod stats;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use engine::{SessionOrchestrator, ServerSelector, LatencyProber, ThroughputBenchmarker, ResultValidator};
pub use error::{AppError, Result};
pub use discovery::{HttpDiscovery, ServerDiscovery};
pub use models::{CandidateList, Config, RunReport, Server, UserInfo};
pub use transport::{HttpTransport, SpeedTransport, TransferConnection};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
pub const BUILD_TIME: &str = env!("BUILD_TIME");
pub const GIT_COMMIT: &str = env!("GIT_COMMIT");
pub const TARGET_TRIPLE: &str = env!("TARGET_TRIPLE");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_CONFIG_URL: &str = "https://www.speedtest.net/speedtest-config.php";
    pub const DEFAULT_SERVERS_URL: &str = "https://www.speedtest.net/api/js/servers?engine=js&limit=10";
    pub const DEFAULT_PROBE_SUBSET: usize = 10;
    pub const DEFAULT_PING_COUNT: u32 = 5;
    pub const DEFAULT_SELECTION_PING_COUNT: u32 = 3;
    pub const DEFAULT_CONNECTIONS: usize = 4;
    pub const DEFAULT_SAVING_CONNECTIONS: usize = 1;
    pub const DEFAULT_CHUNK_BYTES: usize = 256 * 1024;
    /// Edge lengths of the `random{N}x{N}.jpg` images speedtest servers host
    pub const DOWNLOAD_SIZES: &[u32] = &[350, 500, 750, 1000, 1500, 2000, 2500, 3000, 3500, 4000];
    pub const DEFAULT_DOWNLOAD_SIZE: u32 = 2000;
    pub const DEFAULT_WARMUP: Duration = Duration::from_millis(1000);
    pub const DEFAULT_MEASURE_WINDOW: Duration = Duration::from_secs(8);
    pub const DEFAULT_SAMPLE_TICK: Duration = Duration::from_millis(100);
    pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(3);
    pub const DEFAULT_SAVING_BYTE_CAP: u64 = 25_000_000;
    pub const DEFAULT_CONNECT_RETRIES: u32 = 1;
    pub const DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_millis(200);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_MAX_PLAUSIBLE_MBPS: f64 = 10_000.0;
    pub const DEFAULT_MAX_ASYMMETRY_RATIO: f64 = 100.0;
    pub const DEFAULT_ENABLE_COLOR: bool = true;
    pub const USER_AGENT: &str = concat!("dsl-speed-observer/", env!("CARGO_PKG_VERSION"));
}
