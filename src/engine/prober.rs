//! Round-trip latency sampling

use crate::{
    error::{AppError, Result},
    logging::Logger,
    models::Server,
    stats::LatencyStatistics,
    transport::SpeedTransport,
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;

/// Latency of one server derived from its successful samples
#[derive(Debug, Clone, Serialize)]
pub struct LatencyReport {
    pub server_id: String,
    /// Minimum round trip
    pub latency: Duration,
    pub median: Duration,
    /// Mean absolute difference of consecutive samples
    pub jitter: Duration,
    pub samples: Vec<Duration>,
    pub failures: u32,
    pub statistics: LatencyStatistics,
}

pub struct LatencyProber {
    transport: Arc<dyn SpeedTransport>,
    request_timeout: Duration,
    logger: Logger,
}

impl LatencyProber {
    pub fn new(transport: Arc<dyn SpeedTransport>, request_timeout: Duration, logger: Logger) -> Self {
        Self {
            transport,
            request_timeout,
            logger,
        }
    }

    /// Send `sample_count` sequential round trips; fails only when all of them fail
    pub async fn probe(&self, server: &Server, sample_count: u32) -> Result<LatencyReport> {
        let mut samples = Vec::with_capacity(sample_count as usize);
        let mut failures = 0u32;
        let mut last_error = None;

        for _ in 0..sample_count.max(1) {
            match timeout(self.request_timeout, self.transport.round_trip(server)).await {
                Ok(Ok(rtt)) => samples.push(rtt),
                Ok(Err(error)) => {
                    failures += 1;
                    last_error = Some(error.to_string());
                }
                Err(_) => {
                    failures += 1;
                    last_error = Some(format!("no answer within {}ms", self.request_timeout.as_millis()));
                }
            }
        }

        let Some(statistics) = LatencyStatistics::from_samples(&samples) else {
            let error = AppError::probe_unreachable(
                &server.id,
                last_error.unwrap_or_else(|| "no samples".to_string()),
            );
            self.logger
                .warn("Server unreachable")
                .server(server)
                .error_info(&error)
                .field("failures", failures)
                .log()
                .await;
            return Err(error);
        };

        let latency = samples.iter().min().copied().unwrap_or_default();
        let report = LatencyReport {
            server_id: server.id.clone(),
            latency,
            median: ms_to_duration(statistics.median_ms),
            jitter: ms_to_duration(statistics.jitter_ms),
            samples,
            failures,
            statistics,
        };

        self.logger
            .debug("Latency probed")
            .server(server)
            .field("latency_ms", report.statistics.min_ms)
            .field("median_ms", report.statistics.median_ms)
            .field("jitter_ms", report.statistics.jitter_ms)
            .field("failures", failures)
            .log()
            .await;

        Ok(report)
    }

    /// Probe and record latency and jitter on `server`
    pub async fn probe_into(&self, server: &mut Server, sample_count: u32) -> Result<LatencyReport> {
        let report = self.probe(server, sample_count).await?;
        server.latency = Some(report.latency);
        server.jitter = Some(report.jitter);
        Ok(report)
    }
}

fn ms_to_duration(ms: f64) -> Duration {
    Duration::from_secs_f64((ms / 1000.0).max(0.0))
}
