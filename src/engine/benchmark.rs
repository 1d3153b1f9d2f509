//! Steady-state throughput estimation over a connection pool phase

use super::pool::{ConnectionPool, ThroughputSample, TransferBudget};
use crate::{
    error::Result,
    logging::Logger,
    models::{Config, Server},
    types::{Direction, MeasurementMode},
};
use serde::Serialize;
use std::time::Duration;

/// Warm-up, window and sampling settings for one phase
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    /// Ramp-up excluded from the estimate
    pub warmup: Duration,
    /// Measured window after warm-up
    pub measure: Duration,
    pub tick: Duration,
    pub stall_timeout: Duration,
    pub byte_cap: Option<u64>,
}

impl WindowConfig {
    pub fn from_config(config: &Config, mode: MeasurementMode) -> Self {
        Self {
            warmup: Duration::from_millis(config.warmup_ms),
            measure: Duration::from_secs(config.measure_seconds),
            tick: Duration::from_millis(config.tick_ms),
            stall_timeout: Duration::from_millis(config.stall_timeout_ms),
            byte_cap: config.byte_cap_for(mode),
        }
    }

    pub fn budget(&self) -> TransferBudget {
        TransferBudget {
            duration: self.warmup + self.measure,
            byte_cap: self.byte_cap,
            tick: self.tick,
            stall_timeout: self.stall_timeout,
        }
    }
}

/// Result of one benchmark phase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThroughputMeasurement {
    pub direction: Direction,
    pub mbps: f64,
    pub total_bytes: u64,
    pub elapsed: Duration,
    pub sample_count: usize,
}

/// Runs pool phases and turns their byte series into Mbit/s
pub struct ThroughputBenchmarker {
    window: WindowConfig,
    logger: Logger,
}

impl ThroughputBenchmarker {
    pub fn new(window: WindowConfig, logger: Logger) -> Self {
        Self { window, logger }
    }

    pub fn window(&self) -> &WindowConfig {
        &self.window
    }

    pub async fn measure(&self, pool: &ConnectionPool, direction: Direction) -> Result<ThroughputMeasurement> {
        let samples = pool.transfer(direction, self.window.budget()).await?;
        let mbps = steady_state_mbps(&samples, self.window.warmup);
        let last = samples.last().copied().unwrap_or(ThroughputSample::new(Duration::ZERO, 0));

        let measurement = ThroughputMeasurement {
            direction,
            mbps,
            total_bytes: last.bytes,
            elapsed: last.elapsed,
            sample_count: samples.len(),
        };

        self.logger
            .info("Throughput measured")
            .server(pool.server())
            .field("direction", direction.label())
            .field("mbps", mbps)
            .field("bytes", measurement.total_bytes)
            .field("samples", measurement.sample_count)
            .log()
            .await;

        Ok(measurement)
    }

    /// Measure and record the speed on `server`
    pub async fn measure_into(
        &self,
        pool: &ConnectionPool,
        server: &mut Server,
        direction: Direction,
    ) -> Result<ThroughputMeasurement> {
        let measurement = self.measure(pool, direction).await?;
        match direction {
            Direction::Download => server.download_mbps = Some(measurement.mbps),
            Direction::Upload => server.upload_mbps = Some(measurement.mbps),
        }
        Ok(measurement)
    }
}

/// Mbit/s between the first sample at or after `warmup` and the last sample.
///
/// Falls back to the whole series from an implicit `(0, 0)` origin when the
/// steady part holds fewer than two samples, which happens when a byte cap
/// ends the phase during warm-up.
pub fn steady_state_mbps(samples: &[ThroughputSample], warmup: Duration) -> f64 {
    let Some(end) = samples.last() else {
        return 0.0;
    };

    let start = samples
        .iter()
        .position(|s| s.elapsed >= warmup)
        .filter(|&idx| samples.len() - idx >= 2)
        .map(|idx| samples[idx])
        .unwrap_or(ThroughputSample::new(Duration::ZERO, 0));

    let secs = end.elapsed.saturating_sub(start.elapsed).as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }

    let bytes = end.bytes.saturating_sub(start.bytes);
    bytes as f64 * 8.0 / secs / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pool::PoolConfig;
    use crate::transport::mock::{ScriptedTransport, ServerScript};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn series(increments: &[u64]) -> Vec<ThroughputSample> {
        let mut bytes = 0;
        increments
            .iter()
            .enumerate()
            .map(|(i, inc)| {
                bytes += inc;
                ThroughputSample::new(ms(100 * (i as u64 + 1)), bytes)
            })
            .collect()
    }

    #[test]
    fn test_steady_state_skips_warmup() {
        // 1 MB during warm-up, then 125_000 bytes per 100ms = 10 Mbit/s
        let samples = vec![
            ThroughputSample::new(ms(500), 1_000_000),
            ThroughputSample::new(ms(1000), 1_000_000),
            ThroughputSample::new(ms(1100), 1_125_000),
            ThroughputSample::new(ms(2000), 2_250_000),
        ];
        let mbps = steady_state_mbps(&samples, ms(1000));
        assert!((mbps - 10.0).abs() < 1e-9, "got {}", mbps);
    }

    #[test]
    fn test_short_series_uses_origin() {
        let samples = vec![
            ThroughputSample::new(ms(200), 100_000),
            ThroughputSample::new(ms(400), 500_000),
        ];
        let mbps = steady_state_mbps(&samples, ms(1000));
        assert!((mbps - 10.0).abs() < 1e-9, "got {}", mbps);
    }

    #[test]
    fn test_empty_series_is_zero() {
        assert_eq!(steady_state_mbps(&[], ms(1000)), 0.0);
        assert_eq!(steady_state_mbps(&[ThroughputSample::new(Duration::ZERO, 0)], ms(0)), 0.0);
    }

    proptest! {
        #[test]
        fn prop_throughput_non_negative(
            increments in prop::collection::vec(0u64..5_000_000, 1..60),
            warmup_ms in 0u64..3000,
        ) {
            let mbps = steady_state_mbps(&series(&increments), ms(warmup_ms));
            prop_assert!(mbps.is_finite());
            prop_assert!(mbps >= 0.0);
        }

        #[test]
        fn prop_more_final_bytes_never_lowers_throughput(
            increments in prop::collection::vec(0u64..5_000_000, 2..60),
            extra in 0u64..10_000_000,
            warmup_ms in 0u64..3000,
        ) {
            let base = series(&increments);
            let mut boosted = base.clone();
            if let Some(last) = boosted.last_mut() {
                last.bytes += extra;
            }
            let warmup = ms(warmup_ms);
            prop_assert!(steady_state_mbps(&boosted, warmup) >= steady_state_mbps(&base, warmup));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_into_records_speed() {
        let transport = Arc::new(ScriptedTransport::new().with_server("1", ServerScript::reachable(5)));
        let mut server = Server::new("1", "Mock", "http://mock/upload.php");
        let pool = ConnectionPool::open(
            transport,
            &server,
            PoolConfig {
                connections: 2,
                connect_retries: 0,
                connect_backoff: ms(100),
                connect_timeout: Duration::from_secs(1),
            },
            Logger::silent("POOL"),
        );
        let benchmarker = ThroughputBenchmarker::new(
            WindowConfig {
                warmup: ms(500),
                measure: Duration::from_secs(2),
                tick: ms(100),
                stall_timeout: Duration::from_secs(1),
                byte_cap: None,
            },
            Logger::silent("BENCH"),
        );

        let measurement = benchmarker
            .measure_into(&pool, &mut server, Direction::Upload)
            .await
            .unwrap();

        // Two connections of 16 KiB every 10ms is about 26 Mbit/s
        assert!(measurement.mbps > 20.0 && measurement.mbps < 30.0, "got {}", measurement.mbps);
        assert_eq!(server.upload_mbps, Some(measurement.mbps));
        assert!(server.download_mbps.is_none());
    }
}
