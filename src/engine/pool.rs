//! Concurrent connections to one server for one benchmark phase
//!
//! Every connection runs in its own task and is the only writer of its byte
//! counter. A coordinator samples the counters on a fixed tick, watches for
//! stalls and the phase deadline, and stops the connection tasks through a
//! `watch` channel. Bytes counted before the stop land in the final sample.

use crate::{
    error::{AppError, Result},
    logging::Logger,
    models::{Config, Server},
    transport::{SpeedTransport, TransferConnection},
    types::{Direction, MeasurementMode},
};
use futures::future::join_all;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::watch,
    time::{interval, sleep, timeout, Instant, MissedTickBehavior},
};

/// Cumulative bytes moved by the pool at a point in the phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputSample {
    pub elapsed: Duration,
    pub bytes: u64,
}

impl ThroughputSample {
    pub fn new(elapsed: Duration, bytes: u64) -> Self {
        Self { elapsed, bytes }
    }
}

/// Connection establishment settings
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub connections: usize,
    /// Extra attempts after the first failed connect
    pub connect_retries: u32,
    /// Delay before the first retry; doubles for each further retry
    pub connect_backoff: Duration,
    pub connect_timeout: Duration,
}

impl PoolConfig {
    pub fn from_config(config: &Config, mode: MeasurementMode) -> Self {
        Self {
            connections: config.connections_for(mode),
            connect_retries: config.connect_retries,
            connect_backoff: Duration::from_millis(config.connect_backoff_ms),
            connect_timeout: config.timeout(),
        }
    }
}

/// Limits for one transfer phase
#[derive(Debug, Clone, Copy)]
pub struct TransferBudget {
    /// Total phase length including warm-up
    pub duration: Duration,
    /// Stop early once this many bytes moved
    pub byte_cap: Option<u64>,
    pub tick: Duration,
    pub stall_timeout: Duration,
}

/// Connections to a single server, established afresh for each phase
pub struct ConnectionPool {
    transport: Arc<dyn SpeedTransport>,
    server: Server,
    config: PoolConfig,
    logger: Logger,
}

impl ConnectionPool {
    pub fn open(transport: Arc<dyn SpeedTransport>, server: &Server, config: PoolConfig, logger: Logger) -> Self {
        Self {
            transport,
            server: server.clone(),
            config,
            logger,
        }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn connection_count(&self) -> usize {
        self.config.connections.max(1)
    }

    /// Stream in `direction` until the budget runs out and return the sampled byte series
    pub async fn transfer(&self, direction: Direction, budget: TransferBudget) -> Result<Vec<ThroughputSample>> {
        let connections = self.establish(direction).await?;

        self.logger
            .debug("Transfer started")
            .server(&self.server)
            .field("direction", direction.label())
            .field("connections", connections.len())
            .log()
            .await;

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut counters = Vec::with_capacity(connections.len());
        let mut alive_flags = Vec::with_capacity(connections.len());
        let mut handles = Vec::with_capacity(connections.len());

        for connection in connections {
            let counter = Arc::new(AtomicU64::new(0));
            let alive = Arc::new(AtomicBool::new(true));
            counters.push(counter.clone());
            alive_flags.push(alive.clone());
            handles.push(tokio::spawn(run_connection(connection, counter, alive, stop_rx.clone())));
        }
        drop(stop_rx);

        let total = || counters.iter().map(|c| c.load(Ordering::Relaxed)).sum::<u64>();
        let any_alive = || alive_flags.iter().any(|a| a.load(Ordering::Relaxed));

        let start = Instant::now();
        let mut ticker = interval(budget.tick.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut samples: Vec<ThroughputSample> = Vec::new();
        let mut last_bytes = 0u64;
        let mut last_progress = start;

        let outcome = loop {
            ticker.tick().await;
            let now = Instant::now();
            let elapsed = now.duration_since(start);
            let bytes = total();
            push_sample(&mut samples, elapsed, bytes);

            if bytes > last_bytes {
                last_bytes = bytes;
                last_progress = now;
            }

            if budget.byte_cap.is_some_and(|cap| bytes >= cap) {
                break Ok(());
            }
            if elapsed >= budget.duration {
                break Ok(());
            }
            if !any_alive() {
                break Err(AppError::transfer_stalled(
                    &self.server.id,
                    format!("all {} connections failed", direction.label()),
                ));
            }
            if now.duration_since(last_progress) >= budget.stall_timeout {
                break Err(AppError::transfer_stalled(
                    &self.server.id,
                    format!("no {} progress for {}ms", direction.label(), budget.stall_timeout.as_millis()),
                ));
            }
        };

        // Receivers may already be gone if every connection failed
        let _ = stop_tx.send(true);
        for result in join_all(handles).await {
            match result {
                Ok(Some(error)) => {
                    self.logger
                        .debug("Connection ended with error")
                        .server(&self.server)
                        .error_info(&error)
                        .field("error", error.to_string())
                        .log()
                        .await;
                }
                Ok(None) => {}
                Err(join_error) => {
                    let error = AppError::from(join_error);
                    self.logger.warn(&error.to_string()).server(&self.server).log().await;
                }
            }
        }

        push_sample(&mut samples, start.elapsed(), total());

        match outcome {
            Ok(()) => {
                self.logger
                    .debug("Transfer finished")
                    .server(&self.server)
                    .field("direction", direction.label())
                    .field("bytes", total())
                    .field("samples", samples.len())
                    .log()
                    .await;
                Ok(samples)
            }
            Err(error) => {
                self.logger
                    .warn("Transfer stalled")
                    .server(&self.server)
                    .error_info(&error)
                    .field("bytes", total())
                    .log()
                    .await;
                Err(error)
            }
        }
    }

    async fn establish(&self, direction: Direction) -> Result<Vec<Box<dyn TransferConnection>>> {
        let attempts = join_all((0..self.connection_count()).map(|_| self.connect_with_retry(direction))).await;

        let mut connections = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            match attempt {
                Ok(connection) => connections.push(connection),
                Err(error) => {
                    self.logger
                        .warn("Connection could not be established")
                        .server(&self.server)
                        .error_info(&error)
                        .field("error", error.to_string())
                        .log()
                        .await;
                }
            }
        }

        if connections.is_empty() {
            return Err(AppError::transfer_stalled(
                &self.server.id,
                format!("no {} connection could be established", direction.label()),
            ));
        }
        Ok(connections)
    }

    async fn connect_with_retry(&self, direction: Direction) -> Result<Box<dyn TransferConnection>> {
        let mut delay = self.config.connect_backoff;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = match timeout(self.config.connect_timeout, self.transport.connect(&self.server, direction)).await {
                Ok(result) => result,
                Err(_) => Err(AppError::timeout(format!(
                    "connect exceeded {}ms",
                    self.config.connect_timeout.as_millis()
                ))),
            };

            match result {
                Ok(connection) => return Ok(connection),
                Err(error) if attempt <= self.config.connect_retries => {
                    self.logger
                        .debug("Retrying connection")
                        .server(&self.server)
                        .field("attempt", attempt)
                        .field("delay_ms", delay.as_millis() as u64)
                        .field("error", error.to_string())
                        .log()
                        .await;
                    sleep(delay).await;
                    delay = delay.mul_f64(2.0);
                }
                Err(error) => {
                    return Err(AppError::connection_failed(&self.server.id, attempt, error.to_string()));
                }
            }
        }
    }
}

/// Drive one connection until stopped or broken; returns the error that ended it
async fn run_connection(
    mut connection: Box<dyn TransferConnection>,
    counter: Arc<AtomicU64>,
    alive: Arc<AtomicBool>,
    mut stop: watch::Receiver<bool>,
) -> Option<AppError> {
    let ended = loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break None,
            chunk = connection.next_chunk() => match chunk {
                Ok(bytes) => {
                    counter.fetch_add(bytes, Ordering::Relaxed);
                }
                Err(error) => break Some(error),
            },
        }
    };
    alive.store(false, Ordering::Relaxed);
    ended
}

/// Append keeping elapsed strictly increasing and bytes non-decreasing
fn push_sample(samples: &mut Vec<ThroughputSample>, elapsed: Duration, bytes: u64) {
    match samples.last_mut() {
        Some(last) if elapsed <= last.elapsed => {
            last.bytes = last.bytes.max(bytes);
        }
        Some(last) => {
            let bytes = bytes.max(last.bytes);
            samples.push(ThroughputSample::new(elapsed, bytes));
        }
        None => samples.push(ThroughputSample::new(elapsed, bytes)),
    }
}
