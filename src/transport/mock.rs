//! Scripted transport for engine tests

use super::{SpeedTransport, TransferConnection};
use crate::{
    error::{AppError, Result},
    models::Server,
    types::Direction,
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

/// How a scripted server behaves
#[derive(Debug, Clone)]
pub struct ServerScript {
    /// Round-trip time; `None` makes every probe fail
    pub rtt: Option<Duration>,
    /// Number of connect attempts that fail before one succeeds
    pub failing_connects: u32,
    pub chunk_bytes: u64,
    pub chunk_delay: Duration,
    /// Chunks each download connection delivers before hanging forever
    pub download_stall_after: Option<u64>,
    /// Chunks each upload connection delivers before hanging forever
    pub upload_stall_after: Option<u64>,
    /// Chunks each connection delivers before returning an error
    pub error_after: Option<u64>,
    /// Upload connections deliver zero-byte chunks
    pub upload_zero: bool,
    /// `(n, chunks)`: only the n-th established connection hangs after `chunks`
    pub hang_connection: Option<(u32, u64)>,
}

impl ServerScript {
    pub fn reachable(rtt_ms: u64) -> Self {
        Self {
            rtt: Some(Duration::from_millis(rtt_ms)),
            failing_connects: 0,
            chunk_bytes: 16 * 1024,
            chunk_delay: Duration::from_millis(10),
            download_stall_after: None,
            upload_stall_after: None,
            error_after: None,
            upload_zero: false,
            hang_connection: None,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            rtt: None,
            failing_connects: u32::MAX,
            ..Self::reachable(0)
        }
    }
}

/// Transport whose servers follow per-id scripts; unknown ids are unreachable
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: HashMap<String, ServerScript>,
    connect_attempts: HashMap<String, Arc<AtomicU32>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, id: &str, script: ServerScript) -> Self {
        self.scripts.insert(id.to_string(), script);
        self.connect_attempts.insert(id.to_string(), Arc::new(AtomicU32::new(0)));
        self
    }

    pub fn connect_attempts(&self, id: &str) -> u32 {
        self.connect_attempts
            .get(id)
            .map(|a| a.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn script(&self, server: &Server) -> Result<&ServerScript> {
        self.scripts
            .get(&server.id)
            .ok_or_else(|| AppError::network(format!("no route to {}", server.id)))
    }
}

#[async_trait]
impl SpeedTransport for ScriptedTransport {
    async fn round_trip(&self, server: &Server) -> Result<Duration> {
        let script = self.script(server)?;
        match script.rtt {
            Some(rtt) => {
                tokio::time::sleep(rtt).await;
                Ok(rtt)
            }
            None => Err(AppError::timeout(format!("{} did not answer", server.id))),
        }
    }

    async fn connect(&self, server: &Server, direction: Direction) -> Result<Box<dyn TransferConnection>> {
        let script = self.script(server)?;
        let attempt = self
            .connect_attempts
            .get(&server.id)
            .map(|a| a.fetch_add(1, Ordering::SeqCst))
            .unwrap_or(0);

        if attempt < script.failing_connects {
            return Err(AppError::network(format!("connection refused by {}", server.id)));
        }

        let established = attempt - script.failing_connects;
        let stall_after = match (direction, script.hang_connection) {
            (_, Some((n, chunks))) if n == established => Some(chunks),
            (Direction::Download, _) => script.download_stall_after,
            (Direction::Upload, _) => script.upload_stall_after,
        };
        let chunk_bytes = if direction == Direction::Upload && script.upload_zero {
            0
        } else {
            script.chunk_bytes
        };

        Ok(Box::new(ScriptedConnection {
            chunk_bytes,
            chunk_delay: script.chunk_delay,
            stall_after,
            error_after: script.error_after,
            delivered: 0,
        }))
    }
}

struct ScriptedConnection {
    chunk_bytes: u64,
    chunk_delay: Duration,
    stall_after: Option<u64>,
    error_after: Option<u64>,
    delivered: u64,
}

#[async_trait]
impl TransferConnection for ScriptedConnection {
    async fn next_chunk(&mut self) -> Result<u64> {
        if self.error_after.is_some_and(|n| self.delivered >= n) {
            return Err(AppError::network("connection reset"));
        }
        if self.stall_after.is_some_and(|n| self.delivered >= n) {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.chunk_delay).await;
        self.delivered += 1;
        Ok(self.chunk_bytes)
    }
}

/// Answers round trips from a fixed list after failing the first few; never connects
pub struct FlakyTransport {
    rtts: Vec<Duration>,
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyTransport {
    pub fn new(rtts: &[Duration], failures: usize) -> Self {
        Self {
            rtts: rtts.to_vec(),
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SpeedTransport for FlakyTransport {
    async fn round_trip(&self, server: &Server) -> Result<Duration> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures || self.rtts.is_empty() {
            return Err(AppError::network(format!("{} dropped the request", server.id)));
        }
        let rtt = self.rtts[(call - self.failures) % self.rtts.len()];
        tokio::time::sleep(rtt).await;
        Ok(rtt)
    }

    async fn connect(&self, server: &Server, _direction: Direction) -> Result<Box<dyn TransferConnection>> {
        Err(AppError::network(format!("connection refused by {}", server.id)))
    }
}
