//! Wire access to speed test servers
//!
//! The engine only talks to [`SpeedTransport`] and [`TransferConnection`], so
//! the pool, prober and selector run the same against the HTTP implementation
//! and against scripted transports in tests.

mod http;

#[cfg(test)]
pub(crate) mod mock;

pub use http::HttpTransport;

use crate::{error::Result, models::Server, types::Direction};
use async_trait::async_trait;
use std::time::Duration;

/// Access to latency and bulk transfer endpoints of a server
#[async_trait]
pub trait SpeedTransport: Send + Sync {
    /// Perform one small request/response exchange and return its round-trip time
    async fn round_trip(&self, server: &Server) -> Result<Duration>;

    /// Establish one connection that streams bytes in `direction`
    async fn connect(&self, server: &Server, direction: Direction) -> Result<Box<dyn TransferConnection>>;
}

/// One established stream of fixed-size chunks
#[async_trait]
pub trait TransferConnection: Send {
    /// Move the next chunk and return how many bytes went over the wire.
    ///
    /// Must be cancel-safe with respect to bytes already returned: the pool
    /// drops the future when the phase ends.
    async fn next_chunk(&mut self) -> Result<u64>;
}
