//! speedtest.net HTTP protocol over reqwest
//!
//! Latency is the round trip of `GET {base}/latency.txt`, downloads stream
//! `GET {base}/random{N}x{N}.jpg` repeatedly, and uploads `POST` a form body
//! of the configured chunk size to the server's upload URL. Upload bodies are
//! streamed in slices and each slice counts once hyper takes it for the socket,
//! so a slow uplink still shows progress before the server acknowledges.

use super::{SpeedTransport, TransferConnection};
use crate::{
    defaults,
    error::{AppError, Result},
    models::{Config, Server},
    types::Direction,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{
    header::{CONTENT_LENGTH, CONTENT_TYPE},
    Body, Client, Response,
};
use std::{
    ops::Range,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{sync::mpsc, task::JoinHandle};

const UPLOAD_FIELD_PREFIX: &[u8] = b"content1=";

/// Granularity of upload accounting
const UPLOAD_SLICE_BYTES: usize = 8 * 1024;

/// Production transport backed by a shared reqwest client
pub struct HttpTransport {
    client: Client,
    download_size: u32,
    upload_payload: Arc<Vec<u8>>,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport from the application configuration
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .user_agent(defaults::USER_AGENT)
            .pool_max_idle_per_host(config.connections.max(1) * 2)
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, config.download_size, config.chunk_bytes, config.timeout()))
    }

    /// Create a transport around an existing client
    pub fn with_client(client: Client, download_size: u32, chunk_bytes: usize, request_timeout: Duration) -> Self {
        Self {
            client,
            download_size,
            upload_payload: Arc::new(upload_payload(chunk_bytes)),
            request_timeout,
        }
    }

    fn latency_url(server: &Server) -> String {
        format!("{}/latency.txt", server.base_url())
    }

    fn download_url(&self, server: &Server) -> String {
        format!("{}/random{}x{}.jpg", server.base_url(), self.download_size, self.download_size)
    }
}

/// Form-encoded upload body of exactly `size` bytes (never shorter than the field prefix)
fn upload_payload(size: usize) -> Vec<u8> {
    let mut payload = Vec::with_capacity(size.max(UPLOAD_FIELD_PREFIX.len()));
    payload.extend_from_slice(UPLOAD_FIELD_PREFIX);
    let filler = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    while payload.len() < size {
        payload.push(filler[payload.len() % filler.len()]);
    }
    payload
}

async fn open_download(client: &Client, url: &str) -> Result<Response> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response)
}

#[async_trait]
impl SpeedTransport for HttpTransport {
    async fn round_trip(&self, server: &Server) -> Result<Duration> {
        let url = Self::latency_url(server);
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?;
        response.bytes().await?;

        Ok(start.elapsed())
    }

    async fn connect(&self, server: &Server, direction: Direction) -> Result<Box<dyn TransferConnection>> {
        match direction {
            Direction::Download => {
                let url = self.download_url(server);
                let response = open_download(&self.client, &url).await?;
                Ok(Box::new(HttpDownload {
                    client: self.client.clone(),
                    url,
                    response: Some(response),
                }))
            }
            Direction::Upload => {
                // An empty form post proves the endpoint accepts uploads
                self.client
                    .post(&server.url)
                    .timeout(self.request_timeout)
                    .body(UPLOAD_FIELD_PREFIX.to_vec())
                    .send()
                    .await?
                    .error_for_status()?;

                Ok(Box::new(HttpUpload {
                    client: self.client.clone(),
                    url: server.url.clone(),
                    payload: self.upload_payload.clone(),
                    in_flight: None,
                }))
            }
        }
    }
}

/// Streams the download image body, reopening it whenever it ends
struct HttpDownload {
    client: Client,
    url: String,
    response: Option<Response>,
}

#[async_trait]
impl TransferConnection for HttpDownload {
    async fn next_chunk(&mut self) -> Result<u64> {
        let fresh = self.response.is_none();
        if fresh {
            self.response = Some(open_download(&self.client, &self.url).await?);
        }

        let chunk = match self.response.as_mut() {
            Some(response) => response.chunk().await?,
            None => None,
        };

        match chunk {
            Some(bytes) => Ok(bytes.len() as u64),
            None => {
                // Body finished; the next call starts a new request
                self.response = None;
                if fresh {
                    return Err(AppError::http_request(format!("{} returned an empty body", self.url)));
                }
                Ok(0)
            }
        }
    }
}

fn slice_ranges(len: usize) -> Vec<Range<usize>> {
    (0..len)
        .step_by(UPLOAD_SLICE_BYTES)
        .map(|start| start..(start + UPLOAD_SLICE_BYTES).min(len))
        .collect()
}

/// One upload request whose body is still being written
struct InFlightUpload {
    /// Sizes of body slices already handed to the connection
    handed_off: mpsc::UnboundedReceiver<u64>,
    response: JoinHandle<Result<()>>,
}

impl Drop for InFlightUpload {
    fn drop(&mut self) {
        self.response.abort();
    }
}

/// Posts the payload back to back, reporting it slice by slice
struct HttpUpload {
    client: Client,
    url: String,
    payload: Arc<Vec<u8>>,
    in_flight: Option<InFlightUpload>,
}

impl HttpUpload {
    fn start_post(&self) -> InFlightUpload {
        let (tx, handed_off) = mpsc::unbounded_channel();
        let payload = self.payload.clone();
        let length = payload.len();

        let slices = stream::iter(slice_ranges(length)).map(move |range| {
            // Receiver may be gone once the phase ends
            let _ = tx.send(range.len() as u64);
            Ok::<Vec<u8>, std::io::Error>(payload[range].to_vec())
        });

        let request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(CONTENT_LENGTH, length)
            .body(Body::wrap_stream(slices));

        let response = tokio::spawn(async move {
            request.send().await?.error_for_status()?;
            Ok(())
        });

        InFlightUpload { handed_off, response }
    }
}

#[async_trait]
impl TransferConnection for HttpUpload {
    async fn next_chunk(&mut self) -> Result<u64> {
        loop {
            if self.in_flight.is_none() {
                self.in_flight = Some(self.start_post());
            }

            let handed_off = match self.in_flight.as_mut() {
                Some(post) => post.handed_off.recv().await,
                None => None,
            };
            if let Some(bytes) = handed_off {
                return Ok(bytes);
            }

            // Whole body written; the request must still succeed
            if let Some(mut post) = self.in_flight.take() {
                (&mut post.response).await??;
            }
        }
    }
}
