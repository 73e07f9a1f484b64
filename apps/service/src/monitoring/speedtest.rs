//! Bandwidth measurement: download, upload and reference latency as one atomic sample.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use tracing::info;

use super::checker::{HttpProber, ProbeError};
use crate::config::SpeedTestSettings;
use crate::database::models::SpeedRecord;
use crate::database::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SpeedTestError {
    #[error("download phase failed: {0}")]
    Download(#[source] ProbeError),
    #[error("upload phase failed: {0}")]
    Upload(#[source] ProbeError),
    #[error("latency phase failed: {0}")]
    Latency(#[source] ProbeError),
    #[error("failed to save speed test result: {0}")]
    Store(#[from] StoreError),
}

/// Bytes moved in one direction and how long it took
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transfer {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl Transfer {
    /// Throughput in megabits (10^6 bits) per second
    pub fn mbps(&self) -> f64 {
        // Sub-microsecond transfers only happen against fakes; clamp to avoid infinities.
        let seconds = self.elapsed.as_secs_f64().max(1e-6);
        (self.bytes as f64 * 8.0 / 1_000_000.0) / seconds
    }
}

/// The three network phases of a speed test
#[async_trait]
pub trait Bandwidth: Send + Sync {
    async fn download(&self, bytes: u64) -> Result<Transfer, ProbeError>;
    async fn upload(&self, bytes: u64) -> Result<Transfer, ProbeError>;
    async fn latency(&self) -> Result<Duration, ProbeError>;
}

/// Reference-endpoint implementation (Cloudflare-style `__down?bytes=` / `__up` endpoints)
pub struct HttpBandwidth {
    client: reqwest::Client,
    latency_prober: HttpProber,
    settings: SpeedTestSettings,
}

impl HttpBandwidth {
    pub fn new(settings: SpeedTestSettings, probe_timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(concat!("upwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ProbeError::Transport)?;

        Ok(Self { client, latency_prober: HttpProber::new(probe_timeout)?, settings })
    }

    fn transport(&self, error: reqwest::Error) -> ProbeError {
        ProbeError::from_reqwest(error, self.settings.timeout())
    }
}

#[async_trait]
impl Bandwidth for HttpBandwidth {
    async fn download(&self, bytes: u64) -> Result<Transfer, ProbeError> {
        let start = Instant::now();
        let mut response = self
            .client
            .get(&self.settings.download_url)
            .query(&[("bytes", bytes)])
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status().as_u16()));
        }

        let mut received = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| self.transport(e))? {
            received += chunk.len() as u64;
        }
        let elapsed = start.elapsed();

        if received < bytes {
            return Err(ProbeError::Incomplete { expected: bytes, received });
        }
        Ok(Transfer { bytes: received, elapsed })
    }

    async fn upload(&self, bytes: u64) -> Result<Transfer, ProbeError> {
        let upload_id: u32 = rand::thread_rng().gen_range(0..1_000_000);
        let size = usize::try_from(bytes)
            .map_err(|_| ProbeError::InvalidTarget(format!("upload size {bytes} too large")))?;
        let payload = vec![b'a'; size];

        let start = Instant::now();
        let response = self
            .client
            .post(&self.settings.upload_url)
            .query(&[("uploadId", upload_id)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(payload)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let elapsed = start.elapsed();

        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status().as_u16()));
        }
        Ok(Transfer { bytes, elapsed })
    }

    async fn latency(&self) -> Result<Duration, ProbeError> {
        let (latency, result) = self.latency_prober.head(&self.settings.latency_target).await;
        result.map(|_| latency)
    }
}

/// Runs speed tests and persists complete results
pub struct SpeedProber {
    bandwidth: Arc<dyn Bandwidth>,
    store: Arc<dyn Store>,
    download_bytes: u64,
    upload_bytes: u64,
}

impl SpeedProber {
    pub fn new(
        bandwidth: Arc<dyn Bandwidth>,
        store: Arc<dyn Store>,
        download_bytes: u64,
        upload_bytes: u64,
    ) -> Self {
        Self { bandwidth, store, download_bytes, upload_bytes }
    }

    /// Measure download, upload and latency in sequence.
    ///
    /// Any failing phase aborts the run before anything is written.
    pub async fn run_speed_test(&self) -> Result<SpeedRecord, SpeedTestError> {
        let download =
            self.bandwidth.download(self.download_bytes).await.map_err(SpeedTestError::Download)?;
        info!(
            bytes = download.bytes,
            elapsed_ms = download.elapsed.as_millis() as u64,
            mbps = download.mbps(),
            "Download phase completed"
        );

        let upload = self.bandwidth.upload(self.upload_bytes).await.map_err(SpeedTestError::Upload)?;
        info!(
            bytes = upload.bytes,
            elapsed_ms = upload.elapsed.as_millis() as u64,
            mbps = upload.mbps(),
            "Upload phase completed"
        );

        let latency = self.bandwidth.latency().await.map_err(SpeedTestError::Latency)?;

        let record = SpeedRecord::new(
            download.mbps(),
            upload.mbps(),
            i64::try_from(latency.as_millis()).unwrap_or(i64::MAX),
        );
        self.store.append_speed_test(&record).await?;

        info!(
            download_mbps = record.download_mbps,
            upload_mbps = record.upload_mbps,
            latency_ms = record.latency_ms,
            "Speed test completed"
        );
        Ok(record)
    }
}
