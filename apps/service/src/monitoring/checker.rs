use std::time::{Duration, Instant};

use crate::database::models::CheckStatus;

/// Why a probe did not produce a success signal
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected status code {0}")]
    Status(u16),
    #[error("invalid probe target: {0}")]
    InvalidTarget(String),
    #[error("transfer ended after {received} of {expected} bytes")]
    Incomplete { expected: u64, received: u64 },
}

impl ProbeError {
    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() { Self::Timeout(timeout) } else { Self::Transport(error) }
    }
}

/// Result of one reachability probe. Latency is kept for failures as well.
#[derive(Debug)]
pub struct ProbeOutcome {
    pub latency: Duration,
    pub result: Result<u16, ProbeError>,
}

impl ProbeOutcome {
    pub fn status(&self) -> CheckStatus {
        if self.result.is_ok() { CheckStatus::Up } else { CheckStatus::Down }
    }

    pub fn latency_ms(&self) -> i64 {
        i64::try_from(self.latency.as_millis()).unwrap_or(i64::MAX)
    }
}

/// A single bounded-timeout reachability check against one target
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    /// Never fails outright; errors are folded into the outcome
    async fn probe(&self, target: &str) -> ProbeOutcome;
}

/// HTTP `HEAD` prober. A 2xx answer within the timeout counts as reachable.
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("upwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ProbeError::Transport)?;

        Ok(Self { client, timeout })
    }

    /// Issue a `HEAD` request and time it; shared with the speed test's latency phase
    pub(crate) async fn head(&self, target: &str) -> (Duration, Result<u16, ProbeError>) {
        let start = Instant::now();
        let response = self.client.head(target).send().await;
        let latency = start.elapsed();

        let result = match response {
            Ok(response) if response.status().is_success() => Ok(response.status().as_u16()),
            Ok(response) => Err(ProbeError::Status(response.status().as_u16())),
            Err(e) if e.is_builder() => Err(ProbeError::InvalidTarget(e.to_string())),
            Err(e) => Err(ProbeError::from_reqwest(e, self.timeout)),
        };

        (latency, result)
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &str) -> ProbeOutcome {
        let (latency, result) = self.head(target).await;
        ProbeOutcome { latency, result }
    }
}
