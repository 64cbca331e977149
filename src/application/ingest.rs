// Strike ingestion - source trait, fetch window and retry policy
use crate::domain::geo::MapBoundingBox;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Request parameters for one fetch: the map window and the start of the
/// trailing time window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchWindow {
    pub bbox: MapBoundingBox,
    pub since_ns: i64,
}

impl FetchWindow {
    pub fn trailing(bbox: MapBoundingBox, now: DateTime<Utc>, minutes: i64) -> Self {
        let since = now - ChronoDuration::minutes(minutes);
        Self {
            bbox,
            since_ns: since.timestamp_nanos_opt().unwrap_or(0),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("authentication failed")]
    Authentication,
    #[error("request timed out")]
    Timeout,
    #[error("cannot connect: {0}")]
    Connect(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait StrikeSource: Send + Sync {
    /// Fetch the raw newline-delimited strike body for `window`.
    async fn fetch_strikes(&self, window: &FetchWindow) -> Result<String, FetchError>;

    /// One-off credential check used at setup time.
    async fn check_connection(&self) -> Result<(), FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(10),
            backoff: Duration::from_secs(2),
        }
    }
}

/// Fetch with bounded retries. Exhausting every attempt yields an empty
/// body so the tick still completes, just without strikes.
pub async fn fetch_with_retry(
    source: &dyn StrikeSource,
    window: &FetchWindow,
    policy: &RetryPolicy,
) -> String {
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        let result = match tokio::time::timeout(policy.timeout, source.fetch_strikes(window)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        };

        match result {
            Ok(body) => {
                tracing::debug!(
                    "Fetched {} bytes of strike data on attempt {}",
                    body.len(),
                    attempt
                );
                return body;
            }
            Err(e) => {
                tracing::warn!(
                    "Strike fetch attempt {}/{} failed: {}",
                    attempt,
                    attempts,
                    e
                );
            }
        }

        if attempt < attempts {
            tokio::time::sleep(policy.backoff).await;
        }
    }

    tracing::error!(
        "Giving up on strike fetch after {} attempts, continuing without strikes",
        attempts
    );
    String::new()
}
