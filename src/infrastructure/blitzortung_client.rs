// Blitzortung feed client - authenticated HTTP strike source
use crate::application::ingest::{FetchError, FetchWindow, StrikeSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct BlitzortungClient {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl BlitzortungClient {
    pub fn new(base_url: String, username: String, password: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
            client,
        })
    }

    fn strikes_request(&self, window: &FetchWindow) -> reqwest::RequestBuilder {
        self.client
            .get(&self.base_url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&query_params(window))
    }

    fn probe_request(&self) -> reqwest::RequestBuilder {
        self.client
            .get(&self.base_url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("number", "1"), ("sig", "0")])
    }
}

/// Query string for one trailing window: start time in nanoseconds and the
/// map bounds, signals excluded.
fn query_params(window: &FetchWindow) -> Vec<(&'static str, String)> {
    vec![
        ("time", window.since_ns.to_string()),
        ("west", window.bbox.west.to_string()),
        ("east", window.bbox.east.to_string()),
        ("north", window.bbox.north.to_string()),
        ("south", window.bbox.south.to_string()),
        ("sig", "0".to_string()),
    ]
}

fn transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else {
        FetchError::Transport(e.to_string())
    }
}

#[async_trait]
impl StrikeSource for BlitzortungClient {
    async fn fetch_strikes(&self, window: &FetchWindow) -> Result<String, FetchError> {
        let response = self
            .strikes_request(window)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FetchError::Authentication),
            StatusCode::OK => response.text().await.map_err(transport_error),
            status => Err(FetchError::Status(status.as_u16())),
        }
    }

    async fn check_connection(&self) -> Result<(), FetchError> {
        let response = self
            .probe_request()
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() != StatusCode::OK {
            tracing::debug!("Credential check rejected with {}", response.status());
            return Err(FetchError::Authentication);
        }
        Ok(())
    }
}
