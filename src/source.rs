use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::clip::Clip;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode },
    #[error("clip {path} is not available")]
    Missing { path: String },
}

/// Where clip bytes come from
#[async_trait]
pub trait ClipSource: Send + Sync {
    async fn fetch(&self, clip: Clip) -> Result<Vec<u8>, SourceError>;

    /// Human readable location, shown when clips cannot be loaded
    fn location(&self) -> String;
}

/// Fetches `GET {base}/api/audio/{speed}/{number}` from the clip service
#[derive(Debug, Clone)]
pub struct HttpClipSource {
    client: Client,
    base_url: String,
}

impl HttpClipSource {
    /// `load_timeout` bounds the whole request, so a stalled download fails
    /// instead of blocking the session.
    pub fn new(base_url: impl Into<String>, load_timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(load_timeout)
            .build()
            .map_err(SourceError::Client)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, clip: Clip) -> String {
        format!("{}{}", self.base_url, clip.path())
    }
}

#[async_trait]
impl ClipSource for HttpClipSource {
    async fn fetch(&self, clip: Clip) -> Result<Vec<u8>, SourceError> {
        let url = self.url_for(clip);
        debug!(%url, "fetching clip");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| SourceError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status { url, status });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| SourceError::Request {
                url: url.clone(),
                source,
            })?;
        debug!(%url, len = bytes.len(), "clip downloaded");

        Ok(bytes.to_vec())
    }

    fn location(&self) -> String {
        self.base_url.clone()
    }
}

/// In-process source serving the same bytes for every clip. Records the
/// requested paths in order.
#[derive(Debug, Default)]
pub struct MemoryClipSource {
    bytes: Vec<u8>,
    missing: HashSet<u32>,
    delay: Option<Duration>,
    requests: Mutex<Vec<String>>,
}

impl MemoryClipSource {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Self::default()
        }
    }

    /// Requests for `number` fail as if the service had no such clip
    pub fn with_missing(mut self, number: u32) -> Self {
        self.missing.insert(number);
        self
    }

    /// Every fetch takes `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ClipSource for MemoryClipSource {
    async fn fetch(&self, clip: Clip) -> Result<Vec<u8>, SourceError> {
        let path = clip.path();
        self.requests.lock().push(path.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.missing.contains(&clip.number) {
            return Err(SourceError::Missing { path });
        }

        Ok(self.bytes.clone())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
