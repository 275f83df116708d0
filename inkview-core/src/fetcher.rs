// ABOUTME: I/O boundary for image resolution: local file reads and HTTP GETs
// ABOUTME: Enforces timeouts, redirect limits and a streamed size cap on remote bodies

use crate::constants::{http, limits, timeouts};
use crate::content::ContentKind;
use crate::error::ResolutionError;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use typed_builder::TypedBuilder;
use url::Url;

/// Raw bytes plus whatever the transport told us about them
#[derive(Debug, Clone)]
pub struct FetchedBytes {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedBytes {
    pub fn kind(&self, name: &str) -> ContentKind {
        ContentKind::detect(&self.bytes, self.content_type.as_deref(), name)
    }
}

#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Read a local file; any failure is `NotFound`
    async fn read_file(&self, path: &Path) -> Result<FetchedBytes, ResolutionError>;

    /// GET a remote resource; transport errors, timeouts and non-2xx are `FetchFailed`
    async fn fetch_url(&self, url: &Url) -> Result<FetchedBytes, ResolutionError>;

    /// Fetch a remote document as text (used for remote Markdown sources)
    async fn fetch_text(&self, url: &Url) -> Result<String, ResolutionError> {
        let fetched = self.fetch_url(url).await?;
        String::from_utf8(fetched.bytes)
            .map_err(|_| ResolutionError::Unsupported(format!("{} is not UTF-8 text", url)))
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct FetcherConfig {
    #[builder(default = timeouts::FETCH_TIMEOUT)]
    pub timeout: Duration,

    #[builder(default = limits::MAX_FETCH_BYTES)]
    pub max_bytes: u64,

    #[builder(default = http::USER_AGENT.to_string(), setter(into))]
    pub user_agent: String,

    #[builder(default = limits::MAX_REDIRECTS)]
    pub max_redirects: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        FetcherConfig::builder().build()
    }
}

pub struct HttpFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, ResolutionError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| ResolutionError::FetchFailed(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    async fn read_body_with_limit(
        &self,
        response: reqwest::Response,
        url: &Url,
    ) -> Result<Vec<u8>, ResolutionError> {
        if let Some(content_length) = response.content_length() {
            if content_length > self.max_bytes {
                return Err(ResolutionError::FetchFailed(format!(
                    "too large: {} bytes (max: {} bytes)",
                    content_length, self.max_bytes
                )));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            bytes.extend_from_slice(&chunk);

            if bytes.len() as u64 > self.max_bytes {
                log::debug!("Aborting download of {} after {} bytes", url, bytes.len());
                return Err(ResolutionError::FetchFailed(format!(
                    "exceeded size limit during download (max: {} bytes)",
                    self.max_bytes
                )));
            }
        }

        Ok(bytes)
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn read_file(&self, path: &Path) -> Result<FetchedBytes, ResolutionError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            log::debug!("Failed to read {}: {}", path.display(), e);
            ResolutionError::NotFound(path.display().to_string())
        })?;

        Ok(FetchedBytes {
            bytes,
            content_type: None,
        })
    }

    async fn fetch_url(&self, url: &Url) -> Result<FetchedBytes, ResolutionError> {
        let response = self.client.get(url.as_str()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolutionError::FetchFailed(format!("HTTP {}", status)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(str::to_string);

        let bytes = self.read_body_with_limit(response, url).await?;
        log::debug!("Fetched {} ({})", url, format_bytes(bytes.len()));

        Ok(FetchedBytes {
            bytes,
            content_type,
        })
    }
}

/// Format bytes in a human-readable way
pub fn format_bytes(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
