//! Loading raw list lines from local files and HTTP(S) URLs.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::{LoadCause, LoadError};
use crate::fs_abstraction::{FileSystem, RealFileSystem};
use crate::resolver::is_url;

/// Maximum size per list (20 MB)
/// Large community domain lists are a few MB, so this leaves ample margin
const MAX_SOURCE_SIZE: usize = 20 * 1024 * 1024;

/// Maximum total size for all downloads combined (200 MB)
const MAX_TOTAL_SIZE: usize = 200 * 1024 * 1024;

/// Something that turns a source identifier into list lines.
///
/// Returned lines are trimmed, with blank lines and `#` comments removed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SourceLoader: Send + Sync {
    async fn load_lines(&self, source: &str) -> Result<Vec<String>, LoadError>;
}

/// HTTP retry and timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchSettings {
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Attempts per URL (1 = no retry)
    pub retries: u32,
    /// Base delay between attempts, doubled after each failure
    pub retry_delay_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 3,
            retry_delay_ms: 2000,
        }
    }
}

/// Loads files relative to a base directory and URLs over HTTP.
pub struct Loader {
    client: Client,
    fs: Arc<dyn FileSystem>,
    base_dir: PathBuf,
    settings: FetchSettings,
    /// Cumulative download size tracker (thread-safe for concurrent fetches)
    total_downloaded: AtomicUsize,
}

impl Loader {
    /// Create a loader resolving relative paths against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, settings: FetchSettings) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(format!("rulekit/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            fs: Arc::new(RealFileSystem),
            base_dir: base_dir.into(),
            settings,
            total_downloaded: AtomicUsize::new(0),
        })
    }

    /// Replace the filesystem used for local sources.
    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Get the total bytes downloaded so far
    pub fn total_downloaded(&self) -> usize {
        self.total_downloaded.load(Ordering::Relaxed)
    }

    /// Resolve a local source against the base directory.
    pub fn resolve_path(&self, source: &str) -> PathBuf {
        let path = Path::new(source);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn read_file(&self, source: &str) -> Result<String, LoadCause> {
        let path = self.resolve_path(source);
        debug!("Reading {}", path.display());
        let content = self.fs.read_to_string(&path)?;
        if content.len() > MAX_SOURCE_SIZE {
            return Err(LoadCause::TooLarge {
                size: content.len(),
                max: MAX_SOURCE_SIZE,
            });
        }
        Ok(content)
    }

    /// Fetch content with retry logic and size validation
    async fn fetch_with_retry(&self, url: &str) -> Result<String, LoadCause> {
        let attempts = self.settings.retries.max(1);
        let mut attempt = 0;

        loop {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if is_retryable(&e) && attempt + 1 < attempts => {
                    attempt += 1;
                    let delay = self.settings.retry_delay_ms * (1u64 << (attempt - 1).min(10));
                    debug!("Retry {} after {}ms for {}: {}", attempt, delay, url, e);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, LoadCause> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(LoadCause::Status(response.status()));
        }

        // Check Content-Length header if available
        if let Some(content_length) = response.content_length() {
            self.check_size(content_length as usize)?;
        }

        let body = response.text().await?;

        // Double-check actual size after download
        self.check_size(body.len())?;
        self.total_downloaded.fetch_add(body.len(), Ordering::Relaxed);

        Ok(body)
    }

    fn check_size(&self, size: usize) -> Result<(), LoadCause> {
        if size > MAX_SOURCE_SIZE {
            return Err(LoadCause::TooLarge {
                size,
                max: MAX_SOURCE_SIZE,
            });
        }
        let current_total = self.total_downloaded.load(Ordering::Relaxed);
        if current_total + size > MAX_TOTAL_SIZE {
            return Err(LoadCause::TooLarge {
                size: current_total + size,
                max: MAX_TOTAL_SIZE,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SourceLoader for Loader {
    async fn load_lines(&self, source: &str) -> Result<Vec<String>, LoadError> {
        let content = if is_url(source) {
            self.fetch_with_retry(source).await
        } else {
            self.read_file(source)
        }
        .map_err(|cause| LoadError::new(source, cause))?;

        Ok(parse_lines(&content))
    }
}

/// Only transport errors, 5xx and 429 are worth another attempt.
fn is_retryable(cause: &LoadCause) -> bool {
    match cause {
        LoadCause::Http(_) => true,
        LoadCause::Status(status) => {
            status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
        }
        LoadCause::Io(_) | LoadCause::TooLarge { .. } => false,
    }
}

/// Split list content into trimmed lines, dropping blanks and `#` comments.
///
/// A leading UTF-8 byte order mark is removed first.
pub fn parse_lines(content: &str) -> Vec<String> {
    content
        .strip_prefix('\u{feff}')
        .unwrap_or(content)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
