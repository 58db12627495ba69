//! HTTP client and batch orchestration for the Cutout API.
//!
//! [`ApiClient`] talks to `POST /remove-background` with a bounded timeout and
//! retry policy. [`BatchOrchestrator`] drives multi-file batches on top of it
//! and owns the resulting records, their object URLs and the download history.
//! The CLI uses both directly.

pub mod api;
pub mod download;
pub mod object_urls;
pub mod orchestrator;

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_TIMEOUT_SECS: u64 = 90;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_DELAY_MS: u64 = 1500;

/// Timeout and retry policy for background-removal requests.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    /// Per-attempt deadline; an expired attempt counts as retryable.
    pub timeout: Duration,
    /// Retries after the first attempt, so at most `max_retries + 1` requests per file.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl ClientConfig {
    /// Read `CUTOUT_API_URL`, `CUTOUT_TIMEOUT_SECS`, `CUTOUT_MAX_RETRIES` and
    /// `CUTOUT_RETRY_DELAY_MS`, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let parse = |key: &str| std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok());

        Self {
            base_url: std::env::var("CUTOUT_API_URL")
                .or_else(|_| std::env::var("API_URL"))
                .unwrap_or(defaults.base_url),
            timeout: parse("CUTOUT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: parse("CUTOUT_MAX_RETRIES")
                .map(|v| v as u32)
                .unwrap_or(defaults.max_retries),
            retry_delay: parse("CUTOUT_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
        }
    }
}

/// HTTP client for the Cutout API.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(mut config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Raw client for custom requests.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

// Re-exports
pub use api::{RemovedBackground, SubmitError, SubmitFailure};
pub use download::{DirectorySink, DownloadSink, ZIP_ARCHIVE_NAME};
pub use object_urls::ObjectUrlRegistry;
pub use orchestrator::{
    BatchError, BatchOrchestrator, BatchReport, BatchSettings, FileOutcome, LogNotifier,
    Notification, Notifier, OutcomeStatus, SourceFile,
};
