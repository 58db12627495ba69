//! Background-removal requests with timeout and retry.
//!
//! Each file is sent with its own `X-Request-ID`, so a retry after a `429`
//! succeeds as soon as the server finishes the earlier attempt for that id.

use crate::ApiClient;
use cutout_core::OutputFormat;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};

/// Client-observed failure of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Request timed out")]
    Timeout,

    /// The server answered with a non-success status. `message` is the JSON
    /// `error` field when present, otherwise the raw body.
    #[error("Server responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl SubmitError {
    /// Timeouts and in-flight collisions are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmitError::Timeout | SubmitError::Status { status: 429, .. }
        )
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SubmitError::Timeout
        } else {
            SubmitError::Transport(err.to_string())
        }
    }
}

/// Final failure after the retry policy gave up.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct SubmitFailure {
    pub error: SubmitError,
    pub attempts: u32,
}

/// A processed image returned by the server.
#[derive(Debug, Clone)]
pub struct RemovedBackground {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Network attempts used, including the successful one.
    pub attempts: u32,
}

/// Extract a human-readable message from an error body.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Control characters and `%` are escaped; non-ASCII bytes always are.
const HEADER_ESCAPE: &AsciiSet = &CONTROLS.add(b'%');

/// Header values must be visible ASCII; anything else is percent-escaped.
fn header_safe(value: &str) -> String {
    utf8_percent_encode(value, HEADER_ESCAPE).to_string()
}

impl ApiClient {
    async fn send_once(
        &self,
        file_name: &str,
        bytes: &[u8],
        mime_type: Option<&str>,
        format: OutputFormat,
        request_id: &str,
    ) -> Result<(Vec<u8>, String), SubmitError> {
        let mut part = Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
        if let Some(mime) = mime_type {
            part = part
                .mime_str(mime)
                .map_err(|e| SubmitError::Transport(e.to_string()))?;
        }
        let form = Form::new()
            .part("file", part)
            .text("output_format", format.as_str().to_string());

        let response = self
            .client()
            .post(self.build_url("/remove-background"))
            .header("X-Request-ID", header_safe(request_id))
            .multipart(form)
            .send()
            .await
            .map_err(SubmitError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmitError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(format.mime_type())
            .to_string();
        let body = response.bytes().await.map_err(SubmitError::from_reqwest)?;
        Ok((body.to_vec(), mime))
    }

    /// Remove the background of one image.
    ///
    /// Retries on timeout or `429` up to `max_retries` times with a fixed delay;
    /// every other failure is returned immediately.
    pub async fn remove_background(
        &self,
        file_name: &str,
        bytes: &[u8],
        mime_type: Option<&str>,
        format: OutputFormat,
        request_id: &str,
    ) -> Result<RemovedBackground, SubmitFailure> {
        let max_attempts = self.config().max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self
                .send_once(file_name, bytes, mime_type, format, request_id)
                .await
            {
                Ok((bytes, mime_type)) => {
                    tracing::debug!(file = file_name, attempt, "Background removed");
                    return Ok(RemovedBackground {
                        bytes,
                        mime_type,
                        attempts: attempt,
                    });
                }
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        file = file_name,
                        attempt,
                        max_retries = self.config().max_retries,
                        error = %error,
                        "Retrying background removal"
                    );
                    tokio::time::sleep(self.config().retry_delay).await;
                }
                Err(error) => {
                    return Err(SubmitFailure {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}
