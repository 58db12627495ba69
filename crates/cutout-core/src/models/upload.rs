use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::OutputFormat;

/// Idempotency key of a background-removal request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

/// Where a [`RequestId`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestIdSource {
    /// Supplied by the client via `X-Request-Id`.
    Header,
    /// Derived from content length, content type and arrival time.
    Derived,
}

impl RequestId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Use the client-supplied key when present, otherwise derive one from
    /// `content-length`, `content-type` and the arrival time in milliseconds.
    ///
    /// Derived keys are not collision-proof: two identical uploads arriving in
    /// the same millisecond share a key.
    pub fn from_parts(
        header: Option<&str>,
        content_length: Option<&str>,
        content_type: Option<&str>,
        received_at: DateTime<Utc>,
    ) -> (Self, RequestIdSource) {
        if let Some(id) = header.map(str::trim).filter(|id| !id.is_empty()) {
            return (Self(id.to_string()), RequestIdSource::Header);
        }

        let derived = format!(
            "{}-{}-{}",
            content_length.unwrap_or("unknown"),
            content_type.unwrap_or("unknown"),
            received_at.timestamp_millis()
        );
        (Self(derived), RequestIdSource::Derived)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed upload, owned by the request coordinator until the response is sent.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub request_id: RequestId,
    pub file_name: Option<String>,
    pub file_bytes: Vec<u8>,
    pub output_format: OutputFormat,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_header_wins_over_derived_key() {
        let now = Utc::now();
        let (id, source) =
            RequestId::from_parts(Some("photo.png-123-456"), Some("10"), Some("x"), now);
        assert_eq!(id.as_str(), "photo.png-123-456");
        assert_eq!(source, RequestIdSource::Header);
    }

    #[test]
    fn test_blank_header_falls_back_to_derived_key() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let (id, source) = RequestId::from_parts(
            Some("  "),
            Some("2048"),
            Some("multipart/form-data; boundary=abc"),
            at,
        );
        assert_eq!(source, RequestIdSource::Derived);
        assert_eq!(
            id.as_str(),
            "2048-multipart/form-data; boundary=abc-1700000000123"
        );
    }

    #[test]
    fn test_missing_headers_use_placeholder() {
        let at = Utc.timestamp_millis_opt(5).unwrap();
        let (id, _) = RequestId::from_parts(None, None, None, at);
        assert_eq!(id.as_str(), "unknown-unknown-5");
    }
}
