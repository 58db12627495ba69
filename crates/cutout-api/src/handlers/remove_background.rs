//! `POST /remove-background`
//!
//! Request lifecycle: derive the request id, claim it in the in-flight
//! registry, provision the engine environment, parse the multipart body, then
//! hand the job to a detached task. The task owns the registry guard, so a
//! client that disconnects mid-job neither cancels the engine nor leaves its
//! id registered once the job ends.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, FromRequest, Multipart, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use cutout_core::{AppError, OutputFormat, RequestId, RequestIdSource, UploadRequest};
use serde::Deserialize;
use tracing::Instrument;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// `output_format` may also be given as a query parameter; the form field wins.
#[derive(Debug, Default, Deserialize)]
struct FormatQuery {
    output_format: Option<String>,
}

/// Multipart body after a single pass over its fields.
#[derive(Debug, Default)]
struct ParsedUpload {
    fields: HashMap<String, String>,
    file: Option<UploadedFile>,
}

#[derive(Debug)]
struct UploadedFile {
    name: Option<String>,
    bytes: Vec<u8>,
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::InvalidInput(format!("Failed to read multipart: {}", err.body_text()))
    }
}

/// Consume the multipart stream. Only one field named `file` is accepted;
/// every other field is kept as text.
async fn parse_upload(mut multipart: Multipart) -> Result<ParsedUpload, AppError> {
    let mut parsed = ParsedUpload::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().map(|s| s.to_string()).unwrap_or_default();

        if field_name == "file" {
            if parsed.file.is_some() {
                return Err(AppError::InvalidInput(
                    "Multiple file fields are not allowed; send exactly one field named 'file'"
                        .to_string(),
                ));
            }
            let name = field.file_name().map(|s| s.to_string());
            let bytes = field.bytes().await.map_err(multipart_error)?;
            parsed.file = Some(UploadedFile {
                name,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            parsed.fields.insert(field_name, value);
        }
    }

    Ok(parsed)
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Resolve the request id from headers, deriving one when the client sent none.
fn request_id(
    headers: &HeaderMap,
    require_header: bool,
    received_at: chrono::DateTime<Utc>,
) -> Result<(RequestId, RequestIdSource), AppError> {
    let supplied = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty());

    if supplied.is_none() && require_header {
        return Err(AppError::InvalidInput(
            "Missing X-Request-Id header".to_string(),
        ));
    }

    Ok(RequestId::from_parts(
        supplied,
        header_str(headers, header::CONTENT_LENGTH),
        header_str(headers, header::CONTENT_TYPE),
        received_at,
    ))
}

fn resolve_format(
    fields: &HashMap<String, String>,
    query: Option<String>,
) -> Result<OutputFormat, AppError> {
    match fields.get("output_format").cloned().or(query) {
        None => Ok(OutputFormat::default()),
        Some(value) if value.trim().is_empty() => Ok(OutputFormat::default()),
        Some(value) => value
            .parse::<OutputFormat>()
            .map_err(|e| AppError::InvalidInput(e.to_string())),
    }
}

/// Remove the background of an uploaded image
///
/// Returns the processed image in the requested format. JPEG output is
/// flattened onto white; PNG and WebP keep transparency.
///
/// # Errors
/// - `AppError::Conflict` - A request with the same id is still running (429)
/// - `AppError::InvalidInput` - No file, unreadable body or unknown format (400)
/// - `AppError::Engine` - The background-removal engine failed (500)
#[utoipa::path(
    post,
    path = "/remove-background",
    tag = "background",
    params(
        ("X-Request-Id" = Option<String>, Header, description = "Idempotency key; derived from content length, type and arrival time when absent"),
        ("output_format" = Option<String>, Query, description = "png (default), jpeg, jpg or webp; the multipart field of the same name takes precedence")
    ),
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Background removed; the body is the encoded image"),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 405, description = "Method not allowed", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 429, description = "Same request already in flight", body = ErrorResponse),
        (status = 500, description = "Background removal failed", body = ErrorResponse)
    )
)]
pub async fn remove_background(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, HttpAppError> {
    handle_upload(state.clone(), request)
        .await
        .map_err(|e| e.for_config(&state.config))
}

async fn handle_upload(state: Arc<AppState>, request: Request) -> Result<Response, HttpAppError> {
    let received_at = Utc::now();
    let (request_id, source) =
        request_id(request.headers(), state.config.require_request_id, received_at)?;

    let guard = state
        .registry
        .try_acquire(&request_id)
        .ok_or_else(|| AppError::Conflict(request_id.to_string()))?;

    tracing::info!(
        request_id = %request_id,
        derived_id = matches!(source, RequestIdSource::Derived),
        "Background removal request accepted"
    );

    if let Err(e) = state.provisioner.ensure_ready().await {
        tracing::warn!(
            request_id = %request_id,
            error = %e,
            "Engine environment not ready, attempting job anyway"
        );
    }

    let query_format = Query::<FormatQuery>::try_from_uri(request.uri())
        .map(|Query(q)| q.output_format)
        .unwrap_or_default();

    // The body is read exactly once, here.
    let multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let ParsedUpload { fields, file } = parse_upload(multipart).await?;

    let Some(file) = file else {
        return Err(AppError::InvalidInput("No file uploaded".to_string()).into());
    };
    let output_format = resolve_format(&fields, query_format)?;

    let upload = UploadRequest {
        request_id,
        file_name: file.name,
        file_bytes: file.bytes,
        output_format,
        received_at,
    };

    tracing::debug!(
        request_id = %upload.request_id,
        file_name = ?upload.file_name,
        size = upload.file_bytes.len(),
        format = %upload.output_format,
        "Upload parsed"
    );

    let pipeline = state.pipeline.clone();
    let span = tracing::info_span!("job", request_id = %upload.request_id);
    let job = tokio::spawn(
        async move {
            // Dropped when the job ends, whether or not anyone awaits the result.
            let _guard = guard;
            pipeline
                .process(&upload.file_bytes, upload.output_format)
                .await
        }
        .instrument(span),
    );

    let processed = job
        .await
        .map_err(|e| AppError::Internal(format!("Job task failed: {}", e)))??;

    let filename = format!("no_bg_image.{}", processed.format.extension());
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, processed.format.mime_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        processed.bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_request_id_prefers_header() {
        let (id, source) = request_id(
            &headers(&[("x-request-id", "cat.png-10-1"), ("content-length", "10")]),
            false,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(id.as_str(), "cat.png-10-1");
        assert_eq!(source, RequestIdSource::Header);
    }

    #[test]
    fn test_request_id_derived_from_length_and_type() {
        let (id, source) = request_id(
            &headers(&[("content-length", "42"), ("content-type", "multipart/form-data")]),
            false,
            Utc::now(),
        )
        .unwrap();
        assert!(id.as_str().starts_with("42-multipart/form-data-"));
        assert_eq!(source, RequestIdSource::Derived);
    }

    #[test]
    fn test_request_id_required() {
        let err = request_id(&headers(&[]), true, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_format_field_wins_over_query() {
        let mut fields = HashMap::new();
        assert_eq!(resolve_format(&fields, None).unwrap(), OutputFormat::Png);
        assert_eq!(
            resolve_format(&fields, Some("webp".to_string())).unwrap(),
            OutputFormat::Webp
        );

        fields.insert("output_format".to_string(), "JPG".to_string());
        assert_eq!(
            resolve_format(&fields, Some("webp".to_string())).unwrap(),
            OutputFormat::Jpg
        );

        fields.insert("output_format".to_string(), "tiff".to_string());
        assert!(resolve_format(&fields, None).is_err());
    }
}
