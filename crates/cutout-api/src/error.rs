//! HTTP error response conversion
//!
//! Handlers return `Result<_, HttpAppError>`. Errors from the job layer are
//! mapped onto `AppError` here so every failure renders the same JSON shape.

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use cutout_core::{AppError, Config, ErrorMetadata, LogLevel};
use cutout_processing::JobError;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Machine-readable error code for programmatic handling
    pub code: String,
    /// Whether this error is recoverable (can be retried)
    pub recoverable: bool,
    /// Suggested action for the client (e.g., "Wait for the running request to finish and retry")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

/// Wrapper type for AppError to implement IntoResponse
/// This is necessary because of Rust's orphan rules - we can't implement
/// IntoResponse (external trait) for AppError (external type from cutout-core)
#[derive(Debug)]
pub struct HttpAppError {
    pub error: AppError,
    /// Whether to render for production. `None` falls back to the process
    /// environment, for errors raised before a handler has seen the config.
    production: Option<bool>,
}

impl HttpAppError {
    pub fn new(error: AppError) -> Self {
        Self {
            error,
            production: None,
        }
    }

    /// Render according to `config` instead of the process environment.
    pub fn for_config(mut self, config: &Config) -> Self {
        self.production = Some(config.is_production());
        self
    }
}

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError::new(err)
    }
}

impl From<anyhow::Error> for HttpAppError {
    fn from(err: anyhow::Error) -> Self {
        HttpAppError::new(AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        })
    }
}

impl From<JobError> for HttpAppError {
    fn from(err: JobError) -> Self {
        let app_error = match err {
            JobError::EngineFailed { ref output, .. } => AppError::Engine {
                message: err.to_string(),
                output: output.clone(),
            },
            JobError::Spawn { .. } | JobError::Codec(_) | JobError::MissingOutput(_) => {
                AppError::Engine {
                    message: err.to_string(),
                    output: String::new(),
                }
            }
            JobError::Artifact(source) => AppError::InternalWithSource {
                message: "Failed to access job artifacts".to_string(),
                source: anyhow::Error::new(source),
            },
            JobError::Protocol(_) | JobError::Join(_) => AppError::Internal(err.to_string()),
        };
        HttpAppError::new(app_error)
    }
}

fn log_error(error: &AppError) {
    let error_type = error.error_type();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Error => {
            tracing::error!(
                error = %error,
                error_type = error_type,
                details = %error.detailed_message(),
                "Error occurred"
            );
        }
    }
}

fn is_production_env() -> bool {
    std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .map(|env| env.to_lowercase() == "production" || env.to_lowercase() == "prod")
        .unwrap_or(false)
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.error;
        let is_production = self.production.unwrap_or_else(is_production_env);

        let status = StatusCode::from_u16(app_error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(app_error);

        // Outside production every error carries its detail chain, sensitive or not.
        let show_details = !is_production;
        let body = Json(ErrorResponse {
            error: app_error.client_message(),
            details: show_details.then(|| app_error.detailed_message()),
            error_type: show_details.then(|| app_error.error_type().to_string()),
            code: app_error.error_code().to_string(),
            recoverable: app_error.is_recoverable(),
            suggested_action: app_error.suggested_action().map(String::from),
        });

        (status, body).into_response()
    }
}

/// Fallback for unsupported methods on a POST-only route.
pub async fn method_not_allowed(
    State(state): State<Arc<AppState>>,
    method: Method,
) -> impl IntoResponse {
    (
        [(header::ALLOW, "POST")],
        HttpAppError::new(AppError::MethodNotAllowed(method.to_string())).for_config(&state.config),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_failure_maps_to_engine_error() {
        let err = HttpAppError::from(JobError::EngineFailed {
            status: Some(1),
            output: "Processing error".to_string(),
        });
        match err.error {
            AppError::Engine { output, .. } => assert_eq!(output, "Processing error"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_artifact_failure_is_internal() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = HttpAppError::from(JobError::Artifact(io));
        assert_eq!(err.error.http_status_code(), 500);
        assert!(err.error.is_sensitive());
    }

    #[test]
    fn test_conflict_renders_429() {
        let response = HttpAppError::new(AppError::Conflict("id".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    async fn render(err: HttpAppError) -> serde_json::Value {
        let body = err.into_response().into_body();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn artifact_failure() -> HttpAppError {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        HttpAppError::from(JobError::Artifact(io))
    }

    #[tokio::test]
    async fn test_internal_error_details_shown_outside_production() {
        let config = Config::default();
        let body = render(artifact_failure().for_config(&config)).await;

        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert!(body["details"].as_str().unwrap().contains("denied"));
        assert_eq!(body["error_type"], "Internal");
    }

    #[tokio::test]
    async fn test_internal_error_details_hidden_in_production() {
        let config = Config {
            environment: "production".to_string(),
            cors_origins: vec!["https://cutout.example".to_string()],
            ..Config::default()
        };
        let body = render(artifact_failure().for_config(&config)).await;

        assert_eq!(body["error"], "Internal server error");
        assert!(body.get("details").is_none());
        assert!(body.get("error_type").is_none());
    }
}
