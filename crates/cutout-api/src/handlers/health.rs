use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub engine: String,
    /// Requests currently holding a registry entry.
    pub in_flight: usize,
    /// Files in the scratch directory; stays at zero between jobs.
    pub scratch_files: usize,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Scratch directory is unreadable", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut response = HealthResponse {
        status: "healthy".to_string(),
        engine: state.pipeline.engine_name().to_string(),
        in_flight: state.registry.len(),
        scratch_files: 0,
    };

    let status_code = match state.pipeline.store().list_scratch().await {
        Ok(files) => {
            response.scratch_files = files.len();
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(error = %e, "Scratch directory health check failed");
            response.status = format!("degraded: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    (status_code, Json(response))
}
