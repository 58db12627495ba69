//! OpenAPI documentation, served at `/api/openapi.json`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use cutout_core::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cutout API",
        version = "0.1.0",
        description = "Background removal service: upload an image, get it back without its background."
    ),
    paths(
        handlers::remove_background::remove_background,
        handlers::health::health_check,
    ),
    components(schemas(
        error::ErrorResponse,
        handlers::health::HealthResponse,
        models::OutputFormat,
    )),
    tags(
        (name = "background", description = "Background removal"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_endpoints() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/remove-background"));
        assert!(doc.paths.paths.contains_key("/health"));
    }
}
