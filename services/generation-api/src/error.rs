//! Per-request error type and its HTTP mapping
//!
//! Every failure is rendered as `{"detail": "..."}`:
//! - validation problems → 422, unknown template / no image → 404
//! - no credential available → 503 (the client may retry later)
//! - provider failure → 502
//! - quarantine store failure → 500

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use provider::EngineError;
use thiserror::Error;

use crate::templates::TemplateError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Template '{0}' not found")]
    TemplateNotFound(String),

    #[error("No {0} credential available at the moment")]
    NoCredential(&'static str),

    #[error("Upstream provider failed: {0}")]
    Engine(#[from] EngineError),

    #[error("No image was generated; the prompt may have been blocked upstream")]
    NoImages,

    #[error("Credential store failure: {0}")]
    Store(#[from] key_pool::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TemplateNotFound(_) | ApiError::NoImages => StatusCode::NOT_FOUND,
            ApiError::NoCredential(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Engine(_) => StatusCode::BAD_GATEWAY,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TemplateError> for ApiError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound(name) => ApiError::TemplateNotFound(name),
            other => ApiError::Validation(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::Validation("bad".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::TemplateNotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::NoImages.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::NoCredential("text").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Engine(EngineError::Unavailable("down".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Store(key_pool::Error::Persistence("disk".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn template_errors_map_to_not_found_or_validation() {
        let err: ApiError = TemplateError::NotFound("haiku".into()).into();
        assert!(matches!(err, ApiError::TemplateNotFound(ref n) if n == "haiku"));

        let err: ApiError = TemplateError::UnexpectedArg("mood".into()).into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn renders_detail_body() {
        let response = ApiError::NoCredential("image").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "No image credential available at the moment");
    }
}
