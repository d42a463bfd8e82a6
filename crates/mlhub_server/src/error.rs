//! HTTP mapping of core errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mlhub_core::MlHubError;

/// Wrapper so handlers can `?` on core results.
#[derive(Debug)]
pub struct AppError(pub MlHubError);

impl From<MlHubError> for AppError {
    fn from(e: MlHubError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let resp = AppError(MlHubError::Validation("empty aim path".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_maps_to_404() {
        let resp = AppError(MlHubError::ResourceNotExists("evaluate x".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn provisioning_maps_to_bad_gateway() {
        let resp = AppError(MlHubError::provisioning("down")).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
