//! HTTP error responses for authorization failures.
//!
//! Body shape: `{ "error": "<code>", "message": "<detail>" }`.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthzError;

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let status = status_for(&self);

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                category = %self.category(),
                "Authorization request failed"
            );
        }

        let message = if matches!(self, AuthzError::Internal { .. } | AuthzError::Storage { .. }) {
            "internal authorization error".to_string()
        } else {
            self.to_string()
        };
        let body = json!({
            "error": self.code(),
            "message": message,
        });

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// HTTP status for an error.
#[must_use]
pub fn status_for(error: &AuthzError) -> StatusCode {
    match error {
        AuthzError::NotFound { .. } => StatusCode::NOT_FOUND,
        AuthzError::Validation { .. } => StatusCode::BAD_REQUEST,
        AuthzError::Forbidden { .. } => StatusCode::FORBIDDEN,
        AuthzError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        AuthzError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AuthzError::Evaluation { source, .. } => match status_for(source) {
            StatusCode::SERVICE_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        AuthzError::Storage { .. }
        | AuthzError::Configuration { .. }
        | AuthzError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
