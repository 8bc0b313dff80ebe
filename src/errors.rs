use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Request cancelled: {0}")]
    RequestCancelled(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Stable code carried in the JSON error payload.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::PermissionDenied(_) => "permission_denied",
            AppError::Timeout(_) => "timeout",
            AppError::RequestCancelled(_) => "request_cancelled",
            AppError::ProviderUnavailable(_) => "provider_unavailable",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::DatabaseError(_) => "internal",
            AppError::Unknown(_) => "unknown",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code().to_string();
        let (status, message) = match &self {
            AppError::PermissionDenied(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg.clone()),
            AppError::RequestCancelled(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::ProviderUnavailable(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal database error".to_string(),
                )
            }
            AppError::Unknown(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        (
            status,
            axum::Json(ErrorResponse {
                code,
                error: message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(AppError::Timeout("t".into()).code(), "timeout");
        assert_eq!(AppError::NotFound("n".into()).code(), "not_found");
        assert_eq!(
            AppError::ProviderUnavailable("p".into()).code(),
            "provider_unavailable"
        );
        assert_eq!(
            AppError::RequestCancelled("c".into()).code(),
            "request_cancelled"
        );
    }
}
