use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::resolver::SourceUrlError;
use crate::upstream::FetchError;

/// Failure classes surfaced to API clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Your IP is banned from this service.")]
    Banned,
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Upstream(#[from] FetchError),
    /// Detail is logged, never returned.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Banned => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(FetchError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wrap a store failure, keeping the detail for the log.
    pub fn internal(context: &str, err: &anyhow::Error) -> Self {
        Self::Internal(format!("{context}: {err:#}"))
    }
}

impl From<SourceUrlError> for ApiError {
    fn from(err: SourceUrlError) -> Self {
        Self::InvalidInput(err.message().to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidInput(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Upstream(e) => json!({
                "success": false,
                "error": e.reason(),
                "code": e.code(),
            }),
            Self::Internal(detail) => {
                tracing::error!(detail = %detail, "Internal error");
                json!({ "success": false, "error": "Internal server error" })
            }
            other => json!({ "success": false, "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Banned.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Upstream(FetchError::Timeout).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::Upstream(FetchError::Status(429)).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Internal("db down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_source_url_error_is_invalid_input() {
        let err = ApiError::from(SourceUrlError::UnsupportedHost);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("twitter.com or x.com"));
    }
}
