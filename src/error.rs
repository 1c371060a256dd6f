//! Gateway-wide error taxonomy (spec §7) and its HTTP projection (spec §4.9, §6).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Unified error type returned by the reliability pipeline and route glue.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("validation error")]
    Validation(Vec<FieldError>),

    #[error("too many requests")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("request timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a [FieldError]>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "retryAfter")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "requestId")]
    request_id: Option<&'a str>,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::ProviderNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Timeout => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self, request_id: Option<&str>) -> ErrorBody<'_> {
        match self {
            GatewayError::Validation(details) => ErrorBody {
                error: "Validation error",
                details: Some(details),
                retry_after: None,
                request_id,
            },
            GatewayError::RateLimited { retry_after_secs } => ErrorBody {
                error: "Too many requests",
                details: None,
                retry_after: Some(*retry_after_secs),
                request_id,
            },
            GatewayError::ProviderNotFound(_) | GatewayError::Upstream(_) | GatewayError::Timeout => {
                ErrorBody { error: "Internal server error", details: None, retry_after: None, request_id }
            }
            GatewayError::Internal(_) => {
                ErrorBody { error: "Internal server error", details: None, retry_after: None, request_id }
            }
        }
    }

    /// Render the response the route glue (C9) emits, stamping the request
    /// ID into 500-class bodies per spec §6.
    pub fn into_response_with_request_id(self, request_id: &str) -> Response {
        let status = self.status();
        let request_id = (status == StatusCode::INTERNAL_SERVER_ERROR).then_some(request_id);
        (status, Json(self.body(request_id))).into_response()
    }
}

/// Fallback for errors that reach the outer handler without a request ID
/// attached (spec §4.9 step 4's "global error handler").
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(self.body(None))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        let err = GatewayError::Validation(vec![FieldError {
            field: "messages".into(),
            message: "must not be empty".into(),
        }]);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rate_limited_maps_to_429() {
        let err = GatewayError::RateLimited { retry_after_secs: 5 };
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn upstream_and_timeout_map_to_500() {
        assert_eq!(GatewayError::Upstream("boom".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(GatewayError::Timeout.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            GatewayError::ProviderNotFound("claude".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
