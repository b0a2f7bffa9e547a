//! Mapping of [`TripError`] onto HTTP responses.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{ErrorCategory, TripError};

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl TripError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        if let TripError::BadRequest(_) = self {
            return StatusCode::BAD_REQUEST;
        }
        match self.category() {
            ErrorCategory::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCategory::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        if let TripError::BadRequest(_) = self {
            return "BAD_REQUEST";
        }
        match self.category() {
            ErrorCategory::RateLimited => "RATE_LIMITED",
            ErrorCategory::Unauthenticated => "UNAUTHENTICATED",
            ErrorCategory::NotFound => "NOT_FOUND",
            ErrorCategory::Validation => "VALIDATION_ERROR",
            ErrorCategory::Conflict => "CONFLICT",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::Internal => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for TripError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if self.category() == ErrorCategory::Internal {
            error!(error = %self, "Request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            code: self.error_code().to_string(),
            message,
        };
        let mut response = (status, Json(body)).into_response();

        if let TripError::RateLimited { retry_after } = self {
            // Whole seconds, rounded up and never zero
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                TripError::RateLimited { retry_after: std::time::Duration::from_secs(1) },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (TripError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (TripError::NotFound, StatusCode::NOT_FOUND),
            (TripError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (TripError::validation("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (TripError::conflict("x"), StatusCode::CONFLICT),
            (TripError::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (TripError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
            (TripError::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{}", err);
        }
    }

    #[tokio::test]
    async fn test_internal_detail_not_exposed() {
        let response = TripError::internal("disk on fire at /var/lib/db").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, "INTERNAL_ERROR");
        assert_eq!(body.message, "internal server error");
    }

    #[test]
    fn test_retry_after_header_rounds_up() {
        let err = TripError::RateLimited {
            retry_after: std::time::Duration::from_millis(1500),
        };
        let response = err.into_response();
        assert_eq!(response.headers()[RETRY_AFTER], "2");

        let err = TripError::RateLimited {
            retry_after: std::time::Duration::from_millis(100),
        };
        assert_eq!(err.into_response().headers()[RETRY_AFTER], "1");
    }
}
