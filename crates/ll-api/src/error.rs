//! # HTTP Error Mapping
//!
//! Wraps the core `AppError` so handlers can use `?` and still produce
//! consistent JSON error bodies with the right status codes.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use ll_core::error::AppError;
use serde_json::json;

/// Newtype over `AppError`; actix's `ResponseError` is a foreign trait.
#[derive(Debug)]
pub struct ApiError(pub AppError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_, _) => StatusCode::NOT_FOUND,
            AppError::OutOfStock { .. } | AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::CodeNotFound(_)
            | AppError::CodeInactive(_)
            | AppError::CodeExpired(_)
            | AppError::BelowMinimum { .. }
            | AppError::UsesExceeded(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Payment(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("responding {status}: {}", self.0);
        }
        // Store/payment details stay in the log, not on the wire.
        let message = match &self.0 {
            AppError::Store(_) => "store operation failed".to_string(),
            AppError::Payment(_) => "payment provider error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(status).json(json!({ "error": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        let cases = [
            (AppError::Validation("bad".into()), 400),
            (AppError::Unauthorized("no token".into()), 401),
            (AppError::NotFound("order".into(), "x".into()), 404),
            (
                AppError::OutOfStock {
                    state: "CA".into(),
                    ad_type: "half".into(),
                    requested: 2,
                },
                409,
            ),
            (AppError::InvalidState(uuid::Uuid::nil()), 409),
            (AppError::CodeExpired("SUMMER".into()), 422),
            (
                AppError::BelowMinimum {
                    min_order_cents: 100,
                    subtotal_cents: 50,
                },
                422,
            ),
            (AppError::Store("db".into()), 500),
            (AppError::Payment("declined".into()), 502),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status_code().as_u16(), expected);
        }
    }

    #[test]
    fn store_errors_do_not_leak_details() {
        let resp = ApiError(AppError::Store("connection string with secrets".into()))
            .error_response();
        assert_eq!(resp.status().as_u16(), 500);
    }
}
