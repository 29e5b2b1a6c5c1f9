//! Error types for the Store API.
//!
//! Maps domain and database errors onto HTTP statuses and the JSON error
//! envelope. Handlers return `ApiResult<T>` and let `?` do the lifting.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use tally_core::CoreError;
use tally_db::DbError;

/// Store API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Internal error");
        }

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
            "data": null,
        }));

        (status, body).into_response()
    }
}

/// Database-layer errors map by kind, never by string matching.
///
/// ```text
/// NotFound              → 404
/// UniqueViolation       → 409
/// Domain (rule said no) → 422
/// everything else       → 500
/// ```
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            DbError::UniqueViolation { .. } => ApiError::Conflict(err.to_string()),
            DbError::ForeignKeyViolation { .. } => ApiError::Unprocessable(err.to_string()),
            DbError::Domain(core) => core.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductUnavailable { .. }
            | CoreError::InvalidStatusTransition { .. }
            | CoreError::UnbalancedTotals { .. } => ApiError::Unprocessable(err.to_string()),
            CoreError::Validation(_)
            | CoreError::InvalidQuantity { .. }
            | CoreError::InvalidLine { .. }
            | CoreError::InvalidSettlementAmount { .. } => ApiError::BadRequest(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_error_mapping() {
        let err: ApiError = DbError::not_found("Order", "o-1").into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = DbError::UniqueViolation {
            field: "orders.external_reference".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err: ApiError = DbError::Domain(CoreError::InvalidQuantity { qty: 0 }).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = DbError::Domain(CoreError::ProductUnavailable {
            product: "SKU-1".into(),
            reason: "inactive".into(),
        })
        .into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
