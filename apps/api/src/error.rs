//! # API Errors
//!
//! Every failure leaves the server as `{"error": "<message>"}`.
//!
//! ```text
//! CoreError ─┐
//!            ├──► ApiError ──► (status, {"error": msg})
//! DbError ───┘
//!
//! 400  Validation, Parse, Auth, Forbidden, ReferenceNotFound, DuplicateNumber
//! 404  ArtifactMissing
//! 500  StockInsufficient, StockUpdate, Persistence, Artifact
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use apotek_core::CoreError;
use apotek_db::DbError;

/// Errors returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Payload breaks a field rule.
    #[error("{0}")]
    Validation(String),

    /// A quantity or date string could not be decoded.
    #[error("{0}")]
    Parse(String),

    /// Missing, malformed or expired bearer token; bad credentials.
    #[error("{0}")]
    Auth(String),

    /// Authenticated, but not allowed to do this.
    #[error("{0}")]
    Forbidden(String),

    /// Customer, invoice, medicine or prescription does not exist.
    #[error("{0}")]
    ReferenceNotFound(String),

    /// A live prescription already uses the number on that day.
    #[error("{0}")]
    DuplicateNumber(String),

    /// Requested quantity exceeds what is on hand.
    #[error("{0}")]
    StockInsufficient(String),

    /// The stock row could not be written.
    #[error("{0}")]
    StockUpdate(String),

    #[error("{0}")]
    Persistence(String),

    /// PDF rendering or file handling failed.
    #[error("{0}")]
    Artifact(String),

    /// A file named by the database is not on disk.
    #[error("{0}")]
    ArtifactMissing(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::Parse(_)
            | ApiError::Auth(_)
            | ApiError::Forbidden(_)
            | ApiError::ReferenceNotFound(_)
            | ApiError::DuplicateNumber(_) => StatusCode::BAD_REQUEST,
            ApiError::ArtifactMissing(_) => StatusCode::NOT_FOUND,
            ApiError::StockInsufficient(_)
            | ApiError::StockUpdate(_)
            | ApiError::Persistence(_)
            | ApiError::Artifact(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidQuantity { .. } | CoreError::InvalidDate { .. } => {
                ApiError::Parse(err.to_string())
            }
            CoreError::UnknownUnit { .. }
            | CoreError::UnknownEticketSize(_)
            | CoreError::Validation(_) => ApiError::Validation(err.to_string()),
            CoreError::InsufficientStock { .. } => ApiError::StockInsufficient(err.to_string()),
        }
    }
}

impl From<apotek_core::ValidationError> for ApiError {
    fn from(err: apotek_core::ValidationError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        if err.is_duplicate_prescription_number() {
            return ApiError::DuplicateNumber(
                "prescription number already exists on that day".to_string(),
            );
        }

        match err {
            DbError::NotFound { .. } => ApiError::ReferenceNotFound(err.to_string()),
            other => ApiError::Persistence(other.to_string()),
        }
    }
}

/// Result type for handlers and services.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use apotek_core::ValidationError;

    #[test]
    fn test_core_error_mapping() {
        let err: ApiError = CoreError::InvalidQuantity {
            input: "1/0".to_string(),
            reason: "division by zero".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::Parse(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = CoreError::UnknownUnit {
            medicine: "Amox".to_string(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = CoreError::InsufficientStock {
            medicine: "Amox".to_string(),
            available: 0.3,
            requested: 0.5,
        }
        .into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ApiError = ValidationError::required("number").into();
        assert!(matches!(err, ApiError::Validation(msg) if msg == "number is required"));
    }

    #[test]
    fn test_db_error_mapping() {
        let err: ApiError = DbError::duplicate("prescription.number, prescription.prescription_day", 7).into();
        assert!(matches!(err, ApiError::DuplicateNumber(_)));

        let err: ApiError = DbError::not_found("Prescription", 9).into();
        assert!(matches!(err, ApiError::ReferenceNotFound(_)));

        let err: ApiError = DbError::QueryFailed("disk I/O error".to_string()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::ArtifactMissing("p-abc.pdf not found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "p-abc.pdf not found");
    }
}
