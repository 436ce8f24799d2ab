use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error as ThisError;

/// Errors surfaced by the review service.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Input failed shape or range validation.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A referenced review or product does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The operation would duplicate existing state, e.g. a second review per user and product.
    #[error("{0}")]
    Conflict(String),
    /// The caller is not allowed to perform the operation, e.g. self-voting or a non-owner edit.
    #[error("{0}")]
    Forbidden(String),
    /// An external collaborator marked best-effort was unavailable.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// MongoDB I/O failed. Propagates so brokered events get redelivered.
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// HTTP status the error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Database(_) | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_expected_status_codes() {
        assert_eq!(
            Error::Validation("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::NotFound("missing".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::Conflict("duplicate".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Forbidden("denied".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::UpstreamUnavailable("down".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
