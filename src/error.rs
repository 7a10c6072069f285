//! HTTP-boundary error handling.
//!
//! Domain errors are mapped to status codes here and nowhere else.
//! Repository failures always produce a generic body; their causes are
//! logged where they occur and never reach clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::LedgerError;

/// Application-wide Result type for HTTP handlers.
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Schema validation failure at the edge (malformed UUIDs, bad query
    /// parameters, undecodable bodies).
    #[error("{0}")]
    InvalidInput(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone())
            }
            AppError::Ledger(err) => {
                let status = match err {
                    LedgerError::InvariantViolation(_) => StatusCode::BAD_REQUEST,
                    LedgerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                    LedgerError::Forbidden(_) => StatusCode::FORBIDDEN,
                    LedgerError::LedgerNotFound(_) => StatusCode::NOT_FOUND,
                    LedgerError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = match err {
                    LedgerError::Repository(detail) => {
                        tracing::error!(detail = %detail, "request failed on repository error");
                        "Internal server error".to_owned()
                    }
                    other => other.to_string(),
                };
                (status, err.code(), message)
            }
        };

        (
            status,
            Json(ErrorBody {
                error: code.to_owned(),
                message,
            }),
        )
            .into_response()
    }
}
