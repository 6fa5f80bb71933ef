use axum::http::StatusCode;
use tracing::error;

use crate::ledger::LedgerError;
use crate::store::StoreError;

/// Rejection shape shared by every handler.
pub type ApiError = (StatusCode, String);

pub fn internal<E: std::fmt::Display>(e: E) -> ApiError {
    error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

pub fn bad_request(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, msg.into())
}

pub fn not_found(msg: impl Into<String>) -> ApiError {
    (StatusCode::NOT_FOUND, msg.into())
}

pub fn forbidden(msg: impl Into<String>) -> ApiError {
    (StatusCode::FORBIDDEN, msg.into())
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidPath { .. } => bad_request(e.to_string()),
            StoreError::TooManyRetries { .. } => {
                error!(error = %e, "store contention");
                (StatusCode::CONFLICT, "Too much contention, try again".into())
            }
            other => internal(other),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidAmount => bad_request("Please enter a valid amount"),
            LedgerError::UserNotFound => not_found("User not found"),
            LedgerError::Timestamp(inner) => internal(inner),
            LedgerError::Store(inner) => inner.into(),
        }
    }
}
