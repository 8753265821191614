//! API Error Handling
//!
//! Structured error responses with HTTP status codes and request tracking.
//! Settlement failures keep their stable client code in the body.

use crate::settlement::SettlementError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code (INSUFFICIENT_FUNDS, HASHCHAIN_EXPIRED, NOT_FOUND, ...)
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Set when rotating the hashchain lets the caller retry
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub recoverable: bool,
}

/// API error with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    InternalError(String),
    Settlement(SettlementError),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    pub fn settlement(request_id: String, error: SettlementError) -> Self {
        Self {
            kind: ApiErrorKind::Settlement(error),
            request_id,
        }
    }
}

/// HTTP status for a settlement failure
pub fn settlement_status(error: &SettlementError) -> StatusCode {
    match error {
        SettlementError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        SettlementError::InvalidInput(_) | SettlementError::CurrencyNotFound(_) => {
            StatusCode::BAD_REQUEST
        }
        SettlementError::InsufficientFunds
        | SettlementError::HouseCannotAffordPayout
        | SettlementError::ChainTooOld
        | SettlementError::HashchainDrained => StatusCode::CONFLICT,
        SettlementError::OracleUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SettlementError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::InternalError(msg) => write!(f, "[{}] Internal Error: {}", self.request_id, msg),
            ApiErrorKind::Settlement(err) => write!(f, "[{}] {}: {}", self.request_id, err.code(), err),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, recoverable) = match &self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), false),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), false),
            ApiErrorKind::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
                false,
            ),
            ApiErrorKind::Settlement(err) => {
                // Ledger internals stay in the logs
                let message = match err {
                    SettlementError::Storage(_) => "Internal ledger error".to_string(),
                    other => other.to_string(),
                };
                (settlement_status(err), err.code(), message, err.is_recoverable())
            }
        };

        if status.is_server_error() {
            tracing::error!(request_id = %self.request_id, code, error = %self, "Request failed");
        }

        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message,
                recoverable,
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StorageError;

    #[test]
    fn test_settlement_status_mapping() {
        assert_eq!(
            settlement_status(&SettlementError::NotAuthenticated),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            settlement_status(&SettlementError::HashchainDrained),
            StatusCode::CONFLICT
        );
        assert_eq!(
            settlement_status(&SettlementError::Storage(StorageError::LockTimeout("row".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_recoverable_flag_serialization() {
        let body = ErrorBody {
            code: "INSUFFICIENT_FUNDS".to_string(),
            message: "Insufficient funds for wager".to_string(),
            recoverable: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("recoverable").is_none());

        let body = ErrorBody {
            recoverable: true,
            ..body
        };
        assert_eq!(serde_json::to_value(&body).unwrap()["recoverable"], true);
    }
}
