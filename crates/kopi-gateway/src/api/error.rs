//! API error types and responses
//!
//! Query endpoints answer failures with `{"error": ..., "code": ...}`.
//! Transaction endpoints wrap the same error in [`WriteError`], which adds
//! `"success": false` so clients can branch on one field for every write.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::session::SessionError;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request body was not valid JSON or missed a required field
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unrecognized identity: {0}")]
    UnrecognizedIdentity(String),

    #[error("Connection descriptor unavailable: {0}")]
    DescriptorUnavailable(String),

    #[error("Identity not provisioned: {0}")]
    IdentityNotProvisioned(String),

    #[error("Ledger error: {0}")]
    Ledger(String),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::InvalidBody(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INVALID_BODY",
                msg.clone(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
            ApiError::UnrecognizedIdentity(name) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "UNRECOGNIZED_IDENTITY",
                format!("Unrecognized identity: {}", name),
            ),
            ApiError::DescriptorUnavailable(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DESCRIPTOR_UNAVAILABLE",
                msg.clone(),
            ),
            ApiError::IdentityNotProvisioned(name) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IDENTITY_NOT_PROVISIONED",
                format!("Identity {} has not been provisioned. Run kopi-enroll first", name),
            ),
            ApiError::Ledger(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "LEDGER_ERROR", msg.clone()),
        }
    }

    fn respond(self, success: Option<bool>) -> Response {
        let (status, code, message) = self.parts();
        let body = ErrorResponse {
            success,
            error: message,
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.respond(None)
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UnrecognizedIdentity(name) => ApiError::UnrecognizedIdentity(name),
            SessionError::Descriptor(e) => ApiError::DescriptorUnavailable(e.to_string()),
            SessionError::IdentityNotProvisioned(name) => ApiError::IdentityNotProvisioned(name),
            SessionError::Storage(e) => ApiError::Internal(e.to_string()),
            SessionError::Ledger(e) => ApiError::Ledger(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("Ledger returned malformed JSON: {}", err))
    }
}

/// Error returned by transaction (write) endpoints
#[derive(Error, Debug)]
#[error(transparent)]
pub struct WriteError(#[from] pub ApiError);

impl From<SessionError> for WriteError {
    fn from(err: SessionError) -> Self {
        WriteError(err.into())
    }
}

impl IntoResponse for WriteError {
    fn into_response(self) -> Response {
        self.0.respond(Some(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kopi_fabric::LedgerError;

    #[test]
    fn test_session_error_mapping() {
        let err: ApiError = SessionError::IdentityNotProvisioned("PetaniUser".into()).into();
        let (status, code, message) = err.parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "IDENTITY_NOT_PROVISIONED");
        assert!(message.contains("kopi-enroll"));

        let err: ApiError = SessionError::Ledger(LedgerError::Transaction {
            transaction: "ReadBatch".into(),
            message: "batch B1 tidak ditemukan".into(),
        })
        .into();
        assert_eq!(err.parts().1, "LEDGER_ERROR");
    }

    #[test]
    fn test_write_error_marks_failure() {
        let response = WriteError(ApiError::Ledger("endorsement failed".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = ApiError::NotFound("Batch Not Found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
