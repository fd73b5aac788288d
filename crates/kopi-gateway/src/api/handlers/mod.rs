//! API request handlers
//!
//! Every handler opens its own session as the identity its route is bound
//! to, performs exactly one ledger call and releases the session.

pub mod batches;
pub mod supply;
pub mod wallet;

pub use batches::{all_batches, batch_by_id};
pub use supply::{
    add_checkpoint, approve_export, confirm_import, create_batch, process_qc, receive_warehouse,
    start_shipment, transport_lokal, AddCheckpointRequest, ApproveExportRequest,
    ConfirmImportRequest, CreateBatchRequest, ProcessQcRequest, ReceiveWarehouseRequest,
    StartShipmentRequest, TransportLokalRequest,
};
pub use wallet::{init_wallet, wallet_balance};

use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::api::error::{ApiError, WriteError};
use crate::listener::EventListener;
use crate::session::SessionManager;

/// Shared application state
pub struct AppState {
    /// Opens identity-scoped ledger sessions
    pub sessions: SessionManager,
    /// Process-wide contract event listener
    pub listener: EventListener,
}

/// Success body of every transaction endpoint
#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub success: bool,
    pub message: String,
}

impl WriteResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// JSON request body for transaction endpoints
///
/// Unparseable bodies and missing fields answer in the same
/// `{"success": false, "error": ...}` shape as a failed transaction.
#[derive(Debug)]
pub struct WriteJson<T>(pub T);

impl<S, T> FromRequest<S> for WriteJson<T>
where
    Json<T>: FromRequest<S, Rejection = axum::extract::rejection::JsonRejection>,
    S: Send + Sync,
{
    type Rejection = WriteError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let uri = req.uri().clone();
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                warn!(uri = %uri, error = %rejection.body_text(), "Rejected request body");
                Err(WriteError(ApiError::InvalidBody(rejection.body_text())))
            }
        }
    }
}

/// A body field clients may send as either a JSON number or a string
///
/// Contract arguments are strings, so both forms are passed on in their
/// textual representation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

impl Scalar {
    fn is_blank(&self) -> bool {
        matches!(self, Scalar::Text(s) if s.is_empty())
            || matches!(self, Scalar::Number(n) if n.as_f64() == Some(0.0))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// Use `default` when a field is missing or blank
pub(crate) fn or_default(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Textual form of an optional scalar, or `default` when missing or blank
pub(crate) fn scalar_or_default(value: Option<&Scalar>, default: &str) -> String {
    match value {
        Some(scalar) if !scalar.is_blank() => scalar.to_string(),
        _ => default.to_string(),
    }
}
