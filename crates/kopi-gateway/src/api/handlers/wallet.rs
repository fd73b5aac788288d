//! Digital wallet handlers

use axum::{
    extract::{Path, State},
    Json,
};
use kopi_core::Organization;
use serde_json::Value;
use std::sync::Arc;

use super::{AppState, WriteResponse};
use crate::api::error::{ApiError, WriteError};

/// POST /api/init-wallet
///
/// Seeds the importer and farmer wallets. Meant to run once per network.
pub async fn init_wallet(
    State(state): State<Arc<AppState>>,
) -> Result<Json<WriteResponse>, WriteError> {
    state
        .sessions
        .submit(Organization::Importer.user_identity(), "InitWallet", &[])
        .await?;

    Ok(Json(WriteResponse::ok(
        "Dompet Digital Berhasil Diinisialisasi (Importir: 10M, Petani: 0)",
    )))
}

/// GET /api/wallet/{msp_id}
///
/// Any organization may read any wallet, so this runs as the farmer.
pub async fn wallet_balance(
    State(state): State<Arc<AppState>>,
    Path(msp_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let payload = state
        .sessions
        .evaluate(
            Organization::Farmer.user_identity(),
            "GetWalletBalance",
            &[msp_id],
        )
        .await?;

    Ok(Json(serde_json::from_slice(&payload)?))
}
