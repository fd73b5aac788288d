//! Supply-chain transaction handlers
//!
//! Each route submits one contract transaction as the organization that
//! owns that step of the chain.

use axum::{extract::State, Json};
use kopi_core::Organization;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::{or_default, scalar_or_default, AppState, Scalar, WriteJson, WriteResponse};
use crate::api::error::WriteError;

/// Pickup point used when a local transport omits its location
pub const DEFAULT_PICKUP_GEO: &str = "-6.200, 106.816";
/// Port of origin used when a shipment omits its location
pub const DEFAULT_ORIGIN_PORT_GEO: &str = "-6.102, 106.880";
/// Destination used when an import confirmation omits its location
pub const DEFAULT_DESTINATION_GEO: &str = "35.689, 139.691";
/// Final quality score used when an import confirmation omits it
pub const DEFAULT_FINAL_SCORE: &str = "80";

async fn submit(
    state: &AppState,
    organization: Organization,
    transaction: &str,
    args: Vec<String>,
) -> Result<(), WriteError> {
    state
        .sessions
        .submit(organization.user_identity(), transaction, &args)
        .await?;
    Ok(())
}

// =============================================================================
// Farmer
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchRequest {
    pub id: String,
    pub petani: String,
    pub geo: String,
    pub nama_lokasi: String,
    pub jenis: String,
    pub harga: Scalar,
}

/// POST /api/create
///
/// Records a harvested batch.
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    WriteJson(request): WriteJson<CreateBatchRequest>,
) -> Result<Json<WriteResponse>, WriteError> {
    info!(batch_id = %request.id, "Recording harvest");

    submit(
        &state,
        Organization::Farmer,
        "CreateBatch",
        vec![
            request.id.clone(),
            request.petani,
            request.geo,
            request.nama_lokasi,
            request.jenis,
            request.harga.to_string(),
        ],
    )
    .await?;

    Ok(Json(WriteResponse::ok(format!(
        "Batch {} Panen Berhasil Dicatat!",
        request.id
    ))))
}

// =============================================================================
// Logistics
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportLokalRequest {
    pub id: String,
    pub supir: String,
    pub plat: String,
    pub suhu: Scalar,
    #[serde(default)]
    pub current_geo: Option<String>,
}

/// POST /api/transport-lokal
pub async fn transport_lokal(
    State(state): State<Arc<AppState>>,
    WriteJson(request): WriteJson<TransportLokalRequest>,
) -> Result<Json<WriteResponse>, WriteError> {
    submit(
        &state,
        Organization::Logistics,
        "TransportToWarehouse",
        vec![
            request.id,
            request.supir,
            request.plat,
            request.suhu.to_string(),
            or_default(request.current_geo, DEFAULT_PICKUP_GEO),
        ],
    )
    .await?;

    Ok(Json(WriteResponse::ok("Logistik Lokal Dimulai.")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartShipmentRequest {
    pub id: String,
    pub kapal: String,
    pub kontainer: String,
    pub suhu: Scalar,
    #[serde(default)]
    pub origin_geo: Option<String>,
}

/// POST /api/start-shipment
pub async fn start_shipment(
    State(state): State<Arc<AppState>>,
    WriteJson(request): WriteJson<StartShipmentRequest>,
) -> Result<Json<WriteResponse>, WriteError> {
    submit(
        &state,
        Organization::Logistics,
        "StartExportShipment",
        vec![
            request.id,
            request.kapal,
            request.kontainer,
            request.suhu.to_string(),
            or_default(request.origin_geo, DEFAULT_ORIGIN_PORT_GEO),
        ],
    )
    .await?;

    Ok(Json(WriteResponse::ok("Pengiriman Ekspor Dimulai.")))
}

#[derive(Debug, Deserialize)]
pub struct AddCheckpointRequest {
    pub id: String,
    pub location: String,
    pub geo: String,
    pub activity: String,
}

/// POST /api/add-checkpoint
pub async fn add_checkpoint(
    State(state): State<Arc<AppState>>,
    WriteJson(request): WriteJson<AddCheckpointRequest>,
) -> Result<Json<WriteResponse>, WriteError> {
    let message = format!("Checkpoint {} ditambahkan.", request.location);

    submit(
        &state,
        Organization::Logistics,
        "AddCheckpoint",
        vec![request.id, request.location, request.geo, request.activity],
    )
    .await?;

    Ok(Json(WriteResponse::ok(message)))
}

// =============================================================================
// Cooperative
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ReceiveWarehouseRequest {
    pub id: String,
    pub nama: String,
    pub kota: String,
    pub geo: String,
}

/// POST /api/receive-warehouse
pub async fn receive_warehouse(
    State(state): State<Arc<AppState>>,
    WriteJson(request): WriteJson<ReceiveWarehouseRequest>,
) -> Result<Json<WriteResponse>, WriteError> {
    submit(
        &state,
        Organization::Cooperative,
        "ReceiveAtWarehouse",
        vec![request.id, request.nama, request.kota, request.geo],
    )
    .await?;

    Ok(Json(WriteResponse::ok("Diterima di Gudang.")))
}

#[derive(Debug, Deserialize)]
pub struct ProcessQcRequest {
    pub id: String,
    pub metode: String,
    pub skor: Scalar,
    pub residu: String,
    pub berat: Scalar,
}

/// POST /api/process-qc
pub async fn process_qc(
    State(state): State<Arc<AppState>>,
    WriteJson(request): WriteJson<ProcessQcRequest>,
) -> Result<Json<WriteResponse>, WriteError> {
    submit(
        &state,
        Organization::Cooperative,
        "ProcessAndQC",
        vec![
            request.id,
            request.metode,
            request.skor.to_string(),
            request.residu,
            request.berat.to_string(),
        ],
    )
    .await?;

    Ok(Json(WriteResponse::ok("QC Selesai.")))
}

// =============================================================================
// Regulator
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ApproveExportRequest {
    pub id: String,
    pub dokumen: String,
    pub keputusan: String,
}

/// POST /api/approve-export
pub async fn approve_export(
    State(state): State<Arc<AppState>>,
    WriteJson(request): WriteJson<ApproveExportRequest>,
) -> Result<Json<WriteResponse>, WriteError> {
    let message = format!("Keputusan Regulator: {}", request.keputusan);

    submit(
        &state,
        Organization::Regulator,
        "ApproveExport",
        vec![request.id, request.dokumen, request.keputusan],
    )
    .await?;

    Ok(Json(WriteResponse::ok(message)))
}

// =============================================================================
// Importer
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmImportRequest {
    pub id: String,
    pub importir: String,
    #[serde(default)]
    pub dest_geo: Option<String>,
    #[serde(default)]
    pub skor_akhir: Option<Scalar>,
}

/// POST /api/confirm-import
pub async fn confirm_import(
    State(state): State<Arc<AppState>>,
    WriteJson(request): WriteJson<ConfirmImportRequest>,
) -> Result<Json<WriteResponse>, WriteError> {
    let final_score = scalar_or_default(request.skor_akhir.as_ref(), DEFAULT_FINAL_SCORE);

    submit(
        &state,
        Organization::Importer,
        "ConfirmImport",
        vec![
            request.id,
            request.importir,
            or_default(request.dest_geo, DEFAULT_DESTINATION_GEO),
            final_score.clone(),
        ],
    )
    .await?;

    Ok(Json(WriteResponse::ok(format!(
        "Import Selesai. QC Final: {}",
        final_score
    ))))
}
