use axum::{
    extract::{Path, State},
    Extension, Json,
};
use supplydesk_core::SupplierPerformance;

use crate::middleware::RequestId;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState};

/// GET /api/v1/suppliers/{supplier_id}/performance
///
/// `supplier_id` is the directory id, or the phone number for suppliers the
/// directory does not know.
pub(super) async fn supplier_performance(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(supplier_id): Path<String>,
) -> Result<Json<ApiResponse<SupplierPerformance>>, ApiError> {
    let data = supplydesk_pipeline::supplier_performance(&state.pipeline, &supplier_id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(data, req_id))
}
