use axum::extract::{Path, State};
use axum::Json;
use common_http_errors::ApiError;
use common_security::{ensure_capability, Capability, SecurityCtxExtractor};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::CheckoutError;
use crate::stock::{self, LedgerRefs, MovementType, StockLedgerEntry};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustRequest {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub delta: i32,
    pub movement_type: MovementType,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustResponse {
    pub variant_id: Uuid,
    pub remaining: i32,
}

/// POST /stock/adjust - manual stocking and corrections. SALE movements are
/// reserved for checkout; manual callers pick from the other kinds.
pub async fn adjust_stock(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Json(req): Json<StockAdjustRequest>,
) -> Result<Json<StockAdjustResponse>, ApiError> {
    ensure_capability(&ctx, Capability::StockAdjust)?;
    if req.movement_type == MovementType::Sale {
        return Err(CheckoutError::validation(
            "invalid_movement_type",
            "SALE movements are recorded by checkout, not manual adjustment",
        )
        .into());
    }

    let remaining = stock::adjust(
        &state.db,
        req.product_id,
        req.variant_id,
        req.delta,
        req.movement_type,
        LedgerRefs::default(),
    )
    .await
    .map_err(ApiError::from)?;

    info!(variant_id = %req.variant_id, delta = req.delta,
          movement = req.movement_type.as_str(), actor = %ctx.user_id, "stock adjusted");
    Ok(Json(StockAdjustResponse { variant_id: req.variant_id, remaining }))
}

/// GET /stock/variants/:variant_id/ledger - full movement history, oldest
/// first, for reconciliation against the cached counter.
pub async fn variant_ledger(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(variant_id): Path<Uuid>,
) -> Result<Json<Vec<StockLedgerEntry>>, ApiError> {
    ensure_capability(&ctx, Capability::LedgerView)?;
    let entries =
        stock::ledger_for_variant(&state.db, variant_id).await.map_err(ApiError::from)?;
    Ok(Json(entries))
}
