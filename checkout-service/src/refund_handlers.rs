use axum::extract::{Path, State};
use axum::Json;
use bigdecimal::BigDecimal;
use common_http_errors::ApiError;
use common_security::{ensure_capability, Capability, SecurityCtxExtractor};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::refunds::{self, RefundAction, RefundRequest, RefundStatus};

#[derive(Deserialize)]
pub struct RefundListFilter {
    #[serde(default)]
    pub status: Option<RefundStatus>,
}

/// GET /refunds/my - a customer's own refund requests.
pub async fn list_my_refunds(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
) -> Result<Json<Vec<RefundRequest>>, ApiError> {
    ensure_capability(&ctx, Capability::RefundRequest)?;
    let refunds = refunds::list_for_customer(&state.db, ctx.user_id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(refunds))
}

/// GET /refunds/review - requests against orders carrying the retailer's
/// products, optionally filtered by status.
pub async fn list_refunds_for_review(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    axum::extract::Query(filter): axum::extract::Query<RefundListFilter>,
) -> Result<Json<Vec<RefundRequest>>, ApiError> {
    ensure_capability(&ctx, Capability::RefundReview)?;
    let refunds = refunds::list_for_retailer(&state.db, ctx.user_id, filter.status)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(refunds))
}

/// GET /refunds/admin - all requests, optionally filtered by status.
pub async fn list_all_refunds(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    axum::extract::Query(filter): axum::extract::Query<RefundListFilter>,
) -> Result<Json<Vec<RefundRequest>>, ApiError> {
    ensure_capability(&ctx, Capability::RefundProcess)?;
    let refunds =
        refunds::list_all(&state.db, filter.status).await.map_err(ApiError::from)?;
    Ok(Json(refunds))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRefundRequest {
    pub order_id: Uuid,
    pub reason: String,
    #[serde(default)]
    pub amount: Option<BigDecimal>,
}

/// POST /refunds/request - customer opens a refund request against one of
/// their delivered orders. Amount defaults to the order total.
pub async fn request_refund(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Json(req): Json<CreateRefundRequest>,
) -> Result<Json<RefundRequest>, ApiError> {
    ensure_capability(&ctx, Capability::RefundRequest)?;
    let refund = refunds::create_refund_request(
        &state.db,
        req.order_id,
        ctx.user_id,
        &req.reason,
        req.amount,
    )
    .await
    .map_err(ApiError::from)?;
    Ok(Json(refund))
}

#[derive(Deserialize)]
pub struct ReviewRefundRequest {
    pub status: RefundStatus,
    #[serde(default)]
    pub notes: String,
}

/// PUT /refunds/:refund_id/status - retailer review. Only retailers with a
/// product in the refunded order may act, and only PENDING -> APPROVED or
/// -> REJECTED are accepted.
pub async fn review_refund(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(refund_id): Path<Uuid>,
    Json(req): Json<ReviewRefundRequest>,
) -> Result<Json<RefundRequest>, ApiError> {
    ensure_capability(&ctx, Capability::RefundReview)?;
    let refund =
        refunds::update_refund_status(&state.db, refund_id, ctx.user_id, req.status, &req.notes)
            .await
            .map_err(ApiError::from)?;
    Ok(Json(refund))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRefundRequest {
    pub action: RefundAction,
    #[serde(default)]
    pub payment_notes: String,
}

/// PUT /refunds/:refund_id/process - admin completes (gateway refund, order
/// to REFUNDED) or rejects the request.
pub async fn process_refund(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Path(refund_id): Path<Uuid>,
    Json(req): Json<ProcessRefundRequest>,
) -> Result<Json<RefundRequest>, ApiError> {
    ensure_capability(&ctx, Capability::RefundProcess)?;
    let refund = refunds::process_refund(
        &state.db,
        state.gateway.as_ref(),
        refund_id,
        ctx.user_id,
        req.action,
        &req.payment_notes,
    )
    .await
    .map_err(ApiError::from)?;
    Ok(Json(refund))
}
