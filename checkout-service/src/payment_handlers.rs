use axum::{extract::State, Json};
use bigdecimal::BigDecimal;
use common_http_errors::ApiError;
use common_security::{ensure_capability, Capability, SecurityCtxExtractor};
use common_signature::verify_payment_signature;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::CheckoutError;
use crate::gateway::CreateGatewayOrder;
use crate::orders::{self, CartLine, CheckoutDraft, GatewayRefs};
use crate::pricing::{self, EffectivePrice};
use crate::settlement;

/// GET /pricing/variants/:variant_id - the unit price the caller would be
/// charged right now (retailer-linked override or standard customer price).
pub async fn effective_price(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    axum::extract::Path(variant_id): axum::extract::Path<Uuid>,
) -> Result<Json<EffectivePrice>, ApiError> {
    ensure_capability(&ctx, Capability::CheckoutPay)?;
    let price = pricing::resolve_effective_price(&state.db, variant_id, Some(ctx.user_id))
        .await
        .map_err(ApiError::from)?;
    Ok(Json(price))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub amount: BigDecimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub notes: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct CreateOrderResponse {
    pub order: GatewayOrderBody,
}

#[derive(Serialize)]
pub struct GatewayOrderBody {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// POST /payments/create-order - open a payment order on the gateway for the
/// client checkout flow. Nothing is written locally; the order materializes
/// only on verification or via the pre-payment checkout variant.
pub async fn create_gateway_order(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    ensure_capability(&ctx, Capability::CheckoutPay)?;

    let mut spec = CreateGatewayOrder::new(req.amount);
    if let Some(currency) = req.currency {
        spec.currency = currency;
    }
    spec.receipt = req.receipt;
    if let Some(notes) = req.notes {
        spec.notes = notes;
    }

    let order = state.gateway.create_order(spec).await.map_err(ApiError::from)?;
    info!(user_id = %ctx.user_id, gateway_order = %order.id, "gateway order opened");
    Ok(Json(CreateOrderResponse {
        order: GatewayOrderBody {
            id: order.id,
            amount: order.amount_minor,
            currency: order.currency,
        },
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: String,
    #[serde(default)]
    pub cart_items: Option<Vec<CartLine>>,
    #[serde(default)]
    pub shipping_address_id: Option<Uuid>,
    #[serde(default)]
    pub retailer_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub order_id: Uuid,
    pub payment_id: Uuid,
}

/// POST /payments/verify - the client returns from the gateway with a
/// signature over `order_id|payment_id`. On a valid signature the order
/// materializes CONFIRMED/PAID and the revenue split posts in the same
/// request; on a mismatch a zero-amount FAILED pair is recorded for audit
/// and the caller gets 422.
pub async fn verify_payment(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    ensure_capability(&ctx, Capability::CheckoutPay)?;

    let refs = GatewayRefs {
        order_ref: req.gateway_order_id.clone(),
        payment_ref: req.gateway_payment_id.clone(),
    };

    if !verify_payment_signature(
        &state.key_secret,
        &req.gateway_order_id,
        &req.gateway_payment_id,
        &req.gateway_signature,
    ) {
        warn!(user_id = %ctx.user_id, gateway_order = %req.gateway_order_id,
              "payment signature mismatch");
        // Audit trail only; a failure here must not mask the 422.
        if let Err(err) = orders::create_failed_order(&state.db, ctx.user_id, &refs).await {
            warn!(error = %err, "could not record failed payment attempt");
        }
        return Err(CheckoutError::SignatureVerification.into());
    }

    let lines = match req.cart_items {
        Some(lines) if !lines.is_empty() => lines,
        _ => orders::cart_lines_for_user(&state.db, ctx.user_id)
            .await
            .map_err(ApiError::from)?,
    };

    let (order, payment) = orders::create_paid_order(
        &state.db,
        ctx.user_id,
        req.retailer_id,
        req.shipping_address_id,
        &lines,
        &refs,
    )
    .await
    .map_err(ApiError::from)?;

    if let Err(err) = settlement::post_settlement(&state.db, order.id).await {
        // The order is committed as paid but the ledger rows are not. This
        // is the divergence operators page on; the ids here are what
        // reconciliation needs.
        error!(order_id = %order.id, payment_id = %payment.id, error = %err,
               "order paid but settlement failed; ledger needs reconciliation");
        return Err(err.into());
    }

    info!(order_id = %order.id, payment_id = %payment.id, user_id = %ctx.user_id,
          "payment verified and settled");
    Ok(Json(VerifyPaymentResponse { order_id: order.id, payment_id: payment.id }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub shipping_address_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    #[serde(flatten)]
    pub draft: CheckoutDraft,
    pub gateway_order: GatewayOrderBody,
}

/// POST /checkout/create-order - pre-payment checkout: materialize the order
/// from the server-side cart (stock decremented, cart cleared), then open the
/// matching gateway order and link it to the draft.
pub async fn checkout_create_order(
    State(state): State<AppState>,
    SecurityCtxExtractor(ctx): SecurityCtxExtractor,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    ensure_capability(&ctx, Capability::CheckoutPay)?;

    let draft = orders::create_checkout_order(&state.db, ctx.user_id, req.shipping_address_id)
        .await
        .map_err(ApiError::from)?;

    let gateway_order = state
        .gateway
        .create_order(CreateGatewayOrder::new(draft.amount.clone()))
        .await
        .map_err(ApiError::from)?;
    orders::set_gateway_order_ref(&state.db, draft.order_id, &gateway_order.id)
        .await
        .map_err(ApiError::from)?;

    info!(order_id = %draft.order_id, gateway_order = %gateway_order.id,
          "checkout order awaiting payment");
    Ok(Json(CheckoutResponse {
        draft,
        gateway_order: GatewayOrderBody {
            id: gateway_order.id,
            amount: gateway_order.amount_minor,
            currency: gateway_order.currency,
        },
    }))
}
