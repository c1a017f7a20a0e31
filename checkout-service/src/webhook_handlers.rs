use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use bigdecimal::BigDecimal;
use common_http_errors::ApiError;
use common_money::nearly_equal;
use common_signature::verify_webhook_signature;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::error::CheckoutError;
use crate::idempotency;
use crate::orders;
use crate::settlement;

#[derive(Deserialize)]
struct WebhookEvent {
    id: String,
    event: String,
    #[serde(default)]
    data: WebhookData,
}

#[derive(Deserialize, Default)]
struct WebhookData {
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    payment_ref: Option<String>,
    /// Captured amount in gateway minor units, when the gateway sends it.
    #[serde(default)]
    amount: Option<i64>,
}

/// POST /payments/webhook - gateway delivery endpoint. The signature covers
/// the raw body bytes, so verification happens before any parse result is
/// trusted. Processing order on success paths:
///
///   1. already-processed event ids ack immediately,
///   2. side effects commit,
///   3. only then is the event id marked processed.
///
/// A crash between 2 and 3 means the retry re-enters settlement and stops at
/// its double-post guard, which we ack - effects happen exactly once.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers
        .get("X-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized { code: "sig_missing", trace_id: None })?;

    if !verify_webhook_signature(&state.webhook_secret, &body, signature) {
        warn!("webhook signature mismatch");
        return Err(ApiError::Unauthorized { code: "sig_mismatch", trace_id: None });
    }

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|err| {
        warn!(error = %err, "webhook payload not parseable");
        ApiError::BadRequest { code: "invalid_payload", trace_id: None, message: None }
    })?;
    if event.id.is_empty() {
        return Err(ApiError::BadRequest {
            code: "missing_event_id",
            trace_id: None,
            message: None,
        });
    }

    if idempotency::is_processed(&state.db, &event.id).await.map_err(ApiError::from)? {
        info!(event_id = %event.id, "webhook replay acknowledged");
        return Ok(Json(json!({ "received": true })));
    }

    match event.event.as_str() {
        "payment.captured" | "payment.succeeded" => {
            let order = resolve_order(&state, &event).await?;
            if let Some(minor) = event.data.amount {
                let captured = BigDecimal::from(minor) / BigDecimal::from(100);
                if !nearly_equal(&order.total_amount, &captured, 0) {
                    error!(order_id = %order.id, event_id = %event.id,
                           captured_minor = minor, expected = %order.total_amount,
                           "captured amount does not match order total; refusing settlement");
                    return Err(ApiError::Unprocessable {
                        code: "amount_mismatch",
                        trace_id: None,
                        message: None,
                    });
                }
            }
            match settlement::post_settlement(&state.db, order.id).await {
                Ok(()) => {}
                // Settled by the synchronous verify path or an earlier
                // delivery; the webhook still acks.
                Err(CheckoutError::Conflict { code: "settlement_already_posted" }) => {
                    info!(order_id = %order.id, event_id = %event.id,
                          "settlement already posted; acknowledging");
                }
                Err(err) => {
                    error!(order_id = %order.id, event_id = %event.id, error = %err,
                           "captured payment did not settle; ledger needs reconciliation");
                    return Err(err.into());
                }
            }
        }
        "payment.failed" => {
            let order = resolve_order(&state, &event).await?;
            orders::mark_payment_failed(&state.db, order.id, event.data.payment_ref.as_deref())
                .await
                .map_err(ApiError::from)?;
            info!(order_id = %order.id, event_id = %event.id, "payment marked failed");
        }
        other => {
            info!(event = other, event_id = %event.id, "ignoring unhandled webhook event");
            return Ok(Json(json!({ "received": true })));
        }
    }

    match idempotency::mark_processed(&state.db, &event.id).await {
        Ok(()) => {}
        // Lost the race to a concurrent delivery whose effects also landed.
        Err(CheckoutError::Conflict { .. }) => {
            warn!(event_id = %event.id, "event marked processed concurrently");
        }
        // Effects committed but the mark did not: leave the event unmarked
        // and fail so the gateway redelivers into the settlement guard.
        Err(err) => {
            error!(event_id = %event.id, error = %err,
                   "webhook effects committed but event not marked processed");
            return Err(err.into());
        }
    }

    Ok(Json(json!({ "received": true })))
}

async fn resolve_order(state: &AppState, event: &WebhookEvent) -> Result<orders::Order, ApiError> {
    let gateway_ref = event.data.order_id.as_deref().ok_or(ApiError::BadRequest {
        code: "missing_order_ref",
        trace_id: None,
        message: None,
    })?;
    orders::order_by_gateway_ref(&state.db, gateway_ref).await.map_err(ApiError::from)
}
