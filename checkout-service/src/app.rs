use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method, StatusCode,
};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::gateway::PaymentGateway;
use crate::payment_handlers::{
    checkout_create_order, create_gateway_order, effective_price, verify_payment,
};
use crate::refund_handlers::{
    list_all_refunds, list_my_refunds, list_refunds_for_review, process_refund, request_refund,
    review_refund,
};
use crate::stock_handlers::{adjust_stock, variant_ledger};
use crate::webhook_handlers::handle_payment_webhook;

pub static CHECKOUT_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static HTTP_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let v = IntCounterVec::new(
        Opts::new("http_errors_total", "Count of HTTP error responses emitted (status >= 400)"),
        &["service", "code", "status"],
    )
    .unwrap();
    CHECKOUT_REGISTRY.register(Box::new(v.clone())).ok();
    v
});

pub async fn http_error_metrics(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code =
            resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()).unwrap_or("unknown");
        HTTP_ERRORS_TOTAL
            .with_label_values(&["checkout-service", code, status.as_str()])
            .inc();
    }
    resp
}

pub async fn health() -> &'static str {
    "ok"
}

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub gateway: Arc<dyn PaymentGateway>,
    /// Gateway API key secret, the HMAC key for client checkout signatures.
    pub key_secret: String,
    /// Separate secret for webhook delivery signatures.
    pub webhook_secret: String,
}

pub fn build_router(state: AppState) -> Router {
    let allowed_origins = [
        "http://localhost:3000",
        "http://localhost:3001",
        "http://localhost:5173",
    ];
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()).collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-roles"),
            HeaderName::from_static("x-trace-id"),
        ]);

    async fn metrics() -> (StatusCode, String) {
        let encoder = TextEncoder::new();
        let families = CHECKOUT_REGISTRY.gather();
        let mut buf = Vec::new();
        if let Err(e) = encoder.encode(&families, &mut buf) {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("metrics encode error: {e}"));
        }
        (StatusCode::OK, String::from_utf8_lossy(&buf).to_string())
    }

    Router::new()
        .route("/healthz", get(health))
        .route("/payments/create-order", post(create_gateway_order))
        .route("/payments/verify", post(verify_payment))
        .route("/payments/webhook", post(handle_payment_webhook))
        .route("/checkout/create-order", post(checkout_create_order))
        .route("/pricing/variants/:variant_id", get(effective_price))
        .route("/refunds/request", post(request_refund))
        .route("/refunds/my", get(list_my_refunds))
        .route("/refunds/review", get(list_refunds_for_review))
        .route("/refunds/admin", get(list_all_refunds))
        .route("/refunds/:refund_id/status", put(review_refund))
        .route("/refunds/:refund_id/process", put(process_refund))
        .route("/stock/adjust", post(adjust_stock))
        .route("/stock/variants/:variant_id/ledger", get(variant_ledger))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(cors)
        .layer(middleware::from_fn(http_error_metrics))
}
