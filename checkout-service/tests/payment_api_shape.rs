use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use sqlx::postgres::PgPoolOptions;
use tower::util::ServiceExt;
use uuid::Uuid;

use checkout_service::app::{build_router, AppState};
use checkout_service::gateway::StubGateway;

const KEY_SECRET: &str = "key_secret_test";

fn test_app() -> axum::Router {
    let db = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unreachable")
        .expect("lazy pool");
    build_router(AppState {
        db,
        gateway: Arc::new(StubGateway::new()),
        key_secret: KEY_SECRET.into(),
        webhook_secret: "whsec_test".into(),
    })
}

fn post_json(uri: &str, user: Option<(&str, &str)>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some((user_id, roles)) = user {
        builder = builder.header("X-User-ID", user_id).header("X-Roles", roles);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn create_order_requires_identity() {
    let resp = test_app()
        .oneshot(post_json(
            "/payments/create-order",
            None,
            serde_json::json!({"amount": "100.00"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    assert_eq!(
        resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()),
        Some("missing_user"),
    );
}

#[tokio::test]
async fn create_order_requires_checkout_capability() {
    let user = Uuid::new_v4().to_string();
    let resp = test_app()
        .oneshot(post_json(
            "/payments/create-order",
            Some((&user, "auditor")),
            serde_json::json!({"amount": "100.00"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn create_order_returns_gateway_order_in_minor_units() {
    let user = Uuid::new_v4().to_string();
    let resp = test_app()
        .oneshot(post_json(
            "/payments/create-order",
            Some((&user, "customer")),
            serde_json::json!({"amount": "499.50"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body = json_body(resp).await;
    assert_eq!(body["order"]["amount"], 49950);
    assert_eq!(body["order"]["currency"], "INR");
    assert!(body["order"]["id"].as_str().unwrap().starts_with("order_stub_"));
}

#[tokio::test]
async fn create_order_rejects_non_positive_amount() {
    let user = Uuid::new_v4().to_string();
    let resp = test_app()
        .oneshot(post_json(
            "/payments/create-order",
            Some((&user, "customer")),
            serde_json::json!({"amount": "0.00"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(
        resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()),
        Some("invalid_amount"),
    );
}

#[tokio::test]
async fn verify_with_bad_signature_is_unprocessable() {
    // The audit write fails on the unreachable pool; that must not mask the
    // verification outcome.
    let user = Uuid::new_v4().to_string();
    let resp = test_app()
        .oneshot(post_json(
            "/payments/verify",
            Some((&user, "customer")),
            serde_json::json!({
                "gatewayOrderId": "order_abc",
                "gatewayPaymentId": "pay_xyz",
                "gatewaySignature": "deadbeef",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
    let body = json_body(resp).await;
    assert_eq!(body["code"], "signature_verification_failed");
    let message = body["message"].as_str().unwrap_or_default();
    assert!(!message.contains("deadbeef"), "digest leaked into response: {message}");
}

#[tokio::test]
async fn verify_with_valid_signature_over_wrong_refs_is_unprocessable() {
    let user = Uuid::new_v4().to_string();
    let sig = common_signature::payment_signature(KEY_SECRET, "order_other", "pay_xyz").unwrap();
    let resp = test_app()
        .oneshot(post_json(
            "/payments/verify",
            Some((&user, "customer")),
            serde_json::json!({
                "gatewayOrderId": "order_abc",
                "gatewayPaymentId": "pay_xyz",
                "gatewaySignature": sig,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn refund_request_is_customer_only() {
    let user = Uuid::new_v4().to_string();
    let resp = test_app()
        .oneshot(post_json(
            "/refunds/request",
            Some((&user, "retailer")),
            serde_json::json!({"orderId": Uuid::new_v4(), "reason": "damaged"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn refund_process_is_admin_only() {
    let user = Uuid::new_v4().to_string();
    let req = Request::builder()
        .method("PUT")
        .uri(format!("/refunds/{}/process", Uuid::new_v4()))
        .header("content-type", "application/json")
        .header("X-User-ID", &user)
        .header("X-Roles", "customer,retailer")
        .body(Body::from(serde_json::json!({"action": "COMPLETE"}).to_string()))
        .unwrap();
    let resp = test_app().oneshot(req).await.unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn stock_adjust_is_not_for_customers() {
    let user = Uuid::new_v4().to_string();
    let resp = test_app()
        .oneshot(post_json(
            "/stock/adjust",
            Some((&user, "customer")),
            serde_json::json!({
                "productId": Uuid::new_v4(),
                "variantId": Uuid::new_v4(),
                "delta": 10,
                "movementType": "STOCK_IN",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn manual_sale_movements_are_rejected() {
    let user = Uuid::new_v4().to_string();
    let resp = test_app()
        .oneshot(post_json(
            "/stock/adjust",
            Some((&user, "admin")),
            serde_json::json!({
                "productId": Uuid::new_v4(),
                "variantId": Uuid::new_v4(),
                "delta": -1,
                "movementType": "SALE",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(
        resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()),
        Some("invalid_movement_type"),
    );
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = test_app().oneshot(req).await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}
