use std::time::Duration;

use anyhow::anyhow;
use bigdecimal::BigDecimal;
use chrono::Utc;
use common_money::to_minor_units;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{CheckoutError, CoreResult};

/// Remote payment order as created on the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct CreateGatewayOrder {
    pub amount: BigDecimal,
    pub currency: String,
    pub receipt: Option<String>,
    pub notes: serde_json::Value,
}

impl CreateGatewayOrder {
    pub fn new(amount: BigDecimal) -> Self {
        Self {
            amount,
            currency: "INR".to_string(),
            receipt: None,
            notes: serde_json::Value::Null,
        }
    }
}

/// Opaque external payment gateway. Only order creation and refunds cross
/// this seam; signature verification is local (common-signature) and never
/// requires a round trip.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, req: CreateGatewayOrder) -> CoreResult<GatewayOrder>;
    async fn refund(&self, payment_ref: &str, amount: &BigDecimal) -> CoreResult<Option<String>>;
}

fn amount_minor(amount: &BigDecimal) -> CoreResult<i64> {
    to_minor_units(amount)
        .filter(|m| *m > 0)
        .ok_or_else(|| CheckoutError::validation("invalid_amount", "amount must be positive"))
}

fn default_receipt() -> String {
    format!("rcpt_{}", Utc::now().timestamp_millis())
}

/// HTTP gateway client. Timeouts and 5xx map to `UpstreamGateway` so callers
/// can retry; they are never folded into verification failures.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpGateway {
    pub fn new(
        base_url: String,
        key_id: String,
        key_secret: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url, key_id, key_secret })
    }

    fn upstream(err: reqwest::Error) -> CheckoutError {
        CheckoutError::UpstreamGateway { source: anyhow::Error::from(err) }
    }
}

#[derive(Deserialize)]
struct GatewayOrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

#[derive(Deserialize)]
struct GatewayRefundResponse {
    id: Option<String>,
}

#[async_trait::async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_order(&self, req: CreateGatewayOrder) -> CoreResult<GatewayOrder> {
        let amount_minor = amount_minor(&req.amount)?;
        let body = serde_json::json!({
            "amount": amount_minor,
            "currency": req.currency,
            "receipt": req.receipt.unwrap_or_else(default_receipt),
            "notes": req.notes,
        });

        let resp = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(Self::upstream)?;

        if !resp.status().is_success() {
            let status = resp.status();
            warn!(%status, "gateway order creation rejected");
            return Err(CheckoutError::UpstreamGateway {
                source: anyhow!("gateway returned {status}"),
            });
        }

        let order: GatewayOrderResponse = resp.json().await.map_err(Self::upstream)?;
        Ok(GatewayOrder { id: order.id, amount_minor: order.amount, currency: order.currency })
    }

    async fn refund(&self, payment_ref: &str, amount: &BigDecimal) -> CoreResult<Option<String>> {
        let amount_minor = amount_minor(amount)?;
        let resp = self
            .client
            .post(format!("{}/v1/payments/{}/refund", self.base_url, payment_ref))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&serde_json::json!({ "amount": amount_minor }))
            .send()
            .await
            .map_err(Self::upstream)?;

        if !resp.status().is_success() {
            let status = resp.status();
            warn!(%status, payment_ref, "gateway refund rejected");
            return Err(CheckoutError::UpstreamGateway {
                source: anyhow!("gateway returned {status}"),
            });
        }

        let refund: GatewayRefundResponse = resp.json().await.map_err(Self::upstream)?;
        Ok(refund.id)
    }
}

/// In-process stand-in for tests and local development.
pub struct StubGateway;

impl StubGateway {
    pub fn new() -> Self { Self }
}

impl Default for StubGateway {
    fn default() -> Self { Self::new() }
}

#[async_trait::async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(&self, req: CreateGatewayOrder) -> CoreResult<GatewayOrder> {
        let amount_minor = amount_minor(&req.amount)?;
        Ok(GatewayOrder {
            id: format!("order_stub_{}", Uuid::new_v4().simple()),
            amount_minor,
            currency: req.currency,
        })
    }

    async fn refund(&self, payment_ref: &str, _amount: &BigDecimal) -> CoreResult<Option<String>> {
        Ok(Some(format!("{}-refund", payment_ref)))
    }
}
