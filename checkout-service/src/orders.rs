use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use common_money::{line_subtotal, normalize_scale};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::error::{CheckoutError, CoreResult};
use crate::stock::{self, LedgerRefs, MovementType};

pub const ORDER_STATUSES: &[&str] = &[
    "PENDING", "CONFIRMED", "PROCESSING", "SHIPPED", "DELIVERED", "CANCELLED", "REFUNDED", "FAILED",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Pending,
    Paid,
    Failed,
    Completed,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "PENDING",
            PaymentState::Paid => "PAID",
            PaymentState::Failed => "FAILED",
            PaymentState::Completed => "COMPLETED",
        }
    }

    pub fn from_str(s: &str) -> Option<PaymentState> {
        match s {
            "PENDING" => Some(PaymentState::Pending),
            "PAID" => Some(PaymentState::Paid),
            "FAILED" => Some(PaymentState::Failed),
            "COMPLETED" => Some(PaymentState::Completed),
            _ => None,
        }
    }
}

/// Immutable order header. Status columns move through their lifecycles;
/// everything else is fixed at materialization time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub retailer_id: Option<Uuid>,
    pub shipping_address_id: Option<Uuid>,
    pub total_amount: BigDecimal,
    pub status: String,
    pub payment_status: String,
    pub gateway_order_ref: Option<String>,
    pub gateway_payment_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub qty: i32,
    pub unit_price: BigDecimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: BigDecimal,
    pub method: String,
    pub gateway: String,
    pub transaction_ref: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// One cart line as captured at add-to-cart time. The unit price here is the
/// one the customer saw; materialization never re-resolves it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub qty: i32,
    pub unit_price: BigDecimal,
}

#[derive(Debug, Clone)]
pub struct GatewayRefs {
    pub order_ref: String,
    pub payment_ref: String,
}

/// Result of the pre-payment checkout variant: the order exists with a
/// pending payment row and the amount to hand to the gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDraft {
    pub order_id: Uuid,
    pub amount: BigDecimal,
}

pub const GATEWAY_NAME: &str = "razorpay";
pub const METHOD_GATEWAY: &str = "GATEWAY";

/// Total from captured cart prices. Single source of the checkout total.
pub fn compute_total(lines: &[CartLine]) -> BigDecimal {
    let sum = lines
        .iter()
        .fold(BigDecimal::from(0), |acc, l| acc + line_subtotal(&l.unit_price, l.qty));
    normalize_scale(&sum)
}

/// Snapshot the user's cart lines (prices as captured at add time).
pub async fn cart_lines_for_user(db: &PgPool, user_id: Uuid) -> CoreResult<Vec<CartLine>> {
    let lines = sqlx::query_as::<_, CartLine>(
        r#"SELECT ci.product_id, ci.variant_id, ci.qty, ci.unit_price
           FROM cart_items ci
           JOIN carts c ON ci.cart_id = c.id
           WHERE c.user_id = $1
           ORDER BY ci.created_at ASC"#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(lines)
}

async fn insert_order(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    retailer_id: Option<Uuid>,
    shipping_address_id: Option<Uuid>,
    total: &BigDecimal,
    status: &str,
    payment_status: &str,
    gateway: Option<&GatewayRefs>,
) -> CoreResult<Order> {
    let order = sqlx::query_as::<_, Order>(
        r#"INSERT INTO orders
           (id, user_id, retailer_id, shipping_address_id, total_amount, status, payment_status,
            gateway_order_ref, gateway_payment_ref)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
           RETURNING id, user_id, retailer_id, shipping_address_id, total_amount, status,
                     payment_status, gateway_order_ref, gateway_payment_ref, created_at"#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(retailer_id)
    .bind(shipping_address_id)
    .bind(total)
    .bind(status)
    .bind(payment_status)
    .bind(gateway.map(|g| g.order_ref.as_str()))
    .bind(gateway.map(|g| g.payment_ref.as_str()))
    .fetch_one(&mut **tx)
    .await?;
    Ok(order)
}

async fn insert_items_and_decrement_stock(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    lines: &[CartLine],
) -> CoreResult<Vec<OrderItem>> {
    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = sqlx::query_as::<_, OrderItem>(
            r#"INSERT INTO order_items (id, order_id, product_id, variant_id, qty, unit_price)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id, order_id, product_id, variant_id, qty, unit_price"#,
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.variant_id)
        .bind(line.qty)
        .bind(&line.unit_price)
        .fetch_one(&mut **tx)
        .await?;

        stock::adjust_in_tx(
            tx,
            line.product_id,
            line.variant_id,
            stock::sale_delta(line.qty),
            MovementType::Sale,
            LedgerRefs { order_id: Some(order_id), order_item_id: Some(item.id) },
        )
        .await?;

        items.push(item);
    }
    Ok(items)
}

async fn insert_payment(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    amount: &BigDecimal,
    transaction_ref: Option<&str>,
    status: PaymentState,
) -> CoreResult<Payment> {
    let payment = sqlx::query_as::<_, Payment>(
        r#"INSERT INTO payments (id, order_id, amount, method, gateway, transaction_ref, status)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           RETURNING id, order_id, amount, method, gateway, transaction_ref, status, created_at"#,
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(amount)
    .bind(METHOD_GATEWAY)
    .bind(GATEWAY_NAME)
    .bind(transaction_ref)
    .bind(status.as_str())
    .fetch_one(&mut **tx)
    .await?;
    Ok(payment)
}

async fn clear_cart_items(tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> CoreResult<()> {
    // The cart row itself is reusable; only its lines are consumed.
    sqlx::query(
        "DELETE FROM cart_items WHERE cart_id IN (SELECT id FROM carts WHERE user_id = $1)",
    )
    .bind(user_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Pre-payment checkout: snapshot the cart, materialize the order PENDING /
/// PENDING with a pending payment row, decrement stock, clear the cart.
/// One transaction, all-or-nothing: an order never exists without matching
/// stock decrements and item rows, and a cart is never emptied without an
/// order.
pub async fn create_checkout_order(
    db: &PgPool,
    user_id: Uuid,
    shipping_address_id: Option<Uuid>,
) -> CoreResult<CheckoutDraft> {
    let mut tx = db.begin().await?;

    let lines = sqlx::query_as::<_, CartLine>(
        r#"SELECT ci.product_id, ci.variant_id, ci.qty, ci.unit_price
           FROM cart_items ci
           JOIN carts c ON ci.cart_id = c.id
           WHERE c.user_id = $1
           ORDER BY ci.created_at ASC"#,
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?;
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let total = compute_total(&lines);
    let order =
        insert_order(&mut tx, user_id, None, shipping_address_id, &total, "PENDING", "PENDING", None)
            .await?;
    insert_items_and_decrement_stock(&mut tx, order.id, &lines).await?;
    insert_payment(&mut tx, order.id, &total, None, PaymentState::Pending).await?;
    clear_cart_items(&mut tx, user_id).await?;

    tx.commit().await?;
    info!(order_id = %order.id, user_id = %user_id, amount = %total, "checkout order created");
    Ok(CheckoutDraft { order_id: order.id, amount: total })
}

/// Post-payment materialization: the gateway already confirmed payment, so
/// the order lands CONFIRMED / PAID with the gateway references and a PAID
/// payment row. Lines come from the verified checkout payload with their
/// captured prices.
pub async fn create_paid_order(
    db: &PgPool,
    user_id: Uuid,
    retailer_id: Option<Uuid>,
    shipping_address_id: Option<Uuid>,
    lines: &[CartLine],
    gateway: &GatewayRefs,
) -> CoreResult<(Order, Payment)> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    let total = compute_total(lines);

    let mut tx = db.begin().await?;
    let order = insert_order(
        &mut tx,
        user_id,
        retailer_id,
        shipping_address_id,
        &total,
        "CONFIRMED",
        "PAID",
        Some(gateway),
    )
    .await?;
    insert_items_and_decrement_stock(&mut tx, order.id, lines).await?;
    let payment =
        insert_payment(&mut tx, order.id, &total, Some(&gateway.payment_ref), PaymentState::Paid)
            .await?;
    clear_cart_items(&mut tx, user_id).await?;
    tx.commit().await?;

    info!(order_id = %order.id, user_id = %user_id, amount = %total, "paid order materialized");
    Ok((order, payment))
}

/// Audit record for a payment that failed verification or capture: a
/// zero-amount FAILED order / payment pair keyed to the gateway references.
pub async fn create_failed_order(
    db: &PgPool,
    user_id: Uuid,
    gateway: &GatewayRefs,
) -> CoreResult<(Order, Payment)> {
    let zero = BigDecimal::from(0);
    let mut tx = db.begin().await?;
    let order =
        insert_order(&mut tx, user_id, None, None, &zero, "FAILED", "FAILED", Some(gateway)).await?;
    let payment =
        insert_payment(&mut tx, order.id, &zero, Some(&gateway.payment_ref), PaymentState::Failed)
            .await?;
    tx.commit().await?;
    Ok((order, payment))
}

pub async fn get_order(db: &PgPool, order_id: Uuid) -> CoreResult<Order> {
    sqlx::query_as::<_, Order>(
        r#"SELECT id, user_id, retailer_id, shipping_address_id, total_amount, status,
                  payment_status, gateway_order_ref, gateway_payment_ref, created_at
           FROM orders WHERE id = $1"#,
    )
    .bind(order_id)
    .fetch_optional(db)
    .await?
    .ok_or(CheckoutError::NotFound { code: "order_not_found" })
}

pub async fn order_by_gateway_ref(db: &PgPool, gateway_order_ref: &str) -> CoreResult<Order> {
    sqlx::query_as::<_, Order>(
        r#"SELECT id, user_id, retailer_id, shipping_address_id, total_amount, status,
                  payment_status, gateway_order_ref, gateway_payment_ref, created_at
           FROM orders WHERE gateway_order_ref = $1"#,
    )
    .bind(gateway_order_ref)
    .fetch_optional(db)
    .await?
    .ok_or(CheckoutError::NotFound { code: "order_not_found" })
}

pub async fn order_items(db: &PgPool, order_id: Uuid) -> CoreResult<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(
        r#"SELECT id, order_id, product_id, variant_id, qty, unit_price
           FROM order_items WHERE order_id = $1"#,
    )
    .bind(order_id)
    .fetch_all(db)
    .await?;
    Ok(items)
}

/// Attach the gateway order reference to a draft order awaiting payment.
pub async fn set_gateway_order_ref(
    db: &PgPool,
    order_id: Uuid,
    gateway_order_ref: &str,
) -> CoreResult<()> {
    let updated = sqlx::query("UPDATE orders SET gateway_order_ref = $2 WHERE id = $1")
        .bind(order_id)
        .bind(gateway_order_ref)
        .execute(db)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(CheckoutError::NotFound { code: "order_not_found" });
    }
    Ok(())
}

/// Mark an order's in-flight payment attempt failed (webhook `payment.failed`).
/// The order keeps its rows; a later successful attempt adds a new payment.
pub async fn mark_payment_failed(
    db: &PgPool,
    order_id: Uuid,
    payment_ref: Option<&str>,
) -> CoreResult<()> {
    let mut tx = db.begin().await?;
    sqlx::query(
        r#"UPDATE payments SET status = 'FAILED', transaction_ref = COALESCE($2, transaction_ref)
           WHERE order_id = $1 AND status = 'PENDING'"#,
    )
    .bind(order_id)
    .bind(payment_ref)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE orders SET payment_status = 'FAILED' WHERE id = $1 AND payment_status = 'PENDING'")
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Append a row to the order status trail inside the caller's transaction.
pub async fn append_status_history(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    status: &str,
    notes: &str,
    created_by: Uuid,
) -> CoreResult<()> {
    sqlx::query(
        r#"INSERT INTO order_status_history (id, order_id, status, notes, created_by)
           VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(status)
    .bind(notes)
    .bind(created_by)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: &str, qty: i32) -> CartLine {
        CartLine {
            product_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            qty,
            unit_price: BigDecimal::parse_bytes(price.as_bytes(), 10).unwrap(),
        }
    }

    #[test]
    fn total_uses_captured_prices() {
        let lines = vec![line("500.00", 2), line("12.34", 3)];
        assert_eq!(compute_total(&lines).to_string(), "1037.02");
    }

    #[test]
    fn total_of_empty_cart_is_zero() {
        assert_eq!(compute_total(&[]).to_string(), "0.00");
    }

    #[test]
    fn payment_state_round_trips() {
        for s in [
            PaymentState::Pending,
            PaymentState::Paid,
            PaymentState::Failed,
            PaymentState::Completed,
        ] {
            assert_eq!(PaymentState::from_str(s.as_str()), Some(s));
        }
        assert_eq!(PaymentState::from_str("VOIDED"), None);
    }
}
