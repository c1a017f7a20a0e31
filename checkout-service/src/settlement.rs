use bigdecimal::BigDecimal;
use common_money::normalize_scale;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{CheckoutError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerType {
    Sale,
    RetailerProfit,
    AdminRevenue,
}

impl LedgerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerType::Sale => "SALE",
            LedgerType::RetailerProfit => "RETAILER_PROFIT",
            LedgerType::AdminRevenue => "ADMIN_REVENUE",
        }
    }
}

/// Per-item revenue split for a retailer-fulfilled sale.
/// Invariant: `admin_revenue + retailer_profit == sale`.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitLine {
    pub sale: BigDecimal,
    pub admin_revenue: BigDecimal,
    pub retailer_profit: BigDecimal,
}

/// Split one order item: the platform keeps wholesale x qty, the retailer
/// keeps the margin over wholesale, and the customer-facing sale is
/// price x qty.
pub fn split_item(unit_price: &BigDecimal, wholesale: &BigDecimal, qty: i32) -> SplitLine {
    let qty = BigDecimal::from(qty);
    let sale = normalize_scale(&(unit_price * &qty));
    let admin_revenue = normalize_scale(&(wholesale * &qty));
    let retailer_profit = normalize_scale(&(&sale - &admin_revenue));
    SplitLine { sale, admin_revenue, retailer_profit }
}

async fn insert_ledger_entry(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Option<Uuid>,
    order_id: Uuid,
    order_item_id: Option<Uuid>,
    payment_id: Option<Uuid>,
    ledger_type: LedgerType,
    amount: &BigDecimal,
    narration: &str,
) -> CoreResult<()> {
    sqlx::query(
        r#"INSERT INTO financial_ledger
           (id, user_id, ref_order_id, ref_order_item_id, ref_payment_id, ledger_type, amount, narration)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(order_id)
    .bind(order_item_id)
    .bind(payment_id)
    .bind(ledger_type.as_str())
    .bind(amount)
    .bind(narration)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Post the revenue split for a paid order. One transaction: payment rows
/// move to COMPLETED, the order's payment status to PAID, then the ledger
/// rows. Invoked once per order - a second call hits the existence guard and
/// fails with a conflict instead of double-posting money.
pub async fn post_settlement(db: &PgPool, order_id: Uuid) -> CoreResult<()> {
    let mut tx = db.begin().await?;

    // Row lock first: concurrent posts for the same order serialize here, so
    // the existence guard below always sees the winner's committed rows
    // instead of racing ahead of them.
    let order = sqlx::query_as::<_, (Uuid, Option<Uuid>, BigDecimal)>(
        "SELECT user_id, retailer_id, total_amount FROM orders WHERE id = $1 FOR UPDATE",
    )
    .bind(order_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(CheckoutError::NotFound { code: "order_not_found" })?;
    let (customer_id, retailer_id, total_amount) = order;

    let already = sqlx::query_scalar::<_, i32>(
        "SELECT 1 FROM financial_ledger WHERE ref_order_id = $1 LIMIT 1",
    )
    .bind(order_id)
    .fetch_optional(&mut *tx)
    .await?;
    if already.is_some() {
        return Err(CheckoutError::Conflict { code: "settlement_already_posted" });
    }

    sqlx::query("UPDATE payments SET status = 'COMPLETED' WHERE order_id = $1 AND status IN ('PENDING', 'PAID')")
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE orders SET payment_status = 'PAID' WHERE id = $1")
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

    match retailer_id {
        Some(retailer_id) => {
            let items = sqlx::query_as::<_, (Uuid, Uuid, i32, BigDecimal)>(
                "SELECT id, variant_id, qty, unit_price FROM order_items WHERE order_id = $1",
            )
            .bind(order_id)
            .fetch_all(&mut *tx)
            .await?;

            for (item_id, variant_id, qty, unit_price) in items {
                // Wholesale comes from the retailer's currently-active price
                // record, not a value captured at sale time. A price change
                // between sale and settlement shifts the split; the ledger
                // narration keeps the variant for reconciliation.
                let wholesale = sqlx::query_scalar::<_, Option<BigDecimal>>(
                    r#"SELECT wholesale_price FROM retailer_variant_prices
                       WHERE variant_id = $1 AND retailer_id = $2 AND is_active
                       ORDER BY effective_from DESC
                       LIMIT 1"#,
                )
                .bind(variant_id)
                .bind(retailer_id)
                .fetch_optional(&mut *tx)
                .await?
                .flatten()
                .unwrap_or_else(|| BigDecimal::from(0));

                let split = split_item(&unit_price, &wholesale, qty);
                if split.retailer_profit < BigDecimal::from(0) {
                    warn!(order_id = %order_id, variant_id = %variant_id,
                          "wholesale price exceeds selling price; negative retailer margin");
                }

                insert_ledger_entry(
                    &mut tx,
                    Some(customer_id),
                    order_id,
                    Some(item_id),
                    None,
                    LedgerType::Sale,
                    &split.sale,
                    &format!("Sale to customer (variant {variant_id})"),
                )
                .await?;
                insert_ledger_entry(
                    &mut tx,
                    Some(retailer_id),
                    order_id,
                    Some(item_id),
                    None,
                    LedgerType::RetailerProfit,
                    &split.retailer_profit,
                    &format!("Retailer margin (variant {variant_id})"),
                )
                .await?;
                insert_ledger_entry(
                    &mut tx,
                    None,
                    order_id,
                    Some(item_id),
                    None,
                    LedgerType::AdminRevenue,
                    &split.admin_revenue,
                    &format!("Admin revenue (variant {variant_id})"),
                )
                .await?;
            }
        }
        None => {
            // Direct sale: the platform keeps the full amount.
            insert_ledger_entry(
                &mut tx,
                None,
                order_id,
                None,
                None,
                LedgerType::AdminRevenue,
                &total_amount,
                "Direct sale",
            )
            .await?;
        }
    }

    tx.commit().await?;
    info!(order_id = %order_id, "settlement posted");
    Ok(())
}
