use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{CheckoutError, CoreResult};

/// Movement kinds for the append-only stock ledger. The caller picks by
/// intent; the sign convention lives here, not at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    StockIn,
    StockOut,
    Sale,
    ManualAdjust,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::StockIn => "STOCK_IN",
            MovementType::StockOut => "STOCK_OUT",
            MovementType::Sale => "SALE",
            MovementType::ManualAdjust => "MANUAL_ADJUST",
        }
    }

    pub fn from_str(s: &str) -> Option<MovementType> {
        match s {
            "STOCK_IN" => Some(MovementType::StockIn),
            "STOCK_OUT" => Some(MovementType::StockOut),
            "SALE" => Some(MovementType::Sale),
            "MANUAL_ADJUST" => Some(MovementType::ManualAdjust),
            _ => None,
        }
    }
}

/// SALE always reduces stock; quantity sold comes in positive.
pub fn sale_delta(qty: i32) -> i32 {
    -qty
}

/// Optional order linkage recorded on a ledger row.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerRefs {
    pub order_id: Option<Uuid>,
    pub order_item_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StockLedgerEntry {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub ref_order_id: Option<Uuid>,
    pub ref_order_item_id: Option<Uuid>,
    pub movement_type: String,
    pub quantity: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Apply a signed stock delta inside the caller's transaction: one guarded
/// update of the cached counter plus the matching ledger row. The guard keeps
/// two racing checkouts from overselling - the decrement is a single atomic
/// statement that refuses to go negative.
pub async fn adjust_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    variant_id: Uuid,
    delta: i32,
    movement: MovementType,
    refs: LedgerRefs,
) -> CoreResult<i32> {
    let remaining = sqlx::query_scalar::<_, i32>(
        r#"UPDATE product_variants
           SET stock_qty = stock_qty + $2
           WHERE id = $1 AND stock_qty + $2 >= 0
           RETURNING stock_qty"#,
    )
    .bind(variant_id)
    .bind(delta)
    .fetch_optional(&mut **tx)
    .await?;

    let remaining = match remaining {
        Some(qty) => qty,
        None => {
            let exists = sqlx::query_scalar::<_, i32>(
                "SELECT 1 FROM product_variants WHERE id = $1",
            )
            .bind(variant_id)
            .fetch_optional(&mut **tx)
            .await?;
            return Err(match exists {
                Some(_) => CheckoutError::InsufficientStock { variant_id },
                None => CheckoutError::NotFound { code: "variant_not_found" },
            });
        }
    };

    sqlx::query(
        r#"INSERT INTO stock_ledger
           (id, product_id, variant_id, ref_order_id, ref_order_item_id, movement_type, quantity)
           VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
    )
    .bind(Uuid::new_v4())
    .bind(product_id)
    .bind(variant_id)
    .bind(refs.order_id)
    .bind(refs.order_item_id)
    .bind(movement.as_str())
    .bind(delta)
    .execute(&mut **tx)
    .await?;

    Ok(remaining)
}

/// Standalone adjustment (manual stocking, corrections): opens its own
/// transaction so the counter and the ledger move together or not at all.
pub async fn adjust(
    db: &PgPool,
    product_id: Uuid,
    variant_id: Uuid,
    delta: i32,
    movement: MovementType,
    refs: LedgerRefs,
) -> CoreResult<i32> {
    let mut tx = db.begin().await?;
    let remaining = adjust_in_tx(&mut tx, product_id, variant_id, delta, movement, refs).await?;
    tx.commit().await?;
    Ok(remaining)
}

/// Full movement history for a variant, oldest first. The cached counter can
/// always be rebuilt as `initial + sum of deltas` over this sequence.
pub async fn ledger_for_variant(db: &PgPool, variant_id: Uuid) -> CoreResult<Vec<StockLedgerEntry>> {
    let rows = sqlx::query_as::<_, StockLedgerEntry>(
        r#"SELECT id, product_id, variant_id, ref_order_id, ref_order_item_id,
                  movement_type, quantity, created_at
           FROM stock_ledger
           WHERE variant_id = $1
           ORDER BY created_at ASC"#,
    )
    .bind(variant_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_type_round_trips() {
        for m in [
            MovementType::StockIn,
            MovementType::StockOut,
            MovementType::Sale,
            MovementType::ManualAdjust,
        ] {
            assert_eq!(MovementType::from_str(m.as_str()), Some(m));
        }
        assert_eq!(MovementType::from_str("RESERVATION"), None);
    }

    #[test]
    fn sale_always_reduces() {
        assert_eq!(sale_delta(2), -2);
        assert_eq!(sale_delta(0), 0);
    }
}
