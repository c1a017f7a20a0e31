use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::{conflict_on_unique, CheckoutError, CoreResult};
use crate::gateway::PaymentGateway;
use crate::orders;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "PENDING",
            RefundStatus::Approved => "APPROVED",
            RefundStatus::Rejected => "REJECTED",
            RefundStatus::Completed => "COMPLETED",
        }
    }

    pub fn from_str(s: &str) -> Option<RefundStatus> {
        match s {
            "PENDING" => Some(RefundStatus::Pending),
            "APPROVED" => Some(RefundStatus::Approved),
            "REJECTED" => Some(RefundStatus::Rejected),
            "COMPLETED" => Some(RefundStatus::Completed),
            _ => None,
        }
    }
}

/// Valid transitions:
/// PENDING -> APPROVED | REJECTED
/// APPROVED -> COMPLETED | REJECTED
/// REJECTED and COMPLETED are terminal.
pub fn is_valid_transition(from: RefundStatus, to: RefundStatus) -> bool {
    match from {
        RefundStatus::Pending => matches!(to, RefundStatus::Approved | RefundStatus::Rejected),
        RefundStatus::Approved => matches!(to, RefundStatus::Completed | RefundStatus::Rejected),
        RefundStatus::Rejected | RefundStatus::Completed => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefundRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub reason: String,
    pub amount: BigDecimal,
    pub status: String,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

const REFUND_COLUMNS: &str =
    "id, order_id, user_id, reason, amount, status, processed_by, processed_at, notes, created_at";

async fn get_refund(db: &PgPool, refund_id: Uuid) -> CoreResult<RefundRequest> {
    sqlx::query_as::<_, RefundRequest>(&format!(
        "SELECT {REFUND_COLUMNS} FROM refund_requests WHERE id = $1"
    ))
    .bind(refund_id)
    .fetch_optional(db)
    .await?
    .ok_or(CheckoutError::NotFound { code: "refund_not_found" })
}

/// Customer-initiated refund request. The order must belong to the requester
/// and be DELIVERED, and at most one PENDING/APPROVED request may exist per
/// order - the existence check catches the common case and the partial
/// unique index settles races.
pub async fn create_refund_request(
    db: &PgPool,
    order_id: Uuid,
    user_id: Uuid,
    reason: &str,
    amount: Option<BigDecimal>,
) -> CoreResult<RefundRequest> {
    let order = sqlx::query_as::<_, (String, BigDecimal)>(
        "SELECT status, total_amount FROM orders WHERE id = $1 AND user_id = $2",
    )
    .bind(order_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or(CheckoutError::NotFound { code: "order_not_found" })?;

    let (status, total_amount) = order;
    if status != "DELIVERED" {
        return Err(CheckoutError::validation(
            "refund_requires_delivered",
            "refunds can only be requested for delivered orders",
        ));
    }

    let active = sqlx::query_scalar::<_, i32>(
        "SELECT 1 FROM refund_requests WHERE order_id = $1 AND status IN ('PENDING', 'APPROVED') LIMIT 1",
    )
    .bind(order_id)
    .fetch_optional(db)
    .await?;
    if active.is_some() {
        return Err(CheckoutError::Conflict { code: "duplicate_refund_request" });
    }

    let amount = amount.unwrap_or(total_amount);
    let refund = sqlx::query_as::<_, RefundRequest>(&format!(
        r#"INSERT INTO refund_requests (id, order_id, user_id, reason, amount, status)
           VALUES ($1, $2, $3, $4, $5, 'PENDING')
           RETURNING {REFUND_COLUMNS}"#
    ))
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(user_id)
    .bind(reason)
    .bind(&amount)
    .fetch_one(db)
    .await
    .map_err(|e| conflict_on_unique(e, "duplicate_refund_request"))?;

    info!(refund_id = %refund.id, order_id = %order_id, "refund requested");
    Ok(refund)
}

/// Retailer review step. Authorization is derived from data: the retailer
/// must have at least one of their products among the order's items. Notes
/// accumulate; nothing is overwritten.
pub async fn update_refund_status(
    db: &PgPool,
    refund_id: Uuid,
    retailer_id: Uuid,
    to: RefundStatus,
    notes: &str,
) -> CoreResult<RefundRequest> {
    if !matches!(to, RefundStatus::Approved | RefundStatus::Rejected) {
        return Err(CheckoutError::validation(
            "invalid_refund_status",
            "retailer review may only approve or reject",
        ));
    }

    let owns_product = sqlx::query_scalar::<_, i64>(
        r#"SELECT COUNT(*)
           FROM refund_requests rr
           JOIN orders o ON rr.order_id = o.id
           JOIN order_items oi ON o.id = oi.order_id
           JOIN products p ON oi.product_id = p.id
           WHERE rr.id = $1 AND p.created_by = $2"#,
    )
    .bind(refund_id)
    .bind(retailer_id)
    .fetch_one(db)
    .await?;
    if owns_product == 0 {
        return Err(CheckoutError::Authorization);
    }

    // The from-state guard lives in the UPDATE itself, so a concurrent
    // review cannot slip between a read and the write.
    let refund = sqlx::query_as::<_, RefundRequest>(&format!(
        r#"UPDATE refund_requests
           SET status = $2,
               notes = COALESCE(notes, '') || $3
           WHERE id = $1
             AND (($2 = 'APPROVED' AND status = 'PENDING')
               OR ($2 = 'REJECTED' AND status IN ('PENDING', 'APPROVED')))
           RETURNING {REFUND_COLUMNS}"#
    ))
    .bind(refund_id)
    .bind(to.as_str())
    .bind(format!(" Retailer: {notes}"))
    .fetch_optional(db)
    .await?;

    match refund {
        Some(refund) => {
            info!(refund_id = %refund_id, status = to.as_str(), "refund reviewed by retailer");
            Ok(refund)
        }
        None => {
            get_refund(db, refund_id).await?;
            Err(CheckoutError::Conflict { code: "invalid_refund_transition" })
        }
    }
}

/// Refund requests opened by one customer, newest first.
pub async fn list_for_customer(db: &PgPool, user_id: Uuid) -> CoreResult<Vec<RefundRequest>> {
    let rows = sqlx::query_as::<_, RefundRequest>(&format!(
        "SELECT {REFUND_COLUMNS} FROM refund_requests WHERE user_id = $1 ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Refund requests awaiting a given retailer, scoped to orders containing
/// their products. Optional status filter.
pub async fn list_for_retailer(
    db: &PgPool,
    retailer_id: Uuid,
    status: Option<RefundStatus>,
) -> CoreResult<Vec<RefundRequest>> {
    let rows = sqlx::query_as::<_, RefundRequest>(
        r#"SELECT DISTINCT rr.id, rr.order_id, rr.user_id, rr.reason, rr.amount, rr.status,
                  rr.processed_by, rr.processed_at, rr.notes, rr.created_at
           FROM refund_requests rr
           JOIN orders o ON rr.order_id = o.id
           JOIN order_items oi ON o.id = oi.order_id
           JOIN products p ON oi.product_id = p.id
           WHERE p.created_by = $1 AND ($2::text IS NULL OR rr.status = $2)
           ORDER BY rr.created_at DESC"#,
    )
    .bind(retailer_id)
    .bind(status.map(|s| s.as_str()))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Every refund request, optionally filtered by status. Admin view.
pub async fn list_all(db: &PgPool, status: Option<RefundStatus>) -> CoreResult<Vec<RefundRequest>> {
    let rows = sqlx::query_as::<_, RefundRequest>(&format!(
        r#"SELECT {REFUND_COLUMNS} FROM refund_requests
           WHERE $1::text IS NULL OR status = $1
           ORDER BY created_at DESC"#
    ))
    .bind(status.map(|s| s.as_str()))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundAction {
    Complete,
    Reject,
}

/// Admin processing step. COMPLETE requires the retailer's prior approval,
/// and the gateway refund must succeed before anything is recorded: a
/// completion is never written ahead of the money moving back.
pub async fn process_refund(
    db: &PgPool,
    gateway: &dyn PaymentGateway,
    refund_id: Uuid,
    admin_id: Uuid,
    action: RefundAction,
    payment_notes: &str,
) -> CoreResult<RefundRequest> {
    match action {
        RefundAction::Complete => {
            complete_refund(db, gateway, refund_id, admin_id, payment_notes).await
        }
        RefundAction::Reject => reject_refund(db, refund_id, admin_id, payment_notes).await,
    }
}

async fn complete_refund(
    db: &PgPool,
    gateway: &dyn PaymentGateway,
    refund_id: Uuid,
    admin_id: Uuid,
    payment_notes: &str,
) -> CoreResult<RefundRequest> {
    let mut tx = db.begin().await?;

    // Row lock up front: two concurrent COMPLETE calls serialize here, and
    // the loser re-reads a terminal status after the winner commits. The
    // gateway is never called twice for one request.
    let refund = sqlx::query_as::<_, RefundRequest>(&format!(
        "SELECT {REFUND_COLUMNS} FROM refund_requests WHERE id = $1 FOR UPDATE"
    ))
    .bind(refund_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(CheckoutError::NotFound { code: "refund_not_found" })?;

    let current = RefundStatus::from_str(&refund.status)
        .ok_or(CheckoutError::Internal { source: anyhow::anyhow!("corrupt refund status") })?;
    if !is_valid_transition(current, RefundStatus::Completed) {
        return Err(CheckoutError::Conflict { code: "refund_not_approved" });
    }

    let payment_ref = sqlx::query_scalar::<_, Option<String>>(
        r#"SELECT transaction_ref FROM payments
           WHERE order_id = $1 AND status = 'COMPLETED'
           ORDER BY created_at DESC
           LIMIT 1"#,
    )
    .bind(refund.order_id)
    .fetch_optional(&mut *tx)
    .await?
    .flatten()
    .ok_or(CheckoutError::Conflict { code: "no_settled_payment" })?;

    // Gateway refund happens under the row lock. An error drops the
    // transaction, the refund stays APPROVED and the admin retries.
    let gateway_refund_ref = gateway.refund(&payment_ref, &refund.amount).await?;
    info!(refund_id = %refund_id, order_id = %refund.order_id,
          refund_ref = gateway_refund_ref.as_deref().unwrap_or("-"),
          "gateway refund confirmed");

    sqlx::query(
        "UPDATE orders SET status = 'REFUNDED', payment_status = 'REFUNDED' WHERE id = $1",
    )
    .bind(refund.order_id)
    .execute(&mut *tx)
    .await?;
    orders::append_status_history(
        &mut tx,
        refund.order_id,
        "REFUNDED",
        &format!("Refund completed: {payment_notes}"),
        admin_id,
    )
    .await?;
    let updated = sqlx::query_as::<_, RefundRequest>(&format!(
        r#"UPDATE refund_requests
           SET status = 'COMPLETED',
               processed_by = $2,
               processed_at = now(),
               notes = COALESCE(notes, '') || $3
           WHERE id = $1 AND status = 'APPROVED'
           RETURNING {REFUND_COLUMNS}"#
    ))
    .bind(refund_id)
    .bind(admin_id)
    .bind(format!(" Admin: {payment_notes}"))
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(CheckoutError::Conflict { code: "refund_not_approved" })?;
    tx.commit().await?;

    info!(refund_id = %refund_id, order_id = %refund.order_id, "refund completed");
    Ok(updated)
}

async fn reject_refund(
    db: &PgPool,
    refund_id: Uuid,
    admin_id: Uuid,
    payment_notes: &str,
) -> CoreResult<RefundRequest> {
    // Terminal states stay terminal; the guard makes rejection a no-op race
    // loser instead of overwriting a completed refund.
    let updated = sqlx::query_as::<_, RefundRequest>(&format!(
        r#"UPDATE refund_requests
           SET status = 'REJECTED',
               processed_by = $2,
               processed_at = now(),
               notes = COALESCE(notes, '') || $3
           WHERE id = $1 AND status IN ('PENDING', 'APPROVED')
           RETURNING {REFUND_COLUMNS}"#
    ))
    .bind(refund_id)
    .bind(admin_id)
    .bind(format!(" Admin: {payment_notes}"))
    .fetch_optional(db)
    .await?;

    match updated {
        Some(refund) => {
            info!(refund_id = %refund_id, "refund rejected");
            Ok(refund)
        }
        None => {
            get_refund(db, refund_id).await?;
            Err(CheckoutError::Conflict { code: "invalid_refund_transition" })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_matrix() {
        use RefundStatus::*;
        let valid = [
            (Pending, Approved),
            (Pending, Rejected),
            (Approved, Completed),
            (Approved, Rejected),
        ];
        for (from, to) in valid {
            assert!(is_valid_transition(from, to), "{from:?} -> {to:?} should be allowed");
        }
        for from in [Rejected, Completed] {
            for to in [Pending, Approved, Rejected, Completed] {
                assert!(!is_valid_transition(from, to), "{from:?} is terminal");
            }
        }
        assert!(!is_valid_transition(Pending, Completed), "approval cannot be skipped");
        assert!(!is_valid_transition(Approved, Pending));
    }

    #[test]
    fn status_round_trips() {
        for s in [
            RefundStatus::Pending,
            RefundStatus::Approved,
            RefundStatus::Rejected,
            RefundStatus::Completed,
        ] {
            assert_eq!(RefundStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(RefundStatus::from_str("CANCELLED"), None);
    }
}
