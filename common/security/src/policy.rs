use crate::{roles::Role, SecurityContext, SecurityError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CheckoutPay,
    RefundRequest,
    RefundReview,
    RefundProcess,
    StockAdjust,
    LedgerView,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CheckoutPay => "checkout_pay",
            Capability::RefundRequest => "refund_request",
            Capability::RefundReview => "refund_review",
            Capability::RefundProcess => "refund_process",
            Capability::StockAdjust => "stock_adjust",
            Capability::LedgerView => "ledger_view",
        }
    }
}

// Simple mapping: which roles are allowed each capability.
fn allowed_roles(cap: Capability) -> &'static [Role] {
    use Capability::*;
    use Role::*;
    match cap {
        CheckoutPay => &[Customer, Retailer, Admin],
        RefundRequest => &[Customer],
        RefundReview => &[Retailer],
        RefundProcess => &[Admin],
        StockAdjust => &[Admin, Retailer],
        LedgerView => &[Admin],
    }
}

pub fn ensure_capability(ctx: &SecurityContext, cap: Capability) -> Result<(), SecurityError> {
    let allowed = allowed_roles(cap);
    if ctx.roles.iter().any(|r| allowed.iter().any(|a| a == r)) { return Ok(()); }
    Err(SecurityError::Forbidden)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn mk_ctx(roles: Vec<Role>) -> SecurityContext {
        SecurityContext { user_id: Uuid::new_v4(), roles, trace_id: None }
    }

    #[test]
    fn customer_cannot_process_refund() {
        let ctx = mk_ctx(vec![Role::Customer]);
        assert!(ensure_capability(&ctx, Capability::RefundProcess).is_err());
    }

    #[test]
    fn retailer_reviews_but_does_not_request() {
        let ctx = mk_ctx(vec![Role::Retailer]);
        assert!(ensure_capability(&ctx, Capability::RefundReview).is_ok());
        assert!(ensure_capability(&ctx, Capability::RefundRequest).is_err());
    }

    #[test]
    fn admin_processes_and_views_ledger() {
        let ctx = mk_ctx(vec![Role::Admin]);
        for cap in [Capability::RefundProcess, Capability::LedgerView, Capability::StockAdjust] {
            assert!(ensure_capability(&ctx, cap).is_ok(), "Admin missing {:?}", cap);
        }
    }

    #[test]
    fn unknown_role_gets_nothing() {
        let ctx = mk_ctx(vec![Role::Unknown("auditor".into())]);
        assert!(ensure_capability(&ctx, Capability::CheckoutPay).is_err());
    }
}
