use crate::context::SecurityContext;
use crate::SecurityError;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Retailer,
    Customer,
    Unknown(String),
}

impl std::str::FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "admin" | "Admin" | "ADMIN" => Role::Admin,
            "retailer" | "Retailer" | "RETAILER" => Role::Retailer,
            "customer" | "Customer" | "CUSTOMER" => Role::Customer,
            other => Role::Unknown(other.to_string()),
        })
    }
}

pub fn ensure_role(ctx: &SecurityContext, required: Role) -> Result<(), SecurityError> {
    if ctx.roles.iter().any(|r| *r == required) { return Ok(()); }
    warn!(user_id = %ctx.user_id, ?required, roles = ?ctx.roles, "role_check_failed");
    Err(SecurityError::Forbidden)
}

pub fn ensure_any_role(ctx: &SecurityContext, required: &[Role]) -> Result<(), SecurityError> {
    if ctx.roles.iter().any(|r| required.iter().any(|x| x == r)) { return Ok(()); }
    warn!(user_id = %ctx.user_id, ?required, roles = ?ctx.roles, "any_role_check_failed");
    Err(SecurityError::Forbidden)
}
