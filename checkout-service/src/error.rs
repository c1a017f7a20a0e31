use common_http_errors::ApiError;
use thiserror::Error;
use uuid::Uuid;

/// Core pipeline error taxonomy. Boundary handlers convert these into the
/// shared JSON envelope; gateway failures stay distinct from verification
/// failures so callers know which ones are retryable.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{message}")]
    Validation { code: &'static str, message: String },
    #[error("not authorized to act on this resource")]
    Authorization,
    #[error("not found: {code}")]
    NotFound { code: &'static str },
    #[error("conflict: {code}")]
    Conflict { code: &'static str },
    #[error("payment could not be verified")]
    SignatureVerification,
    #[error("insufficient stock for item {variant_id}")]
    InsufficientStock { variant_id: Uuid },
    #[error("cart is empty")]
    EmptyCart,
    #[error("no effective price for variant {variant_id}")]
    PriceNotFound { variant_id: Uuid },
    #[error("payment gateway unavailable")]
    UpstreamGateway {
        #[source]
        source: anyhow::Error,
    },
    #[error("internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl CheckoutError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { code, message: message.into() }
    }

    pub fn internal<E>(source: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Internal { source: source.into() }
    }
}

/// True when the database rejected an insert on a unique constraint.
/// Idempotency marking and refund creation rely on this to fail loudly
/// instead of silently absorbing a duplicate.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

/// Map a sqlx error, surfacing unique violations under the given conflict code.
pub fn conflict_on_unique(err: sqlx::Error, code: &'static str) -> CheckoutError {
    if is_unique_violation(&err) {
        CheckoutError::Conflict { code }
    } else {
        CheckoutError::internal(err)
    }
}

impl From<sqlx::Error> for CheckoutError {
    fn from(err: sqlx::Error) -> Self {
        CheckoutError::internal(err)
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Validation { code, message } => {
                ApiError::BadRequest { code, trace_id: None, message: Some(message) }
            }
            CheckoutError::Authorization => ApiError::Forbidden { trace_id: None },
            CheckoutError::NotFound { code } => ApiError::NotFound { code, trace_id: None },
            CheckoutError::Conflict { code } => {
                ApiError::Conflict { code, trace_id: None, message: None }
            }
            CheckoutError::SignatureVerification => ApiError::Unprocessable {
                code: "signature_verification_failed",
                trace_id: None,
                // No digests or key material in responses.
                message: Some("payment could not be verified".into()),
            },
            CheckoutError::InsufficientStock { variant_id } => ApiError::Conflict {
                code: "insufficient_stock",
                trace_id: None,
                message: Some(format!("insufficient stock for item {variant_id}")),
            },
            CheckoutError::EmptyCart => {
                ApiError::BadRequest { code: "empty_cart", trace_id: None, message: None }
            }
            CheckoutError::PriceNotFound { variant_id: _ } => {
                ApiError::NotFound { code: "price_not_found", trace_id: None }
            }
            CheckoutError::UpstreamGateway { source } => ApiError::BadGateway {
                code: "gateway_unavailable",
                trace_id: None,
                message: Some(source.to_string()),
            },
            CheckoutError::Internal { source } => ApiError::internal(source, None),
        }
    }
}

pub type CoreResult<T> = Result<T, CheckoutError>;
