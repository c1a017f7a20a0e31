use common_http_errors::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("missing user identity")]
    MissingUser,
    #[error("forbidden - missing required role or capability")]
    Forbidden,
}

impl From<SecurityError> for ApiError {
    fn from(e: SecurityError) -> Self {
        match e {
            SecurityError::MissingUser => ApiError::Unauthorized { code: "missing_user", trace_id: None },
            SecurityError::Forbidden => ApiError::Forbidden { trace_id: None },
        }
    }
}
