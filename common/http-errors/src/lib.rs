use axum::{http::{StatusCode, HeaderValue}, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")] pub missing_capability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub trace_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")] pub message: Option<String>,
}

/// HTTP boundary error envelope. Every variant renders as JSON with a stable
/// `code` plus an `X-Error-Code` header so error metrics stay label-safe.
#[derive(Debug)]
pub enum ApiError {
    ForbiddenMissingCapability { capability: &'static str, trace_id: Option<Uuid> },
    Forbidden { trace_id: Option<Uuid> },
    BadRequest { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    Unauthorized { code: &'static str, trace_id: Option<Uuid> },
    NotFound { code: &'static str, trace_id: Option<Uuid> },
    Conflict { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    Unprocessable { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    BadGateway { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    Internal { trace_id: Option<Uuid>, message: Option<String> },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E, trace_id: Option<Uuid>) -> Self {
        Self::Internal { trace_id, message: Some(e.to_string()) }
    }
    pub fn bad_request(code: &'static str, trace_id: Option<Uuid>) -> Self {
        Self::BadRequest { code, trace_id, message: None }
    }
    pub fn conflict(code: &'static str, trace_id: Option<Uuid>) -> Self {
        Self::Conflict { code, trace_id, message: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body, error_code) = match self {
            ApiError::ForbiddenMissingCapability { capability, trace_id } => (
                StatusCode::FORBIDDEN,
                ErrorBody { code: "missing_capability".into(), missing_capability: Some(capability.into()), trace_id, message: None },
                "missing_capability"
            ),
            ApiError::Forbidden { trace_id } => (
                StatusCode::FORBIDDEN,
                ErrorBody { code: "forbidden".into(), missing_capability: None, trace_id, message: None },
                "forbidden"
            ),
            ApiError::BadRequest { code, trace_id, message } => (
                StatusCode::BAD_REQUEST,
                ErrorBody { code: code.into(), missing_capability: None, trace_id, message },
                code
            ),
            ApiError::Unauthorized { code, trace_id } => (
                StatusCode::UNAUTHORIZED,
                ErrorBody { code: code.into(), missing_capability: None, trace_id, message: None },
                code
            ),
            ApiError::NotFound { code, trace_id } => (
                StatusCode::NOT_FOUND,
                ErrorBody { code: code.into(), missing_capability: None, trace_id, message: None },
                code
            ),
            ApiError::Conflict { code, trace_id, message } => (
                StatusCode::CONFLICT,
                ErrorBody { code: code.into(), missing_capability: None, trace_id, message },
                code
            ),
            ApiError::Unprocessable { code, trace_id, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody { code: code.into(), missing_capability: None, trace_id, message },
                code
            ),
            ApiError::BadGateway { code, trace_id, message } => (
                StatusCode::BAD_GATEWAY,
                ErrorBody { code: code.into(), missing_capability: None, trace_id, message },
                code
            ),
            ApiError::Internal { trace_id, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody { code: "internal_error".into(), missing_capability: None, trace_id, message },
                "internal_error"
            ),
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
