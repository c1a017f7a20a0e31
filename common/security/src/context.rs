use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};
use common_http_errors::ApiError;
use serde::{Deserialize, Serialize};
use tracing::Span;
use uuid::Uuid;

use crate::roles::Role;

/// Identity resolved by the upstream session layer and forwarded as verified
/// headers. Session issuance itself is an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub user_id: Uuid,
    pub roles: Vec<Role>,
    pub trace_id: Option<Uuid>,
}

pub struct SecurityCtxExtractor(pub SecurityContext);

fn user_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers.get("X-User-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn roles_from_headers(headers: &HeaderMap) -> Vec<Role> {
    headers
        .get("X-Roles")
        .and_then(|v| v.to_str().ok())
        .map(|csv| {
            csv.split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .filter_map(|s| s.parse::<Role>().ok())
                .collect()
        })
        .unwrap_or_default()
}

fn trace_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers.get("X-Trace-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

#[async_trait]
impl<S> FromRequestParts<S> for SecurityCtxExtractor where S: Send + Sync {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let user_id = user_from_headers(headers)
            .ok_or(ApiError::Unauthorized { code: "missing_user", trace_id: None })?;
        let roles = roles_from_headers(headers);
        let trace_id = trace_id_from_headers(headers).or_else(|| Some(Uuid::new_v4()));

        Span::current().record("user_id", tracing::field::display(user_id));
        if let Some(tid) = trace_id.as_ref() {
            Span::current().record("trace_id", tracing::field::display(tid));
        }

        Ok(SecurityCtxExtractor(SecurityContext { user_id, roles, trace_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn extractor_requires_user_header() {
        let req = Request::builder().uri("/").body(()).unwrap();
        let (mut parts, _) = req.into_parts();
        let result = SecurityCtxExtractor::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err(), "missing X-User-ID should reject");
    }

    #[tokio::test]
    async fn extractor_parses_roles_csv() {
        let req = Request::builder()
            .uri("/")
            .header("X-User-ID", Uuid::new_v4().to_string())
            .header("X-Roles", "customer, retailer")
            .body(())
            .unwrap();
        let (mut parts, _) = req.into_parts();
        let SecurityCtxExtractor(ctx) =
            SecurityCtxExtractor::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.roles, vec![Role::Customer, Role::Retailer]);
    }
}
