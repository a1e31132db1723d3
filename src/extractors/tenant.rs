//! Tenant selection from the request: the `X-Tenant-ID` header, and the
//! middleware that runs each request as one tenant unit of work.

use crate::context;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

/// Header name for tenant id.
pub const TENANT_ID_HEADER: &str = "X-Tenant-ID";

/// Optional tenant id from the `X-Tenant-ID` header; blank counts as absent.
#[derive(Clone, Debug)]
pub struct TenantId(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for TenantId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(TENANT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(TenantId(value))
    }
}

/// Run the rest of the request inside a tenant unit of work. The selection is
/// gone once the response is produced, whatever the handler did.
pub async fn tenant_scope(TenantId(tenant): TenantId, request: Request, next: Next) -> Response {
    match tenant {
        Some(tenant) => context::with_tenant(tenant, next.run(request)).await,
        None => context::unit_of_work(next.run(request)).await,
    }
}
