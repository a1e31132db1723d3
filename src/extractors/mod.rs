//! Request extractors and request-scoped middleware.

pub mod tenant;
pub use tenant::{tenant_scope, TenantId, TENANT_ID_HEADER};
