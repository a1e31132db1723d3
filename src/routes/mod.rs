//! Route assembly.

mod common;
mod tenants;
mod workspace;

pub use common::common_routes;
pub use tenants::tenant_routes;
pub use workspace::workspace_routes;

use crate::state::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

/// Full application router with the request body limit applied.
pub fn app(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .nest("/api/v1/tenants", tenant_routes(state.clone()))
        .nest("/api/v1/workspace", workspace_routes(state))
        .layer(RequestBodyLimitLayer::new(body_limit))
}
