//! Operator routes under /api/v1/tenants.

use crate::handlers::tenants::{activate_tenant, list_tenants, provision_tenant, remove_tenant, test_tenant};
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};

pub fn tenant_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_tenants).post(provision_tenant))
        .route("/test", post(test_tenant))
        .route("/:id/activate", post(activate_tenant))
        .route("/:name", delete(remove_tenant))
        .with_state(state)
}
