//! Tenant-scoped routes under /api/v1/workspace. Every request is one unit of work.

use crate::extractors::tenant_scope;
use crate::handlers::workspace::{add_student, list_students, submit_attendance, whoami};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub fn workspace_routes(state: AppState) -> Router {
    Router::new()
        .route("/students", get(list_students).post(add_student))
        .route("/attendance", post(submit_attendance))
        .route("/whoami", get(whoami))
        .layer(middleware::from_fn(tenant_scope))
        .with_state(state)
}
