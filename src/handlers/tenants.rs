//! Tenant administration handlers: list, provision, test, activate, remove.

use crate::error::AppError;
use crate::response::{success_many, success_one, success_one_ok};
use crate::state::AppState;
use crate::tenant::TenantDescriptor;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

pub async fn list_tenants(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let tenants = state.service.list().await?;
    Ok(success_many(tenants))
}

/// Body: `{ "name", "url", "username", "password", "driver" }`.
pub async fn provision_tenant(
    State(state): State<AppState>,
    Json(descriptor): Json<TenantDescriptor>,
) -> Result<impl IntoResponse, AppError> {
    let provisioned = state.service.provision(descriptor).await?;
    Ok(success_one(provisioned))
}

pub async fn test_tenant(
    State(state): State<AppState>,
    Json(descriptor): Json<TenantDescriptor>,
) -> Result<impl IntoResponse, AppError> {
    let reachable = state.service.test_connectivity(&descriptor).await?;
    Ok(success_one_ok(json!({ "name": descriptor.name, "reachable": reachable })))
}

pub async fn activate_tenant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let provisioned = state.service.activate(id).await?;
    Ok(success_one_ok(provisioned))
}

pub async fn remove_tenant(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.service.remove(&name).await {
        return Err(AppError::NotFound(format!("no live pool for tenant '{}'", name)));
    }
    Ok(success_one_ok(json!({ "name": name, "removed": true })))
}
