//! Shared application state for all routes.

use crate::router::RequestRouter;
use crate::service::TenantService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TenantService>,
    /// Resolves connections for tenant-scoped routes.
    pub router: RequestRouter,
}

impl AppState {
    pub fn new(service: Arc<TenantService>) -> Self {
        let router = RequestRouter::new(service.registry().clone());
        AppState { service, router }
    }
}
