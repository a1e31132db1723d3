//! Request router: hands out a connection for whichever tenant the current
//! unit of work selected, or from the fallback pool when none is selected.

use crate::context;
use crate::error::RouteError;
use crate::pool::{TenantConnection, TenantPool};
use crate::registry::PoolRegistry;
use std::sync::Arc;

const FALLBACK_TARGET: &str = "registry database";
/// Lookups that land on a pool being swapped out retry against the replacement.
const MAX_ROUTE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct RequestRouter {
    registry: Arc<PoolRegistry>,
}

impl RequestRouter {
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        RequestRouter { registry }
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    /// Connection for the tenant in the current [`context`].
    pub async fn resolve_connection(&self) -> Result<TenantConnection, RouteError> {
        let tenant = context::current();
        self.resolve_for(tenant.as_deref()).await
    }

    /// Connection for an explicitly passed tenant key. A key with no pool is an
    /// error; it never falls back to the registry database.
    pub async fn resolve_for(&self, tenant: Option<&str>) -> Result<TenantConnection, RouteError> {
        let Some(name) = tenant else {
            return borrow(self.registry.fallback(), FALLBACK_TARGET).await;
        };
        let mut last_error = None;
        for _ in 0..MAX_ROUTE_ATTEMPTS {
            let pool = self
                .registry
                .get(name)
                .ok_or_else(|| RouteError::TenantNotRoutable(name.to_string()))?;
            match borrow(&pool, name).await {
                Err(RouteError::Db(sqlx::Error::PoolClosed)) => {
                    tracing::debug!(tenant = %name, "pool closed during lookup, retrying");
                    last_error = Some(RouteError::Db(sqlx::Error::PoolClosed));
                }
                other => return other,
            }
        }
        Err(last_error.unwrap_or_else(|| RouteError::TenantNotRoutable(name.to_string())))
    }
}

async fn borrow(pool: &TenantPool, target: &str) -> Result<TenantConnection, RouteError> {
    pool.acquire().await.map_err(|e| match e {
        sqlx::Error::PoolTimedOut => RouteError::PoolExhausted {
            target: target.to_string(),
        },
        other => RouteError::Db(other),
    })
}
