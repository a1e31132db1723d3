//! Tenant context: which tenant the current unit of work is for.
//!
//! The context lives in a Tokio task-local that exists only inside
//! [`unit_of_work`] / [`with_tenant`]. Leaving the scope drops it on every exit
//! path (return, `?`, panic), so a task reused for the next request always
//! starts with no tenant selected. Tasks spawned from inside a unit of work do
//! not inherit it; background jobs open their own.
//!
//! ```rust,ignore
//! context::with_tenant("greenfield", async {
//!     let conn = router.resolve_connection().await?;
//!     // ...
//! })
//! .await
//! ```

use crate::error::ContextError;
use std::cell::RefCell;
use std::future::Future;

tokio::task_local! {
    static CURRENT_TENANT: RefCell<Option<String>>;
}

/// Run `f` as one unit of work with no tenant selected.
pub async fn unit_of_work<F>(f: F) -> F::Output
where
    F: Future,
{
    CURRENT_TENANT.scope(RefCell::new(None), f).await
}

/// Run `f` as one unit of work routed to `tenant`.
pub async fn with_tenant<F>(tenant: impl Into<String>, f: F) -> F::Output
where
    F: Future,
{
    CURRENT_TENANT.scope(RefCell::new(Some(tenant.into())), f).await
}

/// Select `tenant` for the rest of the current unit of work. Overwrites any
/// previous selection.
pub fn set_current(tenant: impl Into<String>) -> Result<(), ContextError> {
    let tenant = tenant.into();
    CURRENT_TENANT
        .try_with(|cell| {
            cell.replace(Some(tenant));
        })
        .map_err(|_| ContextError::OutsideUnitOfWork)
}

pub fn current() -> Option<String> {
    CURRENT_TENANT.try_with(|cell| cell.borrow().clone()).ok().flatten()
}

/// Drop the selection; later lookups in this unit of work use the fallback pool.
pub fn clear() {
    let _ = CURRENT_TENANT.try_with(|cell| cell.borrow_mut().take());
}

/// Select a tenant until the guard is dropped.
pub fn enter(tenant: impl Into<String>) -> Result<TenantGuard, ContextError> {
    set_current(tenant)?;
    Ok(TenantGuard { _private: () })
}

/// Clears the tenant selection on drop.
#[must_use = "the tenant is cleared as soon as the guard is dropped"]
pub struct TenantGuard {
    _private: (),
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        clear();
    }
}
