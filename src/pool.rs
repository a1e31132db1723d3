//! Per-tenant connection pools. One pool per engine family; the profile from
//! [`EngineKind::profile`] is applied to the connect options before the pool
//! is built.

use crate::config::PoolPolicy;
use crate::engine::{EngineKind, EngineProfile};
use crate::tenant::TenantDescriptor;
use sqlx::any::AnyConnectOptions;
use sqlx::AnyConnection;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool};
use sqlx::{Any, Connection, MySql, Pool, Postgres};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

/// A bounded pool bound to one tenant database. Cloning shares the same pool.
#[derive(Clone, Debug)]
pub enum TenantPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    /// Engines without a tuning profile, through sqlx's runtime-dispatched driver.
    Generic(Pool<Any>),
}

/// A connection borrowed from a [`TenantPool`]; returned to its pool on drop.
#[derive(Debug)]
pub enum TenantConnection {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    Generic(PoolConnection<Any>),
}

impl TenantPool {
    /// Build and warm a pool for `descriptor` against `address`
    /// (the tenant address, or an admin address during provisioning).
    pub async fn connect(
        descriptor: &TenantDescriptor,
        address: &str,
        policy: &PoolPolicy,
    ) -> Result<Self, sqlx::Error> {
        let engine = descriptor.engine();
        match engine {
            EngineKind::MySqlFamily => {
                let mut opts = MySqlConnectOptions::from_str(address)?;
                if !descriptor.username.is_empty() {
                    opts = opts.username(&descriptor.username).password(&descriptor.password);
                }
                if let Some(profile) = engine.profile() {
                    opts = tune_mysql(opts, profile);
                }
                let pool = policy.options::<MySql>().connect_with(opts).await?;
                Ok(TenantPool::MySql(pool))
            }
            EngineKind::PostgresFamily => {
                let mut opts = PgConnectOptions::from_str(address)?
                    .application_name(&format!("school-tenancy/{}", descriptor.name));
                if !descriptor.username.is_empty() {
                    opts = opts.username(&descriptor.username).password(&descriptor.password);
                }
                if let Some(profile) = engine.profile() {
                    opts = tune_postgres(opts, profile);
                }
                let pool = policy.options::<Postgres>().connect_with(opts).await?;
                Ok(TenantPool::Postgres(pool))
            }
            EngineKind::Unknown => {
                sqlx::any::install_default_drivers();
                let opts = AnyConnectOptions::from_str(address)?;
                let pool = policy.options::<Any>().connect_with(opts).await?;
                Ok(TenantPool::Generic(pool))
            }
        }
    }

    pub fn engine(&self) -> EngineKind {
        match self {
            TenantPool::MySql(_) => EngineKind::MySqlFamily,
            TenantPool::Postgres(_) => EngineKind::PostgresFamily,
            TenantPool::Generic(_) => EngineKind::Unknown,
        }
    }

    /// Borrow a connection; waits at most the pool's acquire timeout.
    pub async fn acquire(&self) -> Result<TenantConnection, sqlx::Error> {
        Ok(match self {
            TenantPool::MySql(p) => TenantConnection::MySql(p.acquire().await?),
            TenantPool::Postgres(p) => TenantConnection::Postgres(p.acquire().await?),
            TenantPool::Generic(p) => TenantConnection::Generic(p.acquire().await?),
        })
    }

    /// Stop lending connections and wait until every connection is closed.
    pub async fn close(&self) {
        match self {
            TenantPool::MySql(p) => p.close().await,
            TenantPool::Postgres(p) => p.close().await,
            TenantPool::Generic(p) => p.close().await,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            TenantPool::MySql(p) => p.is_closed(),
            TenantPool::Postgres(p) => p.is_closed(),
            TenantPool::Generic(p) => p.is_closed(),
        }
    }

    /// Open connections, idle or in use.
    pub fn size(&self) -> u32 {
        match self {
            TenantPool::MySql(p) => p.size(),
            TenantPool::Postgres(p) => p.size(),
            TenantPool::Generic(p) => p.size(),
        }
    }

    pub fn num_idle(&self) -> usize {
        match self {
            TenantPool::MySql(p) => p.num_idle(),
            TenantPool::Postgres(p) => p.num_idle(),
            TenantPool::Generic(p) => p.num_idle(),
        }
    }
}

impl TenantConnection {
    pub async fn ping(&mut self) -> Result<(), sqlx::Error> {
        match self {
            TenantConnection::MySql(c) => c.ping().await,
            TenantConnection::Postgres(c) => c.ping().await,
            TenantConnection::Generic(c) => c.ping().await,
        }
    }

    /// Run one or more statements with the text protocol; returns rows affected.
    pub async fn execute(&mut self, sql: &str) -> Result<u64, sqlx::Error> {
        match self {
            TenantConnection::MySql(c) => execute_mysql(c.as_mut(), sql).await,
            TenantConnection::Postgres(c) => execute_postgres(c.as_mut(), sql).await,
            TenantConnection::Generic(c) => execute_generic(c.as_mut(), sql).await,
        }
    }

    /// Backend name as the migration changelog spells it: `mysql`, `postgresql`, `sqlite`.
    pub fn backend(&self) -> String {
        match self {
            TenantConnection::MySql(_) => "mysql".into(),
            TenantConnection::Postgres(_) => "postgresql".into(),
            TenantConnection::Generic(c) => c.backend_name().to_ascii_lowercase(),
        }
    }
}

/// Borrow, ping within the probe deadline, and close: never touches any registry.
pub async fn probe_connectivity(descriptor: &TenantDescriptor, address: &str, policy: &PoolPolicy) -> bool {
    let probe = policy.probe();
    let pool = match TenantPool::connect(descriptor, address, &probe).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::debug!(tenant = %descriptor.name, error = %e, "connectivity probe could not connect");
            return false;
        }
    };
    let check = async {
        let mut conn = pool.acquire().await?;
        conn.ping().await?;
        Ok::<_, sqlx::Error>(())
    };
    let healthy = match tokio::time::timeout(probe.acquire_timeout, check).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(tenant = %descriptor.name, error = %e, "connectivity probe failed");
            false
        }
        Err(_) => {
            tracing::debug!(tenant = %descriptor.name, "connectivity probe timed out");
            false
        }
    };
    if tokio::time::timeout(probe.drain_timeout, pool.close()).await.is_err() {
        tracing::warn!(tenant = %descriptor.name, "connectivity probe pool did not close in time");
    }
    healthy
}

/// A database future boxed at a concrete borrow lifetime. sqlx's generic
/// executor futures fail the `Send` check inside `async_trait` and axum
/// handlers when held across an await directly.
pub(crate) type DbFuture<'a, T, E = sqlx::Error> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

fn execute_mysql<'a>(conn: &'a mut MySqlConnection, sql: &'a str) -> DbFuture<'a, u64> {
    Box::pin(async move { Ok(sqlx::Executor::execute(conn, sqlx::raw_sql(sql)).await?.rows_affected()) })
}

fn execute_postgres<'a>(conn: &'a mut PgConnection, sql: &'a str) -> DbFuture<'a, u64> {
    Box::pin(async move { Ok(sqlx::Executor::execute(conn, sqlx::raw_sql(sql)).await?.rows_affected()) })
}

fn execute_generic<'a>(conn: &'a mut AnyConnection, sql: &'a str) -> DbFuture<'a, u64> {
    Box::pin(async move { Ok(sqlx::Executor::execute(conn, sqlx::raw_sql(sql)).await?.rows_affected()) })
}

fn tune_mysql(mut opts: MySqlConnectOptions, profile: &EngineProfile) -> MySqlConnectOptions {
    opts = opts.statement_cache_capacity(profile.statement_cache_capacity);
    if let Some(charset) = profile.charset {
        opts = opts.charset(charset);
    }
    if let Some(collation) = profile.collation {
        opts = opts.collation(collation);
    }
    opts
}

fn tune_postgres(opts: PgConnectOptions, profile: &EngineProfile) -> PgConnectOptions {
    opts.statement_cache_capacity(profile.statement_cache_capacity)
        .options(profile.session_options.iter().copied())
}
