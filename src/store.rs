//! Tenant Descriptor Store. Descriptors live in `<schema>._sys_tenants` in the
//! registry database; the schema name comes from `TENANCY_SCHEMA` (default `tenancy`).

use crate::engine::EngineKind;
use crate::error::StoreError;
use crate::tenant::TenantDescriptor;
use crate::url::ConnectionUrl;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection, FromRow, PgPool};
use std::str::FromStr;
use std::sync::RwLock;

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<TenantDescriptor>, StoreError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<TenantDescriptor>, StoreError>;
    /// Insert, or overwrite the row with the same name. Returns the stored row with its id.
    async fn save(&self, descriptor: &TenantDescriptor) -> Result<TenantDescriptor, StoreError>;
}

#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
    schema: String,
}

#[derive(FromRow)]
struct TenantRow {
    id: i64,
    name: String,
    url: String,
    username: String,
    password: String,
    driver: String,
}

impl From<TenantRow> for TenantDescriptor {
    fn from(row: TenantRow) -> Self {
        TenantDescriptor {
            id: Some(row.id),
            name: row.name,
            url: row.url,
            username: row.username,
            password: row.password,
            driver: row.driver,
        }
    }
}

const COLUMNS: &str = "id, name, url, username, password, driver";

impl PgTenantStore {
    /// `schema` must already be a plain identifier; the loader checks it.
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgTenantStore {
            pool,
            schema: schema.into(),
        }
    }

    fn table(&self) -> String {
        format!("{}._sys_tenants", self.schema)
    }

    /// Create the schema and `_sys_tenants` if missing.
    pub async fn ensure_sys_tables(&self) -> Result<(), StoreError> {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema))
            .execute(&self.pool)
            .await?;
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                username TEXT NOT NULL DEFAULT '',
                password TEXT NOT NULL DEFAULT '',
                driver TEXT NOT NULL DEFAULT '',
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.table()
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn find_all(&self) -> Result<Vec<TenantDescriptor>, StoreError> {
        let rows: Vec<TenantRow> = sqlx::query_as(&format!("SELECT {} FROM {} ORDER BY id", COLUMNS, self.table()))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(TenantDescriptor::from).collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<TenantDescriptor>, StoreError> {
        let row: Option<TenantRow> = sqlx::query_as(&format!("SELECT {} FROM {} WHERE id = $1", COLUMNS, self.table()))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(TenantDescriptor::from))
    }

    async fn save(&self, descriptor: &TenantDescriptor) -> Result<TenantDescriptor, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO {} (name, url, username, password, driver, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (name) DO UPDATE SET
                url = EXCLUDED.url,
                username = EXCLUDED.username,
                password = EXCLUDED.password,
                driver = EXCLUDED.driver,
                updated_at = NOW()
            RETURNING {}
            "#,
            self.table(),
            COLUMNS
        );
        let row: TenantRow = sqlx::query_as(&sql)
            .bind(&descriptor.name)
            .bind(&descriptor.url)
            .bind(&descriptor.username)
            .bind(&descriptor.password)
            .bind(&descriptor.driver)
            .fetch_one(&self.pool)
            .await?;
        tracing::debug!(tenant = %row.name, id = row.id, "tenant descriptor saved");
        Ok(row.into())
    }
}

/// Process-local store, for tests and single-node experiments.
#[derive(Default)]
pub struct MemoryTenantStore {
    rows: RwLock<Vec<TenantDescriptor>>,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn find_all(&self) -> Result<Vec<TenantDescriptor>, StoreError> {
        Ok(self.rows.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<TenantDescriptor>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        Ok(rows.iter().find(|d| d.id == Some(id)).cloned())
    }

    async fn save(&self, descriptor: &TenantDescriptor) -> Result<TenantDescriptor, StoreError> {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = rows.iter_mut().find(|d| d.name == descriptor.name) {
            let id = existing.id;
            *existing = TenantDescriptor { id, ..descriptor.clone() };
            return Ok(existing.clone());
        }
        let next = rows.iter().filter_map(|d| d.id).max().unwrap_or(0) + 1;
        let stored = TenantDescriptor {
            id: Some(next),
            ..descriptor.clone()
        };
        rows.push(stored.clone());
        Ok(stored)
    }
}

/// Create the registry database itself if `database_url` names one that does
/// not exist yet. Connects to the server's `postgres` database to do so.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
    let url = ConnectionUrl::parse(database_url).map_err(|e| StoreError::Config(e.to_string()))?;
    let database = url.database();
    if database == "postgres" {
        return Ok(());
    }
    let engine = EngineKind::PostgresFamily;
    let opts = PgConnectOptions::from_str(&url.admin_address(engine)).map_err(StoreError::Db)?;
    let mut conn = opts.connect().await?;
    let created = create_if_missing(&mut conn, database, engine).await;
    let closed = conn.close().await;
    if created? {
        tracing::info!(server = %url.server(), database, "registry database created");
    }
    closed?;
    Ok(())
}

async fn create_if_missing(conn: &mut PgConnection, database: &str, engine: EngineKind) -> Result<bool, StoreError> {
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(database)
        .fetch_one(&mut *conn)
        .await?;
    if exists.0 {
        return Ok(false);
    }
    sqlx::query(&format!("CREATE DATABASE {}", engine.quote_ident(database)))
        .execute(&mut *conn)
        .await?;
    Ok(true)
}
