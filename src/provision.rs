//! Provisioning pipeline: make sure a tenant's physical database exists, then
//! bring its schema to the latest changelog version.
//!
//! Steps run strictly in order and are not resumable: parse the target, derive
//! the admin address, create the database if absent (each engine's own way),
//! migrate. Every failure aborts the run; nothing is retried here. Registering
//! the pool afterwards is the caller's job.

use crate::config::{validate_descriptor, PoolPolicy};
use crate::engine::{CreationPlan, EngineKind};
use crate::error::{MigrationError, ProvisionError};
use crate::migration::Migrator;
use crate::pool::TenantPool;
use crate::tenant::TenantDescriptor;
use crate::url::ConnectionUrl;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A short-lived single-connection session used by one pipeline step.
#[async_trait]
pub trait AdminSession: Send {
    async fn database_exists(&mut self, probe: &str, database: &str) -> Result<bool, sqlx::Error>;
    async fn execute(&mut self, statement: &str) -> Result<(), sqlx::Error>;
    async fn migrate(&mut self, migrator: &dyn Migrator) -> Result<(), MigrationError>;
    async fn close(self: Box<Self>);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, descriptor: &TenantDescriptor, address: &str) -> Result<Box<dyn AdminSession>, sqlx::Error>;
}

/// Opens temporary one-connection pools through sqlx.
#[derive(Clone, Debug)]
pub struct SqlxConnector {
    policy: PoolPolicy,
}

impl SqlxConnector {
    pub fn new(policy: &PoolPolicy) -> Self {
        SqlxConnector {
            policy: policy.temporary(),
        }
    }
}

#[async_trait]
impl Connector for SqlxConnector {
    async fn open(&self, descriptor: &TenantDescriptor, address: &str) -> Result<Box<dyn AdminSession>, sqlx::Error> {
        let pool = TenantPool::connect(descriptor, address, &self.policy).await?;
        Ok(Box::new(TemporaryPool {
            pool,
            drain_timeout: self.policy.drain_timeout,
        }))
    }
}

struct TemporaryPool {
    pool: TenantPool,
    drain_timeout: Duration,
}

#[async_trait]
impl AdminSession for TemporaryPool {
    async fn database_exists(&mut self, probe: &str, database: &str) -> Result<bool, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        match &mut conn {
            crate::pool::TenantConnection::Postgres(c) => {
                sqlx::query_scalar::<_, bool>(probe).bind(database).fetch_one(c.as_mut()).await
            }
            _ => Err(sqlx::Error::Configuration(
                "catalog existence probe is only defined for PostgreSQL".into(),
            )),
        }
    }

    async fn execute(&mut self, statement: &str) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        conn.execute(statement).await?;
        Ok(())
    }

    async fn migrate(&mut self, migrator: &dyn Migrator) -> Result<(), MigrationError> {
        let mut conn = self.pool.acquire().await?;
        migrator.update(&mut conn).await
    }

    async fn close(self: Box<Self>) {
        if tokio::time::timeout(self.drain_timeout, self.pool.close()).await.is_err() {
            tracing::warn!("temporary provisioning pool did not close in time");
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseOutcome {
    /// Conditional DDL ran; the engine does not say whether it created anything.
    Ensured,
    Created,
    AlreadyExists,
    /// No database DDL for this engine.
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub tenant: String,
    pub engine: EngineKind,
    pub server: String,
    pub database: String,
    pub outcome: DatabaseOutcome,
    pub changelog: String,
}

pub struct ProvisioningPipeline {
    connector: Arc<dyn Connector>,
    migrator: Arc<dyn Migrator>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl ProvisioningPipeline {
    pub fn new(connector: Arc<dyn Connector>, migrator: Arc<dyn Migrator>) -> Self {
        ProvisioningPipeline {
            connector,
            migrator,
            in_flight: DashMap::new(),
        }
    }

    pub fn changelog(&self) -> &str {
        self.migrator.changelog()
    }

    /// Run the whole pipeline for `descriptor`. Runs for the same tenant name
    /// within this process are serialized; the per-name lock is dropped once
    /// no run holds or awaits it.
    pub async fn run(&self, descriptor: &TenantDescriptor) -> Result<ProvisionReport, ProvisionError> {
        let url = validate_descriptor(descriptor)?;

        let lock = self.in_flight.entry(descriptor.name.clone()).or_default().clone();
        let result = {
            let _serialized = lock.lock().await;
            self.run_serialized(descriptor, &url).await
        };
        drop(lock);
        self.in_flight
            .remove_if(&descriptor.name, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn run_serialized(
        &self,
        descriptor: &TenantDescriptor,
        url: &ConnectionUrl,
    ) -> Result<ProvisionReport, ProvisionError> {
        let engine = descriptor.engine();
        tracing::info!(
            tenant = %descriptor.name,
            engine = %engine,
            server = %url.server(),
            database = %url.database(),
            "provisioning tenant database"
        );
        let outcome = match self.ensure_database(descriptor, url, engine).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(tenant = %descriptor.name, error = %e, "database creation failed");
                return Err(e);
            }
        };
        if let Err(e) = self.apply_schema(descriptor, url).await {
            tracing::error!(tenant = %descriptor.name, error = %e, "schema migration failed");
            return Err(e);
        }
        tracing::info!(tenant = %descriptor.name, database = %url.database(), ?outcome, "tenant provisioned");

        Ok(ProvisionReport {
            tenant: descriptor.name.clone(),
            engine,
            server: url.server(),
            database: url.database().to_string(),
            outcome,
            changelog: self.migrator.changelog().to_string(),
        })
    }

    async fn ensure_database(
        &self,
        descriptor: &TenantDescriptor,
        url: &ConnectionUrl,
        engine: EngineKind,
    ) -> Result<DatabaseOutcome, ProvisionError> {
        let plan = engine.creation_plan(url.database());
        if plan == CreationPlan::Skip {
            tracing::warn!(
                tenant = %descriptor.name,
                database = %url.database(),
                "no database DDL for this engine; expecting the database to exist"
            );
            return Ok(DatabaseOutcome::Skipped);
        }
        let failed = |source: sqlx::Error| ProvisionError::DatabaseCreationFailed {
            server: url.server(),
            database: url.database().to_string(),
            source,
        };

        let mut session = self
            .connector
            .open(descriptor, &url.admin_address(engine))
            .await
            .map_err(|e| failed(e))?;
        let outcome = create_database(session.as_mut(), &plan, url.database()).await;
        session.close().await;
        outcome.map_err(failed)
    }

    async fn apply_schema(&self, descriptor: &TenantDescriptor, url: &ConnectionUrl) -> Result<(), ProvisionError> {
        let failed = |source: MigrationError| ProvisionError::MigrationFailed {
            server: url.server(),
            database: url.database().to_string(),
            changelog: self.migrator.changelog().to_string(),
            source,
        };

        let mut session = self
            .connector
            .open(descriptor, &url.tenant_address())
            .await
            .map_err(|e| failed(e.into()))?;
        let outcome = session.migrate(self.migrator.as_ref()).await;
        session.close().await;
        outcome.map_err(failed)
    }
}

async fn create_database(
    session: &mut dyn AdminSession,
    plan: &CreationPlan,
    database: &str,
) -> Result<DatabaseOutcome, sqlx::Error> {
    match plan {
        CreationPlan::Conditional { statement } => {
            session.execute(statement).await?;
            Ok(DatabaseOutcome::Ensured)
        }
        CreationPlan::CheckThenCreate { probe, create } => {
            if session.database_exists(probe, database).await? {
                tracing::info!(database, "database already exists");
                return Ok(DatabaseOutcome::AlreadyExists);
            }
            session.execute(create).await?;
            tracing::info!(database, "database created");
            Ok(DatabaseOutcome::Created)
        }
        CreationPlan::Skip => Ok(DatabaseOutcome::Skipped),
    }
}
