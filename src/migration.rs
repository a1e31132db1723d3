//! Versioned schema migration of tenant databases.
//!
//! The pipeline treats the engine as a black box: it hands over a live
//! connection and asks for "update to latest". The sqlx-backed engine keeps its
//! own applied-version and checksum bookkeeping in each tenant database, so
//! reruns only apply what is missing.

use crate::error::MigrationError;
use crate::pool::{DbFuture, TenantConnection};
use async_trait::async_trait;
use sqlx::AnyConnection;
use sqlx::migrate::MigrateError;
use sqlx::mysql::MySqlConnection;
use sqlx::postgres::PgConnection;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait Migrator: Send + Sync {
    /// The fixed changelog this engine was loaded with.
    fn changelog(&self) -> &str;

    /// Apply every pending changeset. Partial application is an error.
    async fn update(&self, conn: &mut TenantConnection) -> Result<(), MigrationError>;
}

/// Changelog on disk laid out as `<changelog>/<backend>/<version>_<name>.sql`,
/// one directory per backend (`mysql`, `postgresql`, `sqlite`).
#[derive(Clone, Debug)]
pub struct SqlxMigrator {
    changelog: String,
    root: PathBuf,
}

impl SqlxMigrator {
    pub fn new(changelog: impl Into<String>) -> Self {
        let changelog = changelog.into();
        SqlxMigrator {
            root: PathBuf::from(&changelog),
            changelog,
        }
    }

    pub fn dialect_dir(&self, backend: &str) -> PathBuf {
        self.root.join(backend)
    }
}

#[async_trait]
impl Migrator for SqlxMigrator {
    fn changelog(&self) -> &str {
        &self.changelog
    }

    async fn update(&self, conn: &mut TenantConnection) -> Result<(), MigrationError> {
        let dir = self.dialect_dir(&conn.backend());
        let migrator = load(&dir).await?;
        tracing::debug!(changelog = %self.changelog, dir = %dir.display(), known = migrator.iter().count(), "running migrations");
        match conn {
            TenantConnection::MySql(c) => run_mysql(&migrator, c.as_mut()).await?,
            TenantConnection::Postgres(c) => run_postgres(&migrator, c.as_mut()).await?,
            TenantConnection::Generic(c) => run_generic(&migrator, c.as_mut()).await?,
        }
        Ok(())
    }
}

async fn load(dir: &Path) -> Result<sqlx::migrate::Migrator, MigrationError> {
    Ok(sqlx::migrate::Migrator::new(dir).await?)
}

fn run_mysql<'a>(migrator: &'a sqlx::migrate::Migrator, conn: &'a mut MySqlConnection) -> DbFuture<'a, (), MigrateError> {
    Box::pin(migrator.run_direct(conn))
}

fn run_postgres<'a>(migrator: &'a sqlx::migrate::Migrator, conn: &'a mut PgConnection) -> DbFuture<'a, (), MigrateError> {
    Box::pin(migrator.run_direct(conn))
}

fn run_generic<'a>(migrator: &'a sqlx::migrate::Migrator, conn: &'a mut AnyConnection) -> DbFuture<'a, (), MigrateError> {
    Box::pin(migrator.run_direct(conn))
}
