//! School tenancy: one database per school, routed per unit of work.
//!
//! A [`PoolRegistry`] keeps one bounded pool per tenant, the [`RequestRouter`]
//! borrows from whichever pool the current [`context`] selects, and the
//! [`ProvisioningPipeline`] creates and migrates tenant databases on MySQL and
//! PostgreSQL.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod pool;
pub mod provision;
pub mod registry;
pub mod response;
pub mod router;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;
pub mod tenant;
pub mod url;

pub use config::{PoolPolicy, Settings};
pub use engine::EngineKind;
pub use error::{AppError, ConfigError, ProvisionError, RegistryError, RouteError};
pub use migration::{Migrator, SqlxMigrator};
pub use pool::{TenantConnection, TenantPool};
pub use provision::{ProvisionReport, ProvisioningPipeline, SqlxConnector};
pub use registry::PoolRegistry;
pub use router::RequestRouter;
pub use routes::app;
pub use service::{ReplaySummary, TenantService};
pub use state::AppState;
pub use store::{ensure_database_exists, MemoryTenantStore, PgTenantStore, TenantStore};
pub use tenant::TenantDescriptor;
