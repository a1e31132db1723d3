//! Operator server: restores every tenant pool from the registry database and
//! serves the tenant administration and workspace routes.
//!
//! Run from repo root: `cargo run -p school-tenancy-server`

use school_tenancy::{
    app, ensure_database_exists, AppState, PgTenantStore, PoolRegistry, ProvisioningPipeline, Settings,
    SqlxConnector, SqlxMigrator, TenantPool, TenantService,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("school_tenancy=info,school_tenancy_server=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    ensure_database_exists(&settings.database_url).await?;
    let master = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await?;

    let store = PgTenantStore::new(master.clone(), settings.registry_schema.clone());
    store.ensure_sys_tables().await?;

    let registry = Arc::new(PoolRegistry::new(TenantPool::Postgres(master), settings.pool.clone()));
    let pipeline = Arc::new(ProvisioningPipeline::new(
        Arc::new(SqlxConnector::new(&settings.pool)),
        Arc::new(SqlxMigrator::new(settings.changelog.clone())),
    ));
    let service = Arc::new(TenantService::new(Arc::new(store), registry.clone(), pipeline));

    let replay = service.replay().await?;
    if !replay.failed.is_empty() {
        tracing::warn!(failed = ?replay.failed, "some tenants are not routable");
    }

    let router = app(AppState::new(service), settings.body_limit);
    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("school tenancy server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    registry.shutdown().await;
    Ok(())
}
