mod common;

use common::{policy, registry, sqlite_tenant, SQLITE_DRIVER};
use school_tenancy::provision::DatabaseOutcome;
use school_tenancy::store::TenantStore;
use school_tenancy::{
    context, AppError, MemoryTenantStore, ProvisionError, ProvisioningPipeline, RequestRouter, SqlxConnector,
    SqlxMigrator, TenantConnection, TenantDescriptor, TenantService,
};
use std::sync::Arc;

const CHANGELOG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/tenant");

fn pipeline() -> Arc<ProvisioningPipeline> {
    Arc::new(ProvisioningPipeline::new(
        Arc::new(SqlxConnector::new(&policy())),
        Arc::new(SqlxMigrator::new(CHANGELOG)),
    ))
}

async fn applied_versions(conn: &mut TenantConnection) -> Vec<i64> {
    match conn {
        TenantConnection::Generic(c) => sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations ORDER BY version")
            .fetch_all(&mut **c)
            .await
            .unwrap(),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn pipeline_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline();
    let tenant = sqlite_tenant(dir.path(), "greenfield", "greenfield.db");

    let first = pipeline.run(&tenant).await.unwrap();
    let second = pipeline.run(&tenant).await.unwrap();
    assert_eq!(first.outcome, DatabaseOutcome::Skipped);
    assert_eq!(second.database, "greenfield.db");
    assert_eq!(second.changelog, CHANGELOG);

    let registry = registry(dir.path(), policy()).await;
    registry.upsert(&tenant).await.unwrap();
    let mut conn = registry.get("greenfield").unwrap().acquire().await.unwrap();
    assert_eq!(applied_versions(&mut conn).await, vec![1, 2]);
}

#[tokio::test]
async fn missing_changelog_is_a_migration_failure() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = ProvisioningPipeline::new(
        Arc::new(SqlxConnector::new(&policy())),
        Arc::new(SqlxMigrator::new(dir.path().join("no-such-changelog").display().to_string())),
    );
    let err = pipeline
        .run(&sqlite_tenant(dir.path(), "a", "a.db"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::MigrationFailed { ref database, .. } if database == "a.db"));
}

#[tokio::test]
async fn provision_saves_and_registers() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryTenantStore::new());
    let registry = Arc::new(registry(dir.path(), policy()).await);
    let service = TenantService::new(store.clone(), registry.clone(), pipeline());

    let provisioned = service
        .provision(sqlite_tenant(dir.path(), "riverside", "riverside.db"))
        .await
        .unwrap();
    assert!(provisioned.tenant.routable);
    assert_eq!(provisioned.tenant.id, Some(1));
    assert_eq!(store.find_all().await.unwrap().len(), 1);

    let router = RequestRouter::new(registry);
    let count = context::with_tenant("riverside", async {
        match router.resolve_connection().await.unwrap() {
            TenantConnection::Generic(mut c) => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students")
                .fetch_one(&mut *c)
                .await
                .unwrap(),
            _ => unreachable!(),
        }
    })
    .await;
    assert_eq!(count, 0);
}

#[tokio::test]
async fn failed_provision_registers_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryTenantStore::new());
    let registry = Arc::new(registry(dir.path(), policy()).await);
    let service = TenantService::new(store.clone(), registry.clone(), pipeline());

    let broken = TenantDescriptor::new("broken", "sqlite:///nonexistent-school-dir/b.db", "", "", SQLITE_DRIVER);
    let err = service.provision(broken).await.unwrap_err();
    assert!(matches!(err, AppError::Provision(ProvisionError::MigrationFailed { .. })));
    assert!(store.find_all().await.unwrap().is_empty());
    assert!(!registry.contains("broken"));
}

#[tokio::test]
async fn activate_migrates_and_installs_stored_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryTenantStore::new());
    let saved = store
        .save(&sqlite_tenant(dir.path(), "hilltop", "hilltop.db"))
        .await
        .unwrap();
    let registry = Arc::new(registry(dir.path(), policy()).await);
    let service = TenantService::new(store, registry.clone(), pipeline());

    let id = saved.id.unwrap();
    let activated = service.activate(id).await.unwrap();
    assert_eq!(activated.tenant.name, "hilltop");
    assert!(registry.contains("hilltop"));

    let err = service.activate(id + 100).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn replay_skips_broken_tenants() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryTenantStore::new());
    store.save(&sqlite_tenant(dir.path(), "a", "a.db")).await.unwrap();
    store
        .save(&TenantDescriptor::new("gone", "sqlite:///nonexistent-school-dir/g.db", "", "", SQLITE_DRIVER))
        .await
        .unwrap();
    store.save(&sqlite_tenant(dir.path(), "b", "b.db")).await.unwrap();

    let registry = Arc::new(registry(dir.path(), policy()).await);
    let service = TenantService::new(store, registry.clone(), pipeline());
    let summary = service.replay().await.unwrap();

    assert_eq!(summary.loaded, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(summary.failed, vec!["gone".to_string()]);
    assert_eq!(registry.tenant_names(), vec!["a".to_string(), "b".to_string()]);

    let listed = service.list().await.unwrap();
    let gone = listed.iter().find(|t| t.name == "gone").unwrap();
    assert!(!gone.routable);
}

#[tokio::test]
async fn replay_with_no_tenants_is_fine() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(registry(dir.path(), policy()).await);
    let service = TenantService::new(Arc::new(MemoryTenantStore::new()), registry, pipeline());
    let summary = service.replay().await.unwrap();
    assert!(summary.loaded.is_empty() && summary.failed.is_empty());
}
