#![allow(dead_code)]

use school_tenancy::{PoolPolicy, PoolRegistry, TenantConnection, TenantDescriptor, TenantPool};
use std::path::Path;
use std::time::Duration;

pub const SQLITE_DRIVER: &str = "org.sqlite.JDBC";

pub fn policy() -> PoolPolicy {
    PoolPolicy {
        max_connections: 2,
        min_idle: 0,
        idle_timeout: Duration::from_secs(30),
        max_lifetime: Duration::from_secs(60),
        acquire_timeout: Duration::from_secs(2),
        drain_timeout: Duration::from_secs(2),
    }
}

pub fn sqlite_url(dir: &Path, file: &str) -> String {
    format!("sqlite://{}?mode=rwc", dir.join(file).display())
}

pub fn sqlite_tenant(dir: &Path, name: &str, file: &str) -> TenantDescriptor {
    TenantDescriptor::new(name, sqlite_url(dir, file), "", "", SQLITE_DRIVER)
}

/// Registry whose fallback is `registry.db` in `dir`, with a `marker` row saying "registry".
pub async fn registry(dir: &Path, policy: PoolPolicy) -> PoolRegistry {
    let fallback = sqlite_tenant(dir, "registry", "registry.db");
    let pool = TenantPool::connect(&fallback, &sqlite_url(dir, "registry.db"), &policy)
        .await
        .unwrap();
    let mut conn = pool.acquire().await.unwrap();
    mark(&mut conn, "registry").await;
    drop(conn);
    PoolRegistry::new(pool, policy)
}

pub async fn mark(conn: &mut TenantConnection, label: &str) {
    conn.execute(&format!(
        "CREATE TABLE IF NOT EXISTS marker (label TEXT NOT NULL); DELETE FROM marker; INSERT INTO marker (label) VALUES ('{}')",
        label
    ))
    .await
    .unwrap();
}

pub async fn marker(conn: &mut TenantConnection) -> String {
    match conn {
        TenantConnection::Generic(c) => sqlx::query_scalar::<_, String>("SELECT label FROM marker")
            .fetch_one(&mut **c)
            .await
            .unwrap(),
        other => panic!("expected a sqlite connection, got {:?}", other.backend()),
    }
}
