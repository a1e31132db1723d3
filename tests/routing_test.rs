mod common;

use common::{mark, marker, policy, registry, sqlite_tenant, SQLITE_DRIVER};
use school_tenancy::context;
use school_tenancy::error::{DescriptorError, RegistryError};
use school_tenancy::{PoolPolicy, RequestRouter, RouteError, TenantDescriptor};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn setup(policy: PoolPolicy, tenants: &[(&str, &str)]) -> (TempDir, RequestRouter) {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(registry(dir.path(), policy).await);
    for (name, file) in tenants {
        registry.upsert(&sqlite_tenant(dir.path(), name, file)).await.unwrap();
        let pool = registry.get(name).unwrap();
        let mut conn = pool.acquire().await.unwrap();
        mark(&mut conn, file).await;
    }
    (dir, RequestRouter::new(registry))
}

#[tokio::test]
async fn each_unit_of_work_reaches_its_own_database() {
    let (_dir, router) = setup(policy(), &[("a", "a.db"), ("b", "b.db")]).await;

    let seen_a = context::with_tenant("a", async {
        let mut conn = router.resolve_connection().await.unwrap();
        marker(&mut conn).await
    })
    .await;
    let seen_b = context::with_tenant("b", async {
        let mut conn = router.resolve_connection().await.unwrap();
        marker(&mut conn).await
    })
    .await;

    assert_eq!(seen_a, "a.db");
    assert_eq!(seen_b, "b.db");
}

#[tokio::test]
async fn no_tenant_routes_to_fallback() {
    let (_dir, router) = setup(policy(), &[("a", "a.db")]).await;
    let seen = context::unit_of_work(async {
        let mut conn = router.resolve_connection().await.unwrap();
        marker(&mut conn).await
    })
    .await;
    assert_eq!(seen, "registry");

    // Outside any unit of work behaves the same.
    let mut conn = router.resolve_connection().await.unwrap();
    assert_eq!(marker(&mut conn).await, "registry");
}

#[tokio::test]
async fn unknown_tenant_never_falls_back() {
    let (_dir, router) = setup(policy(), &[("a", "a.db")]).await;
    let err = context::with_tenant("ghost", router.resolve_connection()).await.unwrap_err();
    assert!(matches!(err, RouteError::TenantNotRoutable(ref name) if name == "ghost"));
}

#[tokio::test]
async fn context_does_not_leak_into_next_unit() {
    let (_dir, router) = setup(policy(), &[("a", "a.db")]).await;

    let first: Result<(), RouteError> = context::with_tenant("a", async {
        router.resolve_connection().await?;
        Err(RouteError::TenantNotRoutable("simulated failure".into()))
    })
    .await;
    assert!(first.is_err());

    let next = context::unit_of_work(async {
        assert_eq!(context::current(), None);
        let mut conn = router.resolve_connection().await.unwrap();
        marker(&mut conn).await
    })
    .await;
    assert_eq!(next, "registry");
}

#[tokio::test]
async fn replacing_a_pool_drains_the_old_one() {
    let (dir, router) = setup(policy(), &[("a", "a.db")]).await;
    let registry = router.registry().clone();
    let old = registry.get("a").unwrap();

    registry.upsert(&sqlite_tenant(dir.path(), "a", "a2.db")).await.unwrap();
    let mut conn = registry.get("a").unwrap().acquire().await.unwrap();
    mark(&mut conn, "a2.db").await;
    drop(conn);

    assert!(old.is_closed());
    assert_eq!(registry.tenant_names(), vec!["a".to_string()]);
    let seen = context::with_tenant("a", async {
        let mut conn = router.resolve_connection().await.unwrap();
        marker(&mut conn).await
    })
    .await;
    assert_eq!(seen, "a2.db");
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_pool() {
    let (_dir, router) = setup(policy(), &[("a", "a.db")]).await;
    let registry = router.registry();
    let broken = TenantDescriptor::new(
        "a",
        "sqlite:///nonexistent-school-dir/a.db",
        "",
        "",
        SQLITE_DRIVER,
    );
    let err = registry.upsert(&broken).await.unwrap_err();
    assert!(matches!(err, RegistryError::PoolBuild { ref tenant, .. } if tenant == "a"));

    let seen = context::with_tenant("a", async {
        let mut conn = router.resolve_connection().await.unwrap();
        marker(&mut conn).await
    })
    .await;
    assert_eq!(seen, "a.db");
}

#[tokio::test]
async fn removed_tenant_is_not_routable() {
    let (_dir, router) = setup(policy(), &[("a", "a.db"), ("b", "b.db")]).await;
    let registry = router.registry();
    let pool = registry.get("a").unwrap();

    assert!(registry.remove("a").await);
    assert!(pool.is_closed());
    assert!(!registry.remove("a").await);
    assert!(!registry.contains("a"));

    let err = router.resolve_for(Some("a")).await.unwrap_err();
    assert!(matches!(err, RouteError::TenantNotRoutable(_)));
    assert!(router.resolve_for(Some("b")).await.is_ok());
}

#[tokio::test]
async fn exhausted_pool_fails_fast() {
    let tight = PoolPolicy {
        max_connections: 1,
        acquire_timeout: Duration::from_millis(200),
        ..policy()
    };
    let (_dir, router) = setup(tight, &[("a", "a.db")]).await;

    let held = router.resolve_for(Some("a")).await.unwrap();
    let err = router.resolve_for(Some("a")).await.unwrap_err();
    assert!(matches!(err, RouteError::PoolExhausted { ref target } if target == "a"));
    drop(held);
    assert!(router.resolve_for(Some("a")).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upserts_leave_one_pool() {
    let (dir, router) = setup(policy(), &[]).await;
    let registry = router.registry().clone();

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let registry = registry.clone();
            let descriptor = sqlite_tenant(dir.path(), "busy", if i % 2 == 0 { "even.db" } else { "odd.db" });
            tokio::spawn(async move { registry.upsert(&descriptor).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(registry.tenant_names(), vec!["busy".to_string()]);
    let pool = registry.get("busy").unwrap();
    assert!(!pool.is_closed());
    assert!(context::with_tenant("busy", router.resolve_connection()).await.is_ok());
}

#[tokio::test]
async fn connectivity_test_never_registers() {
    let (dir, router) = setup(policy(), &[]).await;
    let registry = router.registry();

    let reachable = sqlite_tenant(dir.path(), "probe", "probe.db");
    assert!(registry.test_connectivity(&reachable).await.unwrap());
    assert!(!registry.contains("probe"));

    let unreachable = TenantDescriptor::new("probe", "sqlite:///nonexistent-school-dir/p.db", "", "", SQLITE_DRIVER);
    assert!(!registry.test_connectivity(&unreachable).await.unwrap());

    let malformed = TenantDescriptor::new("probe", "mysql://host-without-database", "u", "p", "mysql");
    let err = registry.test_connectivity(&malformed).await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Descriptor(DescriptorError::MalformedConnectionUrl(_))
    ));
}

#[tokio::test]
async fn shutdown_closes_everything() {
    let (_dir, router) = setup(policy(), &[("a", "a.db"), ("b", "b.db")]).await;
    let registry = router.registry();
    let a = registry.get("a").unwrap();
    registry.shutdown().await;
    assert!(a.is_closed());
    assert!(registry.fallback().is_closed());
    assert!(registry.tenant_names().is_empty());
}

#[tokio::test]
async fn removing_unknown_names_leaves_no_trace() {
    let (_dir, router) = setup(policy(), &[("a", "a.db")]).await;
    let registry = router.registry();
    assert_eq!(registry.slot_count(), 1);

    for i in 0..1000 {
        assert!(!registry.remove(&format!("ghost-{i}")).await);
    }
    assert_eq!(registry.slot_count(), 1);

    assert!(registry.remove("a").await);
    assert_eq!(registry.slot_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn remove_racing_upserts_settles_without_tombstones() {
    let (dir, router) = setup(policy(), &[]).await;
    let registry = router.registry().clone();

    let upserts: Vec<_> = (0..10)
        .map(|i| {
            let registry = registry.clone();
            let descriptor = sqlite_tenant(dir.path(), "flaky", &format!("flaky{i}.db"));
            tokio::spawn(async move { registry.upsert(&descriptor).await })
        })
        .collect();
    let removes: Vec<_> = (0..10)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.remove("flaky").await })
        })
        .collect();
    for handle in upserts {
        handle.await.unwrap().unwrap();
    }
    for handle in removes {
        handle.await.unwrap();
    }

    registry.remove("flaky").await;
    assert_eq!(registry.slot_count(), 0);
    assert!(!registry.contains("flaky"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upserts_of_distinct_tenants_route_independently() {
    let (dir, router) = setup(policy(), &[]).await;
    let registry = router.registry().clone();

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let registry = registry.clone();
            let descriptor = sqlite_tenant(dir.path(), &format!("t{i}"), &format!("t{i}.db"));
            tokio::spawn(async move {
                registry.upsert(&descriptor).await.unwrap();
                let mut conn = registry.get(&descriptor.name).unwrap().acquire().await.unwrap();
                mark(&mut conn, &descriptor.name).await;
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(registry.tenant_names().len(), 50);

    let checks: Vec<_> = (0..50)
        .map(|i| {
            let router = router.clone();
            let name = format!("t{i}");
            tokio::spawn(context::with_tenant(name.clone(), async move {
                let mut conn = router.resolve_connection().await.unwrap();
                (name, marker(&mut conn).await)
            }))
        })
        .collect();
    for handle in checks {
        let (name, seen) = handle.await.unwrap();
        assert_eq!(seen, name);
    }
}
