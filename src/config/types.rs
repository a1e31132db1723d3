//! Runtime settings and the per-tenant pool sizing policy.

use sqlx::pool::PoolOptions;
use sqlx::Database;
use std::time::Duration;

/// Deadline for the connectivity probe's borrow-and-ping.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct Settings {
    /// Registry database: descriptor store and fallback pool.
    pub database_url: String,
    pub bind_addr: String,
    /// Changelog identifier handed to the migration engine.
    pub changelog: String,
    /// Schema holding `_sys_tenants` in the registry database.
    pub registry_schema: String,
    pub pool: PoolPolicy,
    pub body_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "postgres://localhost/school_registry".into(),
            bind_addr: "0.0.0.0:3000".into(),
            changelog: "migrations/tenant".into(),
            registry_schema: "tenancy".into(),
            pool: PoolPolicy::default(),
            body_limit: 64 * 1024,
        }
    }
}

/// Bounded pool with an idle floor, idle/lifetime ceilings and a fail-fast borrow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolPolicy {
    pub max_connections: u32,
    pub min_idle: u32,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub acquire_timeout: Duration,
    /// How long closing a pool waits for checked-out connections.
    pub drain_timeout: Duration,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        PoolPolicy {
            max_connections: 10,
            min_idle: 2,
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(1800),
            acquire_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolPolicy {
    /// Pool options for any engine. Connections are pinged before each borrow.
    pub fn options<DB: Database>(&self) -> PoolOptions<DB> {
        PoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_idle.min(self.max_connections))
            .idle_timeout(Some(self.idle_timeout))
            .max_lifetime(Some(self.max_lifetime))
            .acquire_timeout(self.acquire_timeout)
            .test_before_acquire(true)
    }

    /// Single-connection, no idle floor. Used for provisioning's temporary pools.
    pub fn temporary(&self) -> Self {
        PoolPolicy {
            max_connections: 1,
            min_idle: 0,
            ..self.clone()
        }
    }

    /// Throwaway connectivity-probe policy with a short deadline.
    pub fn probe(&self) -> Self {
        PoolPolicy {
            acquire_timeout: PROBE_TIMEOUT.min(self.acquire_timeout),
            drain_timeout: PROBE_TIMEOUT,
            ..self.temporary()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_sizing_rules() {
        let p = PoolPolicy::default();
        assert_eq!(p.max_connections, 10);
        assert_eq!(p.min_idle, 2);
        assert_eq!(p.acquire_timeout, Duration::from_secs(10));
    }

    #[test]
    fn probe_is_single_connection_short_deadline() {
        let p = PoolPolicy::default().probe();
        assert_eq!(p.max_connections, 1);
        assert_eq!(p.min_idle, 0);
        assert_eq!(p.acquire_timeout, PROBE_TIMEOUT);
    }
}
