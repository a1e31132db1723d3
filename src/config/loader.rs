//! Load settings from the process environment (after `dotenvy::dotenv()`).

use crate::config::types::{PoolPolicy, Settings};
use crate::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let pool_defaults = PoolPolicy::default();
        let text = |key: &str, default: String| lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or(default);

        let pool = PoolPolicy {
            max_connections: parse(&lookup, "TENANT_POOL_MAX", pool_defaults.max_connections)?,
            min_idle: parse(&lookup, "TENANT_POOL_MIN_IDLE", pool_defaults.min_idle)?,
            idle_timeout: secs(&lookup, "TENANT_POOL_IDLE_TIMEOUT_SECS", pool_defaults.idle_timeout)?,
            max_lifetime: secs(&lookup, "TENANT_POOL_MAX_LIFETIME_SECS", pool_defaults.max_lifetime)?,
            acquire_timeout: secs(&lookup, "TENANT_POOL_ACQUIRE_TIMEOUT_SECS", pool_defaults.acquire_timeout)?,
            drain_timeout: secs(&lookup, "TENANT_POOL_DRAIN_TIMEOUT_SECS", pool_defaults.drain_timeout)?,
        };
        if pool.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "TENANT_POOL_MAX",
                value: "0".into(),
            });
        }

        let registry_schema = text("TENANCY_SCHEMA", defaults.registry_schema);
        if !registry_schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::Invalid {
                key: "TENANCY_SCHEMA",
                value: registry_schema,
            });
        }

        Ok(Settings {
            database_url: text("DATABASE_URL", defaults.database_url),
            bind_addr: text("BIND_ADDR", defaults.bind_addr),
            changelog: text("TENANT_CHANGELOG", defaults.changelog),
            registry_schema,
            pool,
            body_limit: parse(&lookup, "REQUEST_BODY_LIMIT", defaults.body_limit)?,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        _ => Ok(default),
    }
}

fn secs<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse(lookup, key, default.as_secs()).map(Duration::from_secs)
}
