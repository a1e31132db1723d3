//! Tenant connection descriptors, as persisted in the registry database.

use crate::engine::EngineKind;
use crate::error::DescriptorError;
use crate::url::ConnectionUrl;
use serde::{Deserialize, Serialize};

/// Connection details for one school. Immutable once a pool is built from it:
/// changing any field means building a replacement pool.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Routing key and pool name.
    pub name: String,
    /// e.g. `jdbc:mysql://localhost:3306/school_a` or `postgres://db:5432/school_b`.
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Driver/engine identifier such as `com.mysql.cj.jdbc.Driver` or `org.postgresql.Driver`.
    #[serde(default, alias = "driverClass", alias = "driver_class")]
    pub driver: String,
}

impl TenantDescriptor {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        driver: impl Into<String>,
    ) -> Self {
        TenantDescriptor {
            id: None,
            name: name.into(),
            url: url.into(),
            username: username.into(),
            password: password.into(),
            driver: driver.into(),
        }
    }

    /// Engine family from the driver identifier; falls back to the URL scheme
    /// only when no driver identifier was given.
    pub fn engine(&self) -> EngineKind {
        if self.driver.trim().is_empty() {
            let scheme = ConnectionUrl::parse(&self.url)
                .map(|u| u.scheme().to_string())
                .unwrap_or_default();
            return EngineKind::classify(&scheme);
        }
        EngineKind::classify(&self.driver)
    }

    pub fn connection_url(&self) -> Result<ConnectionUrl, DescriptorError> {
        ConnectionUrl::parse(&self.url)
    }
}

impl std::fmt::Debug for TenantDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let server = self
            .connection_url()
            .map(|u| format!("{}/{}", u.server(), u.database()))
            .unwrap_or_else(|_| "<malformed>".into());
        f.debug_struct("TenantDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("url", &server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("driver", &self.driver)
            .finish()
    }
}
