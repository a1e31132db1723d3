//! Connection-string handling: `<scheme>://<host>:<port>/<database>[?<options>]`.
//!
//! Splits a tenant URL into its server root and database name, and rebuilds the
//! two addresses provisioning needs: the admin address (server root, rooted at
//! the engine's maintenance database) and the tenant address.

use crate::engine::EngineKind;
use crate::error::DescriptorError;

const JDBC_PREFIX: &str = "jdbc:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionUrl {
    scheme: String,
    /// `host:port`, never user-info.
    host: String,
    /// Everything up to and including the last `/` of the path.
    root: String,
    database: String,
    query: Option<String>,
}

impl ConnectionUrl {
    pub fn parse(raw: &str) -> Result<Self, DescriptorError> {
        let trimmed = raw.trim();
        let url = match trimmed.get(..JDBC_PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(JDBC_PREFIX) => &trimmed[JDBC_PREFIX.len()..],
            _ => trimmed,
        };
        let scheme_end = url
            .find("://")
            .filter(|&i| i > 0)
            .ok_or_else(|| DescriptorError::MalformedConnectionUrl("missing scheme".into()))?;
        let scheme = &url[..scheme_end];
        let rest = &url[scheme_end + 3..];

        // User-info may contain '?' or '#', so it comes off before the query does.
        let authority_end = rest.find('/').unwrap_or(rest.len());
        let (user_info, rest) = match rest[..authority_end].rfind('@') {
            Some(at) => (Some(&rest[..at]), &rest[at + 1..]),
            None => (None, rest),
        };
        let (address, query) = match rest.split_once('?') {
            Some((address, query)) => (address, Some(query)),
            None => (rest, None),
        };
        let Some(split) = address.rfind('/').map(|i| i + 1) else {
            return Err(DescriptorError::MalformedConnectionUrl(format!(
                "no database segment in {}://{}",
                scheme, address
            )));
        };
        let database = address[split..].trim();
        if database.is_empty() {
            return Err(DescriptorError::MalformedConnectionUrl(format!(
                "no database segment in {}://{}",
                scheme,
                &address[..split]
            )));
        }

        let credentials = user_info.map(|u| format!("{}@", u)).unwrap_or_default();
        Ok(ConnectionUrl {
            scheme: scheme.to_ascii_lowercase(),
            host: address[..address.find('/').unwrap_or(split)].to_string(),
            root: format!("{}://{}{}", scheme, credentials, &address[..split]),
            database: database.to_string(),
            query: query.filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// `scheme://host:port` with any user-info removed; safe for logs and errors.
    pub fn server(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Address of the tenant database itself, `jdbc:` prefix removed.
    pub fn tenant_address(&self) -> String {
        self.with_query(format!("{}{}", self.root, self.database))
    }

    /// Address used for database-creation DDL. PostgreSQL refuses `CREATE DATABASE`
    /// against a database that does not exist yet, so it is rooted at `postgres`.
    pub fn admin_address(&self, engine: EngineKind) -> String {
        let database = engine.admin_database().unwrap_or("");
        self.with_query(format!("{}{}", self.root, database))
    }

    fn with_query(&self, address: String) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", address, q),
            None => address,
        }
    }
}
