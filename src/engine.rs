//! Engine families and their strategy table: tuning profile, maintenance
//! database, and the dialect of "create database if absent".

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    MySqlFamily,
    PostgresFamily,
    Unknown,
}

/// Performance-affecting connection properties applied when a pool is built.
#[derive(Debug, PartialEq, Eq)]
pub struct EngineProfile {
    pub statement_cache_capacity: usize,
    pub charset: Option<&'static str>,
    pub collation: Option<&'static str>,
    /// Session parameters sent at connection startup.
    pub session_options: &'static [(&'static str, &'static str)],
}

const MYSQL_PROFILE: EngineProfile = EngineProfile {
    statement_cache_capacity: 250,
    charset: Some("utf8mb4"),
    collation: Some("utf8mb4_unicode_ci"),
    session_options: &[],
};

const POSTGRES_PROFILE: EngineProfile = EngineProfile {
    statement_cache_capacity: 250,
    charset: None,
    collation: None,
    session_options: &[
        ("tcp_keepalives_idle", "60"),
        ("tcp_keepalives_interval", "10"),
        ("tcp_keepalives_count", "6"),
    ],
};

const POSTGRES_EXISTS_PROBE: &str = "SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)";

/// How a database is created when it may already exist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreationPlan {
    /// A single statement that is a no-op when the database exists.
    Conditional { statement: String },
    /// Engine has no conditional DDL: probe the catalog, create only when absent.
    CheckThenCreate { probe: &'static str, create: String },
    /// No portable database DDL; the target must exist or be created on connect.
    Skip,
}

impl EngineKind {
    /// Classify a driver/engine identifier by case-insensitive substring.
    pub fn classify(identifier: &str) -> Self {
        let lower = identifier.to_ascii_lowercase();
        if lower.contains("postgres") {
            EngineKind::PostgresFamily
        } else if lower.contains("mysql") || lower.contains("mariadb") {
            EngineKind::MySqlFamily
        } else {
            EngineKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::MySqlFamily => "mysql",
            EngineKind::PostgresFamily => "postgres",
            EngineKind::Unknown => "unknown",
        }
    }

    /// Unknown engines get baseline pooling only.
    pub fn profile(&self) -> Option<&'static EngineProfile> {
        match self {
            EngineKind::MySqlFamily => Some(&MYSQL_PROFILE),
            EngineKind::PostgresFamily => Some(&POSTGRES_PROFILE),
            EngineKind::Unknown => None,
        }
    }

    pub fn admin_database(&self) -> Option<&'static str> {
        match self {
            EngineKind::PostgresFamily => Some("postgres"),
            EngineKind::MySqlFamily | EngineKind::Unknown => None,
        }
    }

    /// Whether database names must pass identifier validation before DDL.
    pub fn issues_ddl(&self) -> bool {
        !matches!(self, EngineKind::Unknown)
    }

    pub fn creation_plan(&self, database: &str) -> CreationPlan {
        match self {
            EngineKind::MySqlFamily => CreationPlan::Conditional {
                statement: format!(
                    "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
                    self.quote_ident(database)
                ),
            },
            EngineKind::PostgresFamily => CreationPlan::CheckThenCreate {
                probe: POSTGRES_EXISTS_PROBE,
                create: format!("CREATE DATABASE {}", self.quote_ident(database)),
            },
            EngineKind::Unknown => CreationPlan::Skip,
        }
    }

    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            EngineKind::MySqlFamily => format!("`{}`", name.replace('`', "``")),
            EngineKind::PostgresFamily | EngineKind::Unknown => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_driver_identifiers() {
        assert_eq!(EngineKind::classify("com.mysql.cj.jdbc.Driver"), EngineKind::MySqlFamily);
        assert_eq!(EngineKind::classify("mysql.Driver"), EngineKind::MySqlFamily);
        assert_eq!(EngineKind::classify("org.mariadb.jdbc.Driver"), EngineKind::MySqlFamily);
        assert_eq!(EngineKind::classify("org.postgresql.Driver"), EngineKind::PostgresFamily);
        assert_eq!(EngineKind::classify("POSTGRES"), EngineKind::PostgresFamily);
        assert_eq!(EngineKind::classify("org.sqlite.JDBC"), EngineKind::Unknown);
        assert_eq!(EngineKind::classify(""), EngineKind::Unknown);
    }

    #[test]
    fn unknown_engine_has_no_profile() {
        assert!(EngineKind::Unknown.profile().is_none());
        assert_eq!(EngineKind::MySqlFamily.profile().unwrap().charset, Some("utf8mb4"));
        assert!(EngineKind::PostgresFamily
            .profile()
            .unwrap()
            .session_options
            .iter()
            .any(|(k, _)| *k == "tcp_keepalives_idle"));
    }

    #[test]
    fn mysql_creates_with_one_conditional_statement() {
        match EngineKind::MySqlFamily.creation_plan("school_a") {
            CreationPlan::Conditional { statement } => {
                assert_eq!(
                    statement,
                    "CREATE DATABASE IF NOT EXISTS `school_a` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci"
                );
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn postgres_checks_catalog_before_create() {
        match EngineKind::PostgresFamily.creation_plan("school_b") {
            CreationPlan::CheckThenCreate { probe, create } => {
                assert!(probe.contains("pg_database"));
                assert_eq!(create, "CREATE DATABASE \"school_b\"");
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn quoting_doubles_delimiters() {
        assert_eq!(EngineKind::MySqlFamily.quote_ident("a`b"), "`a``b`");
        assert_eq!(EngineKind::PostgresFamily.quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
