//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Rejected tenant input. Never carries credentials.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("malformed connection url: {0}")]
    MalformedConnectionUrl(String),
    #[error("invalid tenant descriptor: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("could not build pool for tenant '{tenant}' ({server}): {source}")]
    PoolBuild {
        tenant: String,
        server: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Raised by the versioned-migration engine.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error(transparent)]
    Engine(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Connection(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("database creation failed for '{database}' on {server}: {source}")]
    DatabaseCreationFailed {
        server: String,
        database: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("migration '{changelog}' failed for '{database}' on {server}: {source}")]
    MigrationFailed {
        server: String,
        database: String,
        changelog: String,
        #[source]
        source: MigrationError,
    },
}

#[derive(Error, Debug)]
pub enum RouteError {
    /// A tenant key is set but no pool is registered under it.
    #[error("tenant not routable: {0}")]
    TenantNotRoutable(String),
    #[error("connection pool exhausted for {target}")]
    PoolExhausted { target: String },
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("no tenant unit of work is active on this task")]
    OutsideUnitOfWork,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("tenant store: {0}")]
    Db(#[from] sqlx::Error),
    #[error("registry database url: {0}")]
    Config(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Descriptor(e)
            | AppError::Registry(RegistryError::Descriptor(e))
            | AppError::Provision(ProvisionError::Descriptor(e)) => match e {
                DescriptorError::MalformedConnectionUrl(_) => (StatusCode::BAD_REQUEST, "malformed_connection_url"),
                DescriptorError::Invalid(_) => (StatusCode::BAD_REQUEST, "invalid_descriptor"),
            },
            AppError::Registry(RegistryError::PoolBuild { .. }) => (StatusCode::BAD_GATEWAY, "pool_build_failed"),
            AppError::Provision(ProvisionError::DatabaseCreationFailed { .. }) => {
                (StatusCode::BAD_GATEWAY, "database_creation_failed")
            }
            AppError::Provision(ProvisionError::MigrationFailed { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "migration_failed")
            }
            AppError::Route(RouteError::TenantNotRoutable(_)) => (StatusCode::NOT_FOUND, "tenant_not_routable"),
            AppError::Route(RouteError::PoolExhausted { .. }) => (StatusCode::SERVICE_UNAVAILABLE, "pool_exhausted"),
            AppError::Route(RouteError::Db(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::Context(_) => (StatusCode::INTERNAL_SERVER_ERROR, "context_error"),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
