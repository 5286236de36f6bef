//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use domain::StoreName;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// SQLite file for the relational role, DynamoDB for the document role
    Persistent,
    /// In-memory table and collection (data lost on restart)
    Memory,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("memory") {
            Self::Memory
        } else {
            Self::Persistent
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Storage provider
    pub storage_provider: StorageProvider,
    /// SQLite database path (required for persistent storage)
    pub sql_db_path: Option<PathBuf>,
    /// Relational table name
    pub sql_table: StoreName,
    /// Document collection (DynamoDB table) name
    pub nosql_collection: StoreName,
    /// Override endpoint for DynamoDB Local
    pub dynamo_endpoint_url: Option<String>,
    pub dynamo_connect_timeout: Duration,
    pub dynamo_operation_timeout: Duration,
    /// Log format
    pub log_format: LogFormat,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Port
        let port = match var("PORT") {
            Some(s) => s.trim().parse().map_err(|e| ConfigError {
                field: "PORT",
                message: format!("Invalid port '{}': {}", s, e),
            })?,
            None => 3000,
        };

        // CORS allow origin
        let cors_origin_str = var("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Storage provider
        let storage_provider = StorageProvider::from_str(
            &var("STORAGE_PROVIDER").unwrap_or_else(|| "persistent".into()),
        );

        // SQLite path, only mandatory when it will actually be opened
        let sql_db_path = var("SQL_DB_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        if storage_provider == StorageProvider::Persistent && sql_db_path.is_none() {
            return Err(ConfigError {
                field: "SQL_DB_PATH",
                message: "Required when STORAGE_PROVIDER=persistent".into(),
            });
        }

        let sql_table = store_name(&var, "SQL_TABLE")?;
        let nosql_collection = store_name(&var, "NOSQL_COLLECTION")?;

        let dynamo_endpoint_url = var("DYNAMO_ENDPOINT_URL").filter(|s| !s.is_empty());
        let dynamo_connect_timeout = millis(&var, "DYNAMO_CONNECT_TIMEOUT_MS", 5_000)?;
        let dynamo_operation_timeout = millis(&var, "DYNAMO_OPERATION_TIMEOUT_MS", 10_000)?;

        // Log format
        let log_format =
            LogFormat::from_str(&var("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        Ok(Self {
            port,
            cors_allow_origin,
            storage_provider,
            sql_db_path,
            sql_table,
            nosql_collection,
            dynamo_endpoint_url,
            dynamo_connect_timeout,
            dynamo_operation_timeout,
            log_format,
        })
    }

    /// Log warnings about configuration that is fine for demos only.
    pub fn warn_if_ephemeral(&self) {
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!(
                "STORAGE_PROVIDER=memory: both stores live in process memory and are \
                 lost on restart."
            );
        }
        if self.cors_allow_origin == "*" {
            tracing::warn!("CORS_ALLOW_ORIGIN=*: any origin may call the API.");
        }
    }
}

fn store_name<F>(var: &F, field: &'static str) -> Result<StoreName, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = var(field).unwrap_or_else(|| "users".into());
    StoreName::new(raw).map_err(|e| ConfigError {
        field,
        message: e.to_string(),
    })
}

fn millis<F>(var: &F, field: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(field) {
        None => Ok(Duration::from_millis(default)),
        Some(s) => match s.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
            _ => Err(ConfigError {
                field,
                message: format!("Expected a positive number of milliseconds, got '{}'", s),
            }),
        },
    }
}
