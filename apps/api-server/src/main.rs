//! api-server - HTTP API and page for the SQL vs NoSQL users demo.
//!
//! Serves two parallel sets of list/create/delete endpoints, one per backend,
//! and a server-rendered page on top of them:
//! - Storage: SQLite (relational) and DynamoDB (document) in `persistent`
//!   mode, or an in-memory table and collection in `memory` mode.
//! - CORS: Configurable via CORS_ALLOW_ORIGIN.
//!
//! Run:
//! ```bash
//! # in-memory stores, pretty logs
//! STORAGE_PROVIDER=memory cargo run -p api-server
//!
//! # SQLite file + DynamoDB Local
//! SQL_DB_PATH=./data/users.db \
//! DYNAMO_ENDPOINT_URL=http://localhost:8000 AWS_REGION=us-east-1 \
//!   cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.
//!

mod config;
mod page;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::HeaderValue;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use domain::adapters::memory_repo::{InMemoryCollection, InMemoryTable};
use domain::validate::new_user_from_fields;
use domain::{Backend, RecordId, StoreError, UserRecord, UserService, UserStore};
use serde_json::Value;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// One service per backend; handlers pick by route segment.
#[derive(Clone)]
struct AppState {
    sql: UserService,
    nosql: UserService,
}

impl AppState {
    fn service(&self, backend: Backend) -> &UserService {
        match backend {
            Backend::Relational => &self.sql,
            Backend::Document => &self.nosql,
        }
    }

    fn resolve(&self, segment: &str) -> Result<&UserService, Response> {
        Backend::parse(segment)
            .map(|b| self.service(b))
            .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Unknown backend", Some(segment)))
    }
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_ephemeral();

    let state = match build_state(&cfg) {
        Ok(s) => s,
        Err(e) => {
            error!(err=?e, "failed to initialise stores");
            std::process::exit(1);
        }
    };

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };
    let app = app(state).layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, "api-server listening");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(err=?e, %addr, "bind failed");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!(err=?e, "server error");
        std::process::exit(1);
    }
}

fn app(state: AppState) -> Router {
    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    Router::new()
        .route("/", get(page::index))
        .route("/ui/:backend/users", post(page::create_from_form))
        .route("/ui/:backend/users/:id/delete", post(page::delete_from_form))
        .route("/api/health", get(health))
        .route(
            "/api/:backend/users",
            get(list_users).post(create_user).delete(missing_id),
        )
        .route("/api/:backend/users/:id", axum::routing::delete(delete_user))
        .fallback(not_found)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state)
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct both stores based on config and feature flags.
fn build_state(cfg: &config::Config) -> Result<AppState, StoreError> {
    let (sql, nosql): (Arc<dyn UserStore>, Arc<dyn UserStore>) = match cfg.storage_provider {
        config::StorageProvider::Memory => {
            let table = InMemoryTable::new();
            table.create_table(&cfg.sql_table)?;
            (Arc::new(table), Arc::new(InMemoryCollection::new()))
        }
        config::StorageProvider::Persistent => (persistent_sql(cfg)?, persistent_nosql(cfg)?),
    };
    info!(
        sql = sql.database(),
        sql_table = %cfg.sql_table,
        nosql = nosql.database(),
        nosql_collection = %cfg.nosql_collection,
        "stores ready"
    );
    Ok(AppState {
        sql: UserService::new(sql, cfg.sql_table.clone()),
        nosql: UserService::new(nosql, cfg.nosql_collection.clone()),
    })
}

#[cfg(feature = "sqlite")]
fn persistent_sql(cfg: &config::Config) -> Result<Arc<dyn UserStore>, StoreError> {
    let path = cfg
        .sql_db_path
        .as_ref()
        .ok_or_else(|| StoreError::Connection("SQL_DB_PATH not set".into()))?;
    let repo = sqlite_adapter::SqliteRepo::new(path)?;
    repo.ensure_table(&cfg.sql_table)?;
    Ok(Arc::new(repo))
}

#[cfg(not(feature = "sqlite"))]
fn persistent_sql(_cfg: &config::Config) -> Result<Arc<dyn UserStore>, StoreError> {
    Err(StoreError::Connection(
        "built without the `sqlite` feature; use STORAGE_PROVIDER=memory".into(),
    ))
}

#[cfg(feature = "dynamo")]
fn persistent_nosql(cfg: &config::Config) -> Result<Arc<dyn UserStore>, StoreError> {
    let settings = aws_dynamo::DynamoSettings {
        endpoint_url: cfg.dynamo_endpoint_url.clone(),
        connect_timeout: cfg.dynamo_connect_timeout,
        operation_timeout: cfg.dynamo_operation_timeout,
    };
    Ok(Arc::new(aws_dynamo::DynamoRepo::new(settings)?))
}

#[cfg(not(feature = "dynamo"))]
fn persistent_nosql(_cfg: &config::Config) -> Result<Arc<dyn UserStore>, StoreError> {
    Err(StoreError::Connection(
        "built without the `dynamo` feature; use STORAGE_PROVIDER=memory".into(),
    ))
}

/// Wire shape of a record: relational rows expose `id` (integer) and
/// snake_case timestamps, documents expose `_id` and camelCase timestamps.
fn user_json(backend: Backend, user: &UserRecord) -> Value {
    let created = http_common::system_time_to_rfc3339(user.created_at);
    let updated = http_common::system_time_to_rfc3339(user.updated_at);
    match backend {
        Backend::Relational => {
            let id = user
                .id
                .as_str()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::from(user.id.as_str()));
            serde_json::json!({
                "id": id,
                "name": user.name,
                "email": user.email,
                "age": user.age,
                "created_at": created,
                "updated_at": updated,
            })
        }
        Backend::Document => serde_json::json!({
            "_id": user.id.as_str(),
            "name": user.name,
            "email": user.email,
            "age": user.age,
            "createdAt": created,
            "updatedAt": updated,
        }),
    }
}

/// Read a body field as text. Missing and null read as absent; numbers keep
/// their JSON spelling so `40` and `"40"` coerce the same way.
fn field_text(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn success(svc: &UserService, key: &str, value: Value) -> Response {
    Json(http_common::json_success(
        key,
        value,
        svc.database(),
        svc.backend().kind_label(),
    ))
    .into_response()
}

fn failure(status: StatusCode, error: &str, details: Option<&str>) -> Response {
    (status, Json(http_common::json_failure(error, details))).into_response()
}

// Map a store error to the failure envelope; `action` names the failed route.
fn store_failure(backend: Backend, action: &str, e: StoreError) -> Response {
    let kind = e.kind();
    match &e {
        StoreError::Validation(msg) => {
            warn!(backend = backend.segment(), kind, %msg, "{action}: invalid input");
            failure(
                StatusCode::BAD_REQUEST,
                "Missing required fields",
                Some(msg.as_str()),
            )
        }
        StoreError::InvalidValue { field, message } => {
            warn!(backend = backend.segment(), kind, %message, "{action}: invalid {field}");
            failure(
                StatusCode::BAD_REQUEST,
                &format!("Invalid {field}"),
                Some(message.as_str()),
            )
        }
        StoreError::IdentityFormat(msg) => {
            warn!(backend = backend.segment(), kind, %msg, "{action}: malformed id");
            failure(StatusCode::BAD_REQUEST, "Invalid user id", Some(msg.as_str()))
        }
        StoreError::NotFound => {
            warn!(backend = backend.segment(), kind, "{action}: nothing matched");
            failure(StatusCode::NOT_FOUND, "User not found", None)
        }
        StoreError::Constraint(msg)
        | StoreError::Query(msg)
        | StoreError::Insert(msg)
        | StoreError::Connection(msg) => {
            error!(err=?e, backend = backend.segment(), kind, "{action} failed");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Failed to {action}"),
                Some(msg.as_str()),
            )
        }
    }
}

async fn list_users(State(state): State<AppState>, Path(segment): Path<String>) -> Response {
    let svc = match state.resolve(&segment) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match svc.list() {
        Ok(users) => {
            let users: Vec<Value> = users.iter().map(|u| user_json(svc.backend(), u)).collect();
            success(svc, "users", Value::Array(users))
        }
        Err(e) => store_failure(svc.backend(), "fetch users", e),
    }
}

async fn create_user(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let svc = match state.resolve(&segment) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => {
            warn!(backend = svc.backend().segment(), err = %rej, "create: unreadable body");
            return failure(
                StatusCode::BAD_REQUEST,
                "Missing required fields",
                Some(&rej.body_text()),
            );
        }
    };

    let input = match new_user_from_fields(
        field_text(&body, "name"),
        field_text(&body, "email"),
        field_text(&body, "age"),
    ) {
        Ok(i) => i,
        Err(e) => return store_failure(svc.backend(), "create user", e),
    };

    match svc.create(input) {
        Ok(user) => {
            info!(backend = svc.backend().segment(), id = %user.id, "create ok");
            success(svc, "user", user_json(svc.backend(), &user))
        }
        Err(e) => store_failure(svc.backend(), "create user", e),
    }
}

async fn delete_user(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
) -> Response {
    let svc = match state.resolve(&segment) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match svc.remove(&RecordId::new(id.clone())) {
        Ok(_) => {
            info!(backend = svc.backend().segment(), id = %id, "delete ok");
            success(svc, "message", Value::from("User deleted successfully"))
        }
        Err(StoreError::Validation(msg)) => failure(
            StatusCode::BAD_REQUEST,
            "User ID is required",
            Some(msg.as_str()),
        ),
        Err(e) => store_failure(svc.backend(), "delete user", e),
    }
}

// DELETE on the collection path: the id segment is missing.
async fn missing_id(State(state): State<AppState>, Path(segment): Path<String>) -> Response {
    match state.resolve(&segment) {
        Ok(_) => failure(StatusCode::BAD_REQUEST, "User ID is required", None),
        Err(resp) => resp,
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let stores: Vec<Value> = Backend::ALL
        .iter()
        .map(|b| {
            let svc = state.service(*b);
            serde_json::json!({
                "type": b.kind_label(),
                "database": svc.database(),
                "connection": svc.store().connection_state().as_str(),
            })
        })
        .collect();
    Json(serde_json::json!({"success": true, "status": "ok", "stores": stores})).into_response()
}

async fn not_found() -> Response {
    failure(StatusCode::NOT_FOUND, "Not found", None)
}
