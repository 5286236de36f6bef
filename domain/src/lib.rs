//! Domain library for the SQL vs NoSQL users demo.
//!
//! This crate is dependency-free and holds the user record types, the store
//! ports (traits), and error definitions. Keep adapters and
//! IO concerns out of this crate; the in-memory adapters under `adapters` are
//! the only implementations living here.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::SystemTime;

/// Which of the two stores serves a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Schema-enforcing tabular store.
    Relational,
    /// Schema-less document store.
    Document,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Relational, Backend::Document];

    /// Route segment identifying the backend (`/api/{segment}/users`).
    pub fn segment(&self) -> &'static str {
        match self {
            Backend::Relational => "sql",
            Backend::Document => "nosql",
        }
    }

    /// Label echoed in the `type` field of every envelope.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Backend::Relational => "SQL",
            Backend::Document => "NoSQL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sql" => Some(Backend::Relational),
            "nosql" => Some(Backend::Document),
            _ => None,
        }
    }
}

/// Name of a table (relational) or collection (document).
///
/// Table names cannot be bound as query parameters, so they are restricted to
/// a plain identifier alphabet.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreName(String);

impl StoreName {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, StoreError> {
        let val = s.into();
        if val.is_empty() || val.len() > 64 {
            return Err(StoreError::Validation(format!(
                "store name must be 1-64 characters, got {}",
                val.len()
            )));
        }
        if val.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(StoreError::Validation(
                "store name must not start with a digit".into(),
            ));
        }
        if !val.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::Validation(format!(
                "invalid characters in store name '{}'",
                val
            )));
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StoreName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend-assigned identity, opaque above the adapters.
///
/// The relational adapter stores an integer, the document adapter a UUID;
/// each one owns the conversion to its native key type.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(String);

impl RecordId {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input data for creating a user. Presence has been checked, ranges have not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub age: i64,
}

/// Stored user as read back from a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub age: i64,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Partial-field merge applied by `PatchableStore::update`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i64>,
}

/// Result of a delete call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The backend reported how many records it removed (0 or 1).
    Removed(u64),
    /// The backend does not report whether anything matched.
    Unobserved,
}

impl DeleteOutcome {
    /// True only when the backend positively reported that nothing matched.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DeleteOutcome::Removed(0))
    }
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Store port: the capability set {fetch-all, insert, delete}, parameterized
/// by the name of the table or collection it acts on.
pub trait UserStore: Send + Sync {
    /// Which role this store plays.
    fn backend(&self) -> Backend;
    /// Human-readable engine name echoed in the `database` envelope field.
    fn database(&self) -> &'static str;
    /// All records, newest first.
    fn fetch_all(&self, store: &StoreName) -> Result<Vec<UserRecord>, StoreError>;
    /// Persist a user and return it as stored, with identity and timestamps.
    fn insert(&self, store: &StoreName, user: NewUser) -> Result<UserRecord, StoreError>;
    /// Delete by identity.
    fn delete(&self, store: &StoreName, id: &RecordId) -> Result<DeleteOutcome, StoreError>;
    /// Connection state for health reporting; eager stores are always ready.
    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Ready
    }
}

/// Stores that support a partial-field merge.
pub trait PatchableStore: UserStore {
    /// Returns the number of matched records (0 or 1).
    fn update(&self, store: &StoreName, id: &RecordId, patch: UserPatch)
        -> Result<u64, StoreError>;
}

/// Lifecycle of a lazily established connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Ready,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Uninitialized => "uninitialized",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
        }
    }
}

/// Store errors (no external error crates to keep deps minimal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Missing caller input, caught before any store call.
    Validation(String),
    /// A field is present but has no usable reading (e.g. a non-numeric age).
    InvalidValue { field: &'static str, message: String },
    /// A relational schema rule rejected the write.
    Constraint(String),
    /// Query or transport failure.
    Query(String),
    /// Document insert failure.
    Insert(String),
    /// Identity string is not valid for the backend's native key type.
    IdentityFormat(String),
    /// The store reported that nothing matched the identity.
    NotFound,
    /// Could not establish or use the connection to the store.
    Connection(String),
}

impl StoreError {
    /// Short machine-readable label for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Validation(_) => "validation_error",
            StoreError::InvalidValue { .. } => "invalid_value",
            StoreError::Constraint(_) => "constraint_error",
            StoreError::Query(_) => "query_error",
            StoreError::Insert(_) => "insert_error",
            StoreError::IdentityFormat(_) => "identity_format_error",
            StoreError::NotFound => "not_found",
            StoreError::Connection(_) => "connection_error",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Validation(msg) => write!(f, "validation failed: {}", msg),
            StoreError::InvalidValue { field, message } => {
                write!(f, "invalid {}: {}", field, message)
            }
            StoreError::Constraint(msg) => write!(f, "constraint violated: {}", msg),
            StoreError::Query(msg) => write!(f, "query failed: {}", msg),
            StoreError::Insert(msg) => write!(f, "insert failed: {}", msg),
            StoreError::IdentityFormat(msg) => write!(f, "invalid identity: {}", msg),
            StoreError::NotFound => write!(f, "not found"),
            StoreError::Connection(msg) => write!(f, "connection error: {}", msg),
        }
    }
}

impl Error for StoreError {}

/// Return a short about/version line for the binary to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} - users domain library loaded", pkg, ver)
}

pub mod adapters;
pub mod service;
pub mod validate;

pub use service::UserService;
