//! sqlite-adapter - SQLite implementation of the relational `UserStore` port.
//!
//! Purpose
//! - Play the schema-enforcing role: unique email, the age CHECK, non-empty
//!   text columns, database-side defaults for `created_at`/`updated_at` and a
//!   trigger that keeps `updated_at` current.
//! - Implements the `UserStore` trait from the `domain` crate over any table
//!   name passed in as a `StoreName`.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability (and for a
//!   SQLite recent enough to support `RETURNING`).
//! - Timestamps are stored as ISO-8601 UTC text with millisecond precision, so
//!   lexical order equals chronological order.
//! - Delete does not report whether a row matched.

use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use domain::{
    Backend, DeleteOutcome, NewUser, RecordId, StoreError, StoreName, UserRecord, UserStore,
};
use rusqlite::{params, Connection, ErrorCode};

const NOW_ISO: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// SQLite-backed relational store.
pub struct SqliteRepo {
    conn: Mutex<Connection>,
}

impl SqliteRepo {
    /// Open (or create) a SQLite database at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| StoreError::Connection(format!("create {}: {e}", dir.display())))?;
            }
        }
        let conn = Connection::open(path).map_err(map_sqerr)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqerr)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Create the table, its indexes and the `updated_at` trigger if missing.
    pub fn ensure_table(&self, table: &StoreName) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(&schema_sql(table)).map_err(map_sqerr)?;
        tracing::debug!(table = %table, "relational schema ensured");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Connection("mutex poisoned".into()))
    }
}

fn schema_sql(table: &StoreName) -> String {
    let t = table.as_str();
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {t} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL CHECK (name <> ''),
            email TEXT NOT NULL CHECK (email <> ''),
            age INTEGER NOT NULL CHECK (age > 0 AND age < 150),
            created_at TEXT NOT NULL DEFAULT ({now}),
            updated_at TEXT NOT NULL DEFAULT ({now})
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_{t}_email ON {t}(email);
        CREATE INDEX IF NOT EXISTS idx_{t}_created_at ON {t}(created_at);
        CREATE TRIGGER IF NOT EXISTS trg_{t}_updated_at
            AFTER UPDATE ON {t}
            FOR EACH ROW WHEN NEW.updated_at = OLD.updated_at
        BEGIN
            UPDATE {t} SET updated_at = {now} WHERE id = NEW.id;
        END;
        "#,
        t = t,
        now = NOW_ISO,
    )
}

fn map_sqerr(e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(err, msg) = &e {
        if err.code == ErrorCode::ConstraintViolation {
            return StoreError::Constraint(msg.clone().unwrap_or_else(|| e.to_string()));
        }
    }
    StoreError::Query(format!("sqlite error: {e}"))
}

fn parse_ts(s: &str) -> Result<SystemTime, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc).into())
        .map_err(|e| StoreError::Query(format!("bad timestamp '{s}' in db: {e}")))
}

fn parse_row_id(id: &RecordId) -> Result<i64, StoreError> {
    id.as_str()
        .trim()
        .parse::<i64>()
        .map_err(|_| StoreError::IdentityFormat(format!("'{}' is not an integer id", id)))
}

fn row_to_user(row: &rusqlite::Row) -> Result<UserRecord, StoreError> {
    let id: i64 = row.get(0).map_err(map_sqerr)?;
    let name: String = row.get(1).map_err(map_sqerr)?;
    let email: String = row.get(2).map_err(map_sqerr)?;
    let age: i64 = row.get(3).map_err(map_sqerr)?;
    let created_at: String = row.get(4).map_err(map_sqerr)?;
    let updated_at: String = row.get(5).map_err(map_sqerr)?;
    Ok(UserRecord {
        id: RecordId::new(id.to_string()),
        name,
        email,
        age,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

impl UserStore for SqliteRepo {
    fn backend(&self) -> Backend {
        Backend::Relational
    }

    fn database(&self) -> &'static str {
        "SQLite"
    }

    fn fetch_all(&self, table: &StoreName) -> Result<Vec<UserRecord>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT id, name, email, age, created_at, updated_at FROM {} ORDER BY created_at DESC, id DESC",
            table.as_str()
        );
        let mut stmt = conn.prepare(&sql).map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            out.push(row_to_user(row)?);
        }
        Ok(out)
    }

    fn insert(&self, table: &StoreName, user: NewUser) -> Result<UserRecord, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "INSERT INTO {} (name, email, age) VALUES (?1, ?2, ?3) RETURNING id, name, email, age, created_at, updated_at",
            table.as_str()
        );
        let mut stmt = conn.prepare(&sql).map_err(map_sqerr)?;
        let mut rows = stmt
            .query(params![user.name, user.email, user.age])
            .map_err(map_sqerr)?;
        match rows.next().map_err(map_sqerr)? {
            Some(row) => row_to_user(row),
            None => Err(StoreError::Query("insert returned no row".into())),
        }
    }

    fn delete(&self, table: &StoreName, id: &RecordId) -> Result<DeleteOutcome, StoreError> {
        let key = parse_row_id(id)?;
        let conn = self.lock()?;
        let sql = format!("DELETE FROM {} WHERE id = ?1", table.as_str());
        // The affected-row count is deliberately not surfaced.
        conn.execute(&sql, params![key]).map_err(map_sqerr)?;
        Ok(DeleteOutcome::Unobserved)
    }
}
