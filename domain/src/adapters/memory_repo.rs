use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::{
    Backend, Clock, DeleteOutcome, NewUser, PatchableStore, RecordId, StoreError, StoreName,
    SystemClock, UserPatch, UserRecord, UserStore,
};

const AGE_CHECK: &str = "age > 0 AND age < 150";

/// In-memory stand-in for the relational store.
///
/// Mirrors the schema rules of the SQLite table: integer identity, non-empty
/// text columns, unique email, the age CHECK, and a query error for tables
/// that were never created.
pub struct InMemoryTable {
    tables: Mutex<BTreeMap<String, TableData>>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct TableData {
    next_id: i64,
    rows: Vec<UserRecord>,
}

/// In-memory stand-in for the document store.
///
/// No shape or uniqueness rules; collections spring into existence on first
/// insert and reading an unknown collection yields an empty list.
pub struct InMemoryCollection {
    collections: Mutex<BTreeMap<String, Vec<UserRecord>>>,
    next_id: Mutex<u128>,
    clock: Arc<dyn Clock>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Connection("mutex poisoned".into())
}

impl InMemoryTable {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            clock: Arc::new(clock),
        }
    }

    /// Create the table if it does not exist yet.
    pub fn create_table(&self, table: &StoreName) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().map_err(poisoned)?;
        tables.entry(table.as_str().to_string()).or_default();
        Ok(())
    }
}

impl Default for InMemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Native key check: a 64-bit integer.
fn parse_row_id(id: &RecordId) -> Result<i64, StoreError> {
    id.as_str()
        .trim()
        .parse::<i64>()
        .map_err(|_| StoreError::IdentityFormat(format!("'{}' is not an integer id", id)))
}

fn no_such_table(table: &StoreName) -> StoreError {
    StoreError::Query(format!("no such table: {}", table))
}

impl UserStore for InMemoryTable {
    fn backend(&self) -> Backend {
        Backend::Relational
    }

    fn database(&self) -> &'static str {
        "In-Memory"
    }

    fn fetch_all(&self, table: &StoreName) -> Result<Vec<UserRecord>, StoreError> {
        let tables = self.tables.lock().map_err(poisoned)?;
        let data = tables.get(table.as_str()).ok_or_else(|| no_such_table(table))?;
        let mut rows = data.rows.clone();
        // Same tie-break as the SQL adapter: created_at DESC, id DESC.
        rows.sort_by(|a, b| {
            b.created_at.cmp(&a.created_at).then_with(|| {
                let ka = a.id.as_str().parse::<i64>().unwrap_or(0);
                let kb = b.id.as_str().parse::<i64>().unwrap_or(0);
                kb.cmp(&ka)
            })
        });
        Ok(rows)
    }

    fn insert(&self, table: &StoreName, user: NewUser) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.lock().map_err(poisoned)?;
        let data = tables
            .get_mut(table.as_str())
            .ok_or_else(|| no_such_table(table))?;

        if user.name.is_empty() {
            return Err(StoreError::Constraint(
                "CHECK constraint failed: name <> ''".into(),
            ));
        }
        if user.email.is_empty() {
            return Err(StoreError::Constraint(
                "CHECK constraint failed: email <> ''".into(),
            ));
        }
        if !(user.age > 0 && user.age < 150) {
            return Err(StoreError::Constraint(format!(
                "CHECK constraint failed: {}",
                AGE_CHECK
            )));
        }
        if data.rows.iter().any(|r| r.email == user.email) {
            return Err(StoreError::Constraint(format!(
                "UNIQUE constraint failed: {}.email",
                table
            )));
        }

        data.next_id += 1;
        let now = self.clock.now();
        let record = UserRecord {
            id: RecordId::new(data.next_id.to_string()),
            name: user.name,
            email: user.email,
            age: user.age,
            created_at: now,
            updated_at: now,
        };
        data.rows.push(record.clone());
        Ok(record)
    }

    fn delete(&self, table: &StoreName, id: &RecordId) -> Result<DeleteOutcome, StoreError> {
        let mut tables = self.tables.lock().map_err(poisoned)?;
        let data = tables
            .get_mut(table.as_str())
            .ok_or_else(|| no_such_table(table))?;
        let key = parse_row_id(id)?.to_string();
        data.rows.retain(|r| r.id.as_str() != key);
        Ok(DeleteOutcome::Unobserved)
    }
}

impl InMemoryCollection {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self {
            collections: Mutex::new(BTreeMap::new()),
            next_id: Mutex::new(0),
            clock: Arc::new(clock),
        }
    }

    fn next_object_id(&self) -> Result<String, StoreError> {
        let mut n = self.next_id.lock().map_err(poisoned)?;
        *n += 1;
        Ok(format!("{:032x}", *n))
    }
}

impl Default for InMemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

/// Native key check: 32 lowercase hex digits.
fn parse_object_id(id: &RecordId) -> Result<String, StoreError> {
    let s = id.as_str();
    if s.len() == 32 && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
        Ok(s.to_string())
    } else {
        Err(StoreError::IdentityFormat(format!(
            "'{}' is not a 32 character hex object id",
            s
        )))
    }
}

impl UserStore for InMemoryCollection {
    fn backend(&self) -> Backend {
        Backend::Document
    }

    fn database(&self) -> &'static str {
        "In-Memory"
    }

    fn fetch_all(&self, collection: &StoreName) -> Result<Vec<UserRecord>, StoreError> {
        let cols = self.collections.lock().map_err(poisoned)?;
        let mut docs = cols.get(collection.as_str()).cloned().unwrap_or_default();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }

    fn insert(&self, collection: &StoreName, user: NewUser) -> Result<UserRecord, StoreError> {
        let id = self.next_object_id()?;
        let now = self.clock.now();
        let doc = UserRecord {
            id: RecordId::new(id),
            name: user.name,
            email: user.email,
            age: user.age,
            created_at: now,
            updated_at: now,
        };
        let mut cols = self.collections.lock().map_err(poisoned)?;
        cols.entry(collection.as_str().to_string())
            .or_default()
            .push(doc.clone());
        Ok(doc)
    }

    fn delete(&self, collection: &StoreName, id: &RecordId) -> Result<DeleteOutcome, StoreError> {
        let key = parse_object_id(id)?;
        let mut cols = self.collections.lock().map_err(poisoned)?;
        let Some(docs) = cols.get_mut(collection.as_str()) else {
            return Ok(DeleteOutcome::Removed(0));
        };
        let before = docs.len();
        docs.retain(|d| d.id.as_str() != key);
        Ok(DeleteOutcome::Removed((before - docs.len()) as u64))
    }
}

impl PatchableStore for InMemoryCollection {
    fn update(
        &self,
        collection: &StoreName,
        id: &RecordId,
        patch: UserPatch,
    ) -> Result<u64, StoreError> {
        let key = parse_object_id(id)?;
        let now = self.clock.now();
        let mut cols = self.collections.lock().map_err(poisoned)?;
        let Some(doc) = cols
            .get_mut(collection.as_str())
            .and_then(|docs| docs.iter_mut().find(|d| d.id.as_str() == key))
        else {
            return Ok(0);
        };
        if let Some(name) = patch.name {
            doc.name = name;
        }
        if let Some(email) = patch.email {
            doc.email = email;
        }
        if let Some(age) = patch.age {
            doc.age = age;
        }
        doc.updated_at = now;
        Ok(1)
    }
}
