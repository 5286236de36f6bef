use std::sync::Arc;

use crate::{
    Backend, DeleteOutcome, NewUser, RecordId, StoreError, StoreName, UserRecord, UserStore,
};

/// Application service binding one store to the table or collection it serves.
///
/// Route handlers stay generic over the backend: they pick a `UserService` by
/// `Backend` and call the same three operations on either one.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    name: StoreName,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, name: StoreName) -> Self {
        Self { store, name }
    }

    pub fn backend(&self) -> Backend {
        self.store.backend()
    }

    pub fn database(&self) -> &'static str {
        self.store.database()
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// List every user, newest first.
    pub fn list(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.store.fetch_all(&self.name)
    }

    /// Create a user; the store assigns identity and timestamps.
    pub fn create(&self, input: NewUser) -> Result<UserRecord, StoreError> {
        self.store.insert(&self.name, input)
    }

    /// Delete by identity. Blank identities are rejected before the store is
    /// reached; a store that reports zero deletions yields `NotFound`.
    pub fn remove(&self, id: &RecordId) -> Result<DeleteOutcome, StoreError> {
        if id.is_blank() {
            return Err(StoreError::Validation("user id is required".into()));
        }
        match self.store.delete(&self.name, id)? {
            outcome if outcome.is_not_found() => Err(StoreError::NotFound),
            outcome => Ok(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::{InMemoryCollection, InMemoryTable};
    use crate::adapters::StepClock;

    fn sql() -> UserService {
        let table = InMemoryTable::with_clock(StepClock::default());
        let name = StoreName::new("users").unwrap();
        table.create_table(&name).unwrap();
        UserService::new(Arc::new(table), name)
    }

    fn nosql() -> UserService {
        UserService::new(
            Arc::new(InMemoryCollection::with_clock(StepClock::default())),
            StoreName::new("users").unwrap(),
        )
    }

    fn user(name: &str, email: &str, age: i64) -> NewUser {
        NewUser {
            name: name.into(),
            email: email.into(),
            age,
        }
    }

    #[test]
    fn create_then_list_includes_record() {
        for svc in [sql(), nosql()] {
            let created = svc.create(user("Ann", "ann@x.com", 40)).unwrap();
            assert!(!created.id.is_blank());
            let all = svc.list().unwrap();
            assert_eq!(all.len(), 1);
            assert_eq!(all[0], created);
        }
    }

    #[test]
    fn list_is_newest_first() {
        for svc in [sql(), nosql()] {
            for i in 0..4 {
                svc.create(user(&format!("u{i}"), &format!("u{i}@x.com"), 20 + i))
                    .unwrap();
            }
            let all = svc.list().unwrap();
            let names: Vec<_> = all.iter().map(|u| u.name.as_str()).collect();
            assert_eq!(names, vec!["u3", "u2", "u1", "u0"]);
            assert!(all.windows(2).all(|w| w[0].created_at > w[1].created_at));
        }
    }

    #[test]
    fn delete_removes_only_target_and_leaves_other_backend_alone() {
        let (a, b) = (sql(), nosql());
        let a1 = a.create(user("A1", "a1@x.com", 30)).unwrap();
        let a2 = a.create(user("A2", "a2@x.com", 31)).unwrap();
        let b1 = b.create(user("B1", "b1@x.com", 32)).unwrap();

        a.remove(&a1.id).unwrap();
        let left: Vec<_> = a.list().unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(left, vec![a2.id]);
        assert_eq!(b.list().unwrap(), vec![b1]);
    }

    #[test]
    fn duplicate_email_only_rejected_by_relational() {
        let (a, b) = (sql(), nosql());
        a.create(user("Ann", "dup@x.com", 40)).unwrap();
        let err = a.create(user("Ann2", "dup@x.com", 41)).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        b.create(user("Ann", "dup@x.com", 40)).unwrap();
        b.create(user("Ann2", "dup@x.com", 41)).unwrap();
        assert_eq!(b.list().unwrap().len(), 2);
    }

    #[test]
    fn age_bounds_only_enforced_by_relational() {
        let (a, b) = (sql(), nosql());
        for (i, age) in [0, 150].into_iter().enumerate() {
            let email = format!("edge{i}@x.com");
            let err = a.create(user("Edge", &email, age)).unwrap_err();
            assert!(matches!(err, StoreError::Constraint(_)), "age {age}");
            b.create(user("Edge", &email, age)).unwrap();
        }
        a.create(user("Low", "low@x.com", 1)).unwrap();
        a.create(user("High", "high@x.com", 149)).unwrap();
    }

    #[test]
    fn delete_not_found_signalling_differs() {
        let (a, b) = (sql(), nosql());
        assert_eq!(
            a.remove(&RecordId::new("999")).unwrap(),
            DeleteOutcome::Unobserved
        );
        let missing = RecordId::new(format!("{:032x}", 999));
        assert_eq!(b.remove(&missing).unwrap_err(), StoreError::NotFound);

        let b1 = b.create(user("B1", "b1@x.com", 32)).unwrap();
        assert_eq!(b.remove(&b1.id).unwrap(), DeleteOutcome::Removed(1));
    }

    #[test]
    fn blank_id_is_validation_error() {
        let err = sql().remove(&RecordId::new("")).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
