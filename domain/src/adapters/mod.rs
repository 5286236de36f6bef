//! In-memory adapters that live inside the domain crate for convenience.
//!
//! These back unit tests, the HTTP tests in api-server and local demos
//! (`STORAGE_PROVIDER=memory`). Real adapters (SQLite, DynamoDB) live in
//! separate crates.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::Clock;

pub mod memory_repo;

/// Deterministic clock that advances one millisecond on every read.
///
/// Useful where ordering by creation time must not depend on how fast the
/// test runs.
pub struct StepClock {
    next: Mutex<SystemTime>,
}

impl StepClock {
    pub fn starting_at(start: SystemTime) -> Self {
        Self {
            next: Mutex::new(start),
        }
    }
}

impl Default for StepClock {
    fn default() -> Self {
        Self::starting_at(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

impl Clock for StepClock {
    fn now(&self) -> SystemTime {
        let mut guard = match self.next.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = *guard;
        *guard = now + Duration::from_millis(1);
        now
    }
}
