//! Lock store abstraction and the in-memory test implementation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

/// Failure talking to the shared lock store.
#[derive(Debug, Error, Clone)]
pub enum LockStoreError {
    #[error("lock store error: {0}")]
    Backend(String),
}

/// Shared, TTL-bearing key-value store used for mutual exclusion.
///
/// Locks only exclude clients honoring this same protocol against the same
/// store; nothing prevents a party from mutating a resource without
/// claiming its key first.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Atomically claim `key` if it is currently absent. Returns `true`
    /// when the claim succeeded.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, LockStoreError>;

    /// Set (or refresh) the key's time-to-live so a crashed holder cannot
    /// pin the resource forever.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), LockStoreError>;

    /// Clear the claim.
    async fn delete(&self, key: &str) -> Result<(), LockStoreError>;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory lock store for tests: same contract, no network.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder token for a key, if any (test helper).
    pub fn holder(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap();
        let now = Instant::now();
        entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone())
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, LockStoreError> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| !e.is_expired(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), LockStoreError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), LockStoreError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
