//! Lock manager: bounded acquisition, TTL refresh, canonical ordering.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use reservoir_core::ProductId;

use crate::store::{LockStore, LockStoreError};

/// Lock acquisition failure.
#[derive(Debug, Error)]
pub enum LockError {
    /// The attempt budget was exhausted without claiming the key.
    #[error("timed out acquiring lock {key} after {attempts} attempts")]
    Timeout { key: String, attempts: u32 },

    /// The shared store itself failed.
    #[error(transparent)]
    Store(#[from] LockStoreError),
}

/// Tuning knobs for lock acquisition.
#[derive(Debug, Clone, Copy)]
pub struct LockConfig {
    /// Time-to-live applied right after a successful claim; bounds the
    /// crash-recovery window.
    pub ttl: Duration,
    /// Sleep between failed claim attempts.
    pub backoff: Duration,
    /// Maximum number of claim attempts before `LockError::Timeout`.
    pub max_attempts: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            backoff: Duration::from_millis(100),
            max_attempts: 50,
        }
    }
}

/// Redis key for a product's lock entry.
pub fn product_lock_key(product_id: ProductId) -> String {
    format!("lock_product_{product_id}")
}

/// A single held lock. Released through the manager, never implicitly.
#[derive(Debug)]
pub struct HeldLock {
    key: String,
    #[allow(dead_code)] // written to the store for diagnostics
    token: Uuid,
}

/// A set of held locks in acquisition order.
#[derive(Debug, Default)]
pub struct LockSet {
    held: Vec<HeldLock>,
}

impl LockSet {
    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// Acquires and releases per-product locks against a shared store.
pub struct LockManager<S> {
    store: Arc<S>,
    config: LockConfig,
}

impl<S> Clone for LockManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl<S: LockStore> LockManager<S> {
    pub fn new(store: Arc<S>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Claim one product's lock, retrying with a fixed backoff up to the
    /// configured attempt budget. The TTL is refreshed once, immediately
    /// after the claim succeeds.
    pub async fn acquire(&self, product_id: ProductId) -> Result<HeldLock, LockError> {
        let key = product_lock_key(product_id);
        let token = Uuid::new_v4();
        let value = token.to_string();

        for attempt in 1..=self.config.max_attempts {
            if self.store.set_if_absent(&key, &value).await? {
                self.store.expire(&key, self.config.ttl).await?;
                return Ok(HeldLock { key, token });
            }
            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.backoff).await;
            }
        }

        Err(LockError::Timeout {
            key,
            attempts: self.config.max_attempts,
        })
    }

    /// Claim every product's lock in ascending product-id order.
    ///
    /// On any failure the locks already held are released in reverse order
    /// before the error surfaces, so a partially acquired set never leaks.
    /// The fixed order makes deadlock between concurrent multi-product
    /// operations structurally impossible.
    pub async fn acquire_all(&self, product_ids: &[ProductId]) -> Result<LockSet, LockError> {
        let mut ids: Vec<ProductId> = product_ids.to_vec();
        ids.sort();
        ids.dedup();

        let mut set = LockSet::default();
        for product_id in ids {
            match self.acquire(product_id).await {
                Ok(held) => set.held.push(held),
                Err(err) => {
                    self.release_all(set).await;
                    return Err(err);
                }
            }
        }
        Ok(set)
    }

    /// Release a single lock.
    ///
    /// Failures are logged, not propagated: the TTL reclaims the key on its
    /// own, and callers on error paths must still surface the original
    /// error.
    pub async fn release(&self, lock: HeldLock) {
        if let Err(err) = self.store.delete(&lock.key).await {
            warn!(key = %lock.key, error = %err, "failed to release lock; TTL will reclaim it");
        }
    }

    /// Release every lock in the set, in reverse acquisition order.
    pub async fn release_all(&self, mut set: LockSet) {
        while let Some(lock) = set.held.pop() {
            self.release(lock).await;
        }
    }
}
