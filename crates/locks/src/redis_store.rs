//! Redis-backed lock store.
//!
//! Claims are plain keys written with `SET NX`; the TTL is applied with a
//! follow-up `EXPIRE` (the claim and its expiry are two round trips, so a
//! holder that crashes in between leaves a key with no TTL — the manager
//! refreshes the TTL immediately after every successful claim to keep that
//! window one backoff wide).

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::store::{LockStore, LockStoreError};

/// Lock store backed by a shared Redis instance.
///
/// Uses `ConnectionManager` for reconnection handling; clones share the
/// underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
}

impl RedisLockStore {
    /// Connect to Redis at `redis_url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(redis_url: &str) -> Result<Self, LockStoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| LockStoreError::Backend(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| LockStoreError::Backend(format!("redis connect failed: {e}")))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, LockStoreError> {
        let mut conn = self.conn.clone();
        let claimed: bool = conn
            .set_nx(key, value)
            .await
            .map_err(|e| LockStoreError::Backend(e.to_string()))?;
        Ok(claimed)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), LockStoreError> {
        let mut conn = self.conn.clone();
        let seconds = i64::try_from(ttl.as_secs().max(1))
            .map_err(|e| LockStoreError::Backend(e.to_string()))?;
        conn.expire::<_, ()>(key, seconds)
            .await
            .map_err(|e| LockStoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), LockStoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| LockStoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
