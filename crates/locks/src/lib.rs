//! `reservoir-locks` — per-product mutual exclusion over a shared store.
//!
//! A lock is a TTL-bearing key in a store shared by every service instance.
//! Acquisition is an atomic set-if-absent with bounded backoff-retry;
//! multi-product operations acquire in ascending product-id order and
//! release in reverse, which makes cross-order deadlock structurally
//! impossible.

pub mod manager;
pub mod redis_store;
pub mod store;

pub use manager::{LockConfig, LockError, LockManager, LockSet};
pub use redis_store::RedisLockStore;
pub use store::{InMemoryLockStore, LockStore, LockStoreError};
