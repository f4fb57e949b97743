//! Production wiring: open every collaborator at service start, close at
//! shutdown.
//!
//! The clients are constructed once and injected into the service — never
//! reached for as ambient globals — so tests substitute the in-memory
//! implementations without touching the workflows.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::info;

use reservoir_ledger::{error::map_sqlx_error, LedgerError, PostgresLedger};
use reservoir_locks::{LockManager, LockStoreError, RedisLockStore};
use reservoir_search::{MeilisearchIndex, SearchError};

use crate::config::ServiceConfig;
use crate::service::OrderService;

/// The fully wired production service type.
pub type ProductionOrderService = OrderService<PostgresLedger, RedisLockStore, MeilisearchIndex>;

/// Failure while bringing the stack up.
#[derive(Debug, Error)]
pub enum StackError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    LockStore(#[from] LockStoreError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Owns the connected collaborators for the lifetime of the process.
pub struct OrderStack {
    pool: sqlx::PgPool,
    service: ProductionOrderService,
}

impl OrderStack {
    /// Connect Postgres, Redis, and Meilisearch, apply index settings,
    /// and wire the order service.
    pub async fn connect(config: &ServiceConfig) -> Result<Self, StackError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_db_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let ledger = Arc::new(PostgresLedger::new(pool.clone()));

        let lock_store = Arc::new(RedisLockStore::connect(&config.redis_url).await?);
        let locks = LockManager::new(lock_store, config.lock);

        let index = MeilisearchIndex::new(
            config.meilisearch_url.as_str(),
            config.meilisearch_api_key.clone(),
        );
        index.ensure_settings().await?;

        let service = OrderService::new(ledger, locks, Arc::new(index));
        info!("order stack connected");
        Ok(Self { pool, service })
    }

    pub fn service(&self) -> &ProductionOrderService {
        &self.service
    }

    /// Drain and close the database pool. Redis and Meilisearch clients
    /// close with their last clone.
    pub async fn close(self) {
        self.pool.close().await;
        info!("order stack closed");
    }
}
