//! Stock ledger abstraction.
//!
//! The trait exposes transactional primitives (begin/commit/rollback plus
//! row operations against an open transaction) rather than whole
//! workflows: the order service owns the orchestration, the ledger owns
//! atomicity. Implementations: Postgres for production, in-memory for
//! tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use reservoir_core::{LineSet, Order, OrderId, Product, ProductId};

use crate::error::LedgerError;
use crate::outbox::{OutboxEntry, OutboxOp};

/// Field set for a new order row. The ledger assigns the id.
#[derive(Debug, Clone)]
pub struct NewOrderRow<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub total_amount: Decimal,
}

/// The authoritative relational store of product stock and order records.
///
/// Within one transaction, either all row mutations apply or none do.
/// Concurrent transactions touching the same product row serialize at the
/// storage layer (`product_for_update`), a secondary defense beneath the
/// resource lock manager.
#[async_trait]
pub trait StockLedger: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, LedgerError>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), LedgerError>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), LedgerError>;

    /// Read a product row with intent to write (row-level exclusive lock).
    async fn product_for_update(
        &self,
        tx: &mut Self::Tx,
        id: ProductId,
    ) -> Result<Option<Product>, LedgerError>;

    /// Plain product read inside the transaction (price snapshots for
    /// lines whose stock is not changing).
    async fn product_by_id(
        &self,
        tx: &mut Self::Tx,
        id: ProductId,
    ) -> Result<Option<Product>, LedgerError>;

    /// Apply a stock adjustment (negative = reserve, positive = restock).
    async fn adjust_stock(
        &self,
        tx: &mut Self::Tx,
        id: ProductId,
        delta: i64,
    ) -> Result<(), LedgerError>;

    /// Insert a new order header, returning its assigned id.
    async fn insert_order(
        &self,
        tx: &mut Self::Tx,
        row: NewOrderRow<'_>,
    ) -> Result<OrderId, LedgerError>;

    /// Update an order's mutable header fields (`created_at` is immutable).
    async fn update_order_header(
        &self,
        tx: &mut Self::Tx,
        id: OrderId,
        name: &str,
        description: Option<&str>,
        total_amount: Decimal,
    ) -> Result<(), LedgerError>;

    /// Replace the order's line set wholesale.
    async fn replace_lines(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        lines: &LineSet,
    ) -> Result<(), LedgerError>;

    /// Delete the order's lines and its header row.
    async fn delete_order(&self, tx: &mut Self::Tx, id: OrderId) -> Result<(), LedgerError>;

    /// Load an order header (write-path orchestration only; reads for
    /// callers go through the search projection).
    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, LedgerError>;

    /// Load an order's current line set.
    async fn lines_for_order(&self, id: OrderId) -> Result<LineSet, LedgerError>;

    /// Record a failed projection synchronization for later replay.
    async fn outbox_enqueue(
        &self,
        order_id: OrderId,
        op: OutboxOp,
        payload: Option<serde_json::Value>,
    ) -> Result<(), LedgerError>;

    /// Entries still waiting for replay, oldest first, with fewer than
    /// `max_attempts` failed attempts.
    async fn outbox_pending(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, LedgerError>;

    /// Remove a successfully replayed entry.
    async fn outbox_complete(&self, entry_id: i64) -> Result<(), LedgerError>;

    /// Count another failed replay attempt.
    async fn outbox_bump_attempts(&self, entry_id: i64) -> Result<(), LedgerError>;
}
