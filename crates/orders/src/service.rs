//! Order aggregate service: create / update / delete workflows.
//!
//! Every mutation follows the same shape:
//!
//! ```text
//! validate input
//!   ↓
//! acquire the involved products' locks (ascending id order)
//!   ↓
//! one ledger transaction: validate stock → move stock → persist rows
//!   ↓
//! commit, release locks (reverse order)
//!   ↓
//! push the aggregate to the search projection (post-commit, outboxed on failure)
//! ```
//!
//! The locks are held across the *entire* check-then-mutate span for each
//! product — releasing between the stock check and the decrement would let
//! a concurrent order reserve the same units. Validation for a whole
//! operation completes before any stock moves, so a failure anywhere
//! leaves every product untouched.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{instrument, warn};

use reservoir_core::{
    reconcile, DeltaKind, DomainError, LineSet, Order, OrderDraft, OrderId, ProductId, StockDelta,
};
use reservoir_ledger::{NewOrderRow, StockLedger};
use reservoir_locks::{LockManager, LockStore};
use reservoir_search::{DateRange, OrderDocument, ProductSnapshot, SearchIndex};

use crate::error::ServiceError;
use crate::projection::{order_document, product_snapshot, ProjectionSynchronizer};

/// Orchestrates locks, ledger transactions, and projection sync for order
/// mutations. All collaborators are injected and shared; the service
/// itself is stateless and cheap to clone.
pub struct OrderService<L, K, S> {
    ledger: Arc<L>,
    locks: LockManager<K>,
    projection: ProjectionSynchronizer<L, S>,
}

impl<L, K, S> Clone for OrderService<L, K, S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            locks: self.locks.clone(),
            projection: self.projection.clone(),
        }
    }
}

impl<L, K, S> OrderService<L, K, S>
where
    L: StockLedger,
    K: LockStore,
    S: SearchIndex,
{
    pub fn new(ledger: Arc<L>, locks: LockManager<K>, index: Arc<S>) -> Self {
        let projection = ProjectionSynchronizer::new(Arc::clone(&ledger), index);
        Self {
            ledger,
            locks,
            projection,
        }
    }

    /// The projection synchronizer (read paths and outbox drain).
    pub fn projection(&self) -> &ProjectionSynchronizer<L, S> {
        &self.projection
    }

    /// Create an order, reserving stock for every line.
    ///
    /// All-or-nothing: if any product is missing or short on stock, no
    /// stock moves and no order row is persisted. `total_amount` snapshots
    /// each line's price as observed at validation time.
    #[instrument(skip(self, draft), fields(order_name = %draft.name), err)]
    pub async fn create_order(&self, draft: &OrderDraft) -> Result<Order, ServiceError> {
        let lines = draft.validated_lines()?;
        let product_ids: Vec<ProductId> = lines.keys().copied().collect();

        let locks = self.locks.acquire_all(&product_ids).await?;
        let reserved = self.run_create_tx(draft, &lines).await;
        self.locks.release_all(locks).await;

        let (order, snapshots) = reserved?;
        self.projection.upsert(order_document(&order, snapshots)).await;
        Ok(order)
    }

    /// Replace an order's line set wholesale, moving only the net stock
    /// difference per product.
    ///
    /// Every consume delta is validated before any delta is applied; a
    /// replacement that fails leaves all products and the order untouched.
    /// `total_amount` is recomputed from the new lines' current prices.
    #[instrument(skip(self, draft), fields(order_id = %order_id), err)]
    pub async fn update_order(
        &self,
        order_id: OrderId,
        draft: &OrderDraft,
    ) -> Result<Order, ServiceError> {
        let desired = draft.validated_lines()?;

        let existing = self
            .ledger
            .order_by_id(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;
        let current = self.ledger.lines_for_order(order_id).await?;

        let deltas = reconcile(&current, &desired);
        let delta_ids: Vec<ProductId> = deltas.iter().map(|d| d.product_id).collect();

        let locks = self.locks.acquire_all(&delta_ids).await?;
        let reconciled = self
            .run_update_tx(&existing, draft, &desired, &deltas)
            .await;
        self.locks.release_all(locks).await;

        let (order, snapshots) = reconciled?;
        self.projection.upsert(order_document(&order, snapshots)).await;
        Ok(order)
    }

    /// Delete an order, returning every line's quantity to stock.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn delete_order(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        let existing = self
            .ledger
            .order_by_id(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;
        let lines = self.ledger.lines_for_order(order_id).await?;
        let product_ids: Vec<ProductId> = lines.keys().copied().collect();

        let locks = self.locks.acquire_all(&product_ids).await?;
        let deleted = self.run_delete_tx(order_id, &lines).await;
        self.locks.release_all(locks).await;

        deleted?;
        self.projection.delete(order_id).await;
        Ok(existing)
    }

    /// Single-order lookup, served by the projection.
    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderDocument, ServiceError> {
        self.projection
            .get(order_id)
            .await?
            .ok_or_else(|| DomainError::OrderNotFound(order_id).into())
    }

    /// List/search orders, served by the projection. An empty query
    /// matches everything inside the date range.
    pub async fn list_orders(
        &self,
        query: &str,
        range: &DateRange,
    ) -> Result<Vec<OrderDocument>, ServiceError> {
        Ok(self.projection.search(query, range).await?)
    }

    async fn run_create_tx(
        &self,
        draft: &OrderDraft,
        lines: &LineSet,
    ) -> Result<(Order, Vec<ProductSnapshot>), ServiceError> {
        let mut tx = self.ledger.begin().await?;
        match self.create_in_tx(&mut tx, draft, lines).await {
            Ok(created) => {
                self.ledger.commit(tx).await?;
                Ok(created)
            }
            Err(err) => {
                self.rollback(tx).await;
                Err(err)
            }
        }
    }

    async fn create_in_tx(
        &self,
        tx: &mut L::Tx,
        draft: &OrderDraft,
        lines: &LineSet,
    ) -> Result<(Order, Vec<ProductSnapshot>), ServiceError> {
        let created_at = Utc::now();
        let mut total_amount = Decimal::ZERO;
        let mut snapshots = Vec::with_capacity(lines.len());

        // Check and decrement under the held lock and row lock, product by
        // product, in the same canonical order the locks were taken.
        for (&product_id, &quantity) in lines {
            let product = self
                .ledger
                .product_for_update(tx, product_id)
                .await?
                .ok_or(DomainError::ProductNotFound(product_id))?;
            product.ensure_stock_for(quantity)?;

            total_amount += product.line_amount(quantity);
            self.ledger
                .adjust_stock(tx, product_id, -i64::from(quantity))
                .await?;
            snapshots.push(product_snapshot(&product, quantity));
        }

        let id = self
            .ledger
            .insert_order(
                tx,
                NewOrderRow {
                    name: &draft.name,
                    description: draft.description.as_deref(),
                    created_at,
                    total_amount,
                },
            )
            .await?;
        self.ledger.replace_lines(tx, id, lines).await?;

        let order = Order {
            id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            created_at,
            total_amount,
        };
        Ok((order, snapshots))
    }

    async fn run_update_tx(
        &self,
        existing: &Order,
        draft: &OrderDraft,
        desired: &LineSet,
        deltas: &[StockDelta],
    ) -> Result<(Order, Vec<ProductSnapshot>), ServiceError> {
        let mut tx = self.ledger.begin().await?;
        match self
            .update_in_tx(&mut tx, existing, draft, desired, deltas)
            .await
        {
            Ok(updated) => {
                self.ledger.commit(tx).await?;
                Ok(updated)
            }
            Err(err) => {
                self.rollback(tx).await;
                Err(err)
            }
        }
    }

    async fn update_in_tx(
        &self,
        tx: &mut L::Tx,
        existing: &Order,
        draft: &OrderDraft,
        desired: &LineSet,
        deltas: &[StockDelta],
    ) -> Result<(Order, Vec<ProductSnapshot>), ServiceError> {
        // Validate the whole delta set before applying any of it.
        for delta in deltas {
            let product = self
                .ledger
                .product_for_update(tx, delta.product_id)
                .await?
                .ok_or(DomainError::ProductNotFound(delta.product_id))?;
            if delta.kind == DeltaKind::Consume {
                product.ensure_stock_for(delta.quantity)?;
            }
        }

        for delta in deltas {
            self.ledger
                .adjust_stock(tx, delta.product_id, delta.stock_adjustment())
                .await?;
        }

        // Recompute the total from the new lines' current prices and
        // snapshot the products for the document.
        let mut total_amount = Decimal::ZERO;
        let mut snapshots = Vec::with_capacity(desired.len());
        for (&product_id, &quantity) in desired {
            let product = self
                .ledger
                .product_by_id(tx, product_id)
                .await?
                .ok_or(DomainError::ProductNotFound(product_id))?;
            total_amount += product.line_amount(quantity);
            snapshots.push(product_snapshot(&product, quantity));
        }

        self.ledger.replace_lines(tx, existing.id, desired).await?;
        self.ledger
            .update_order_header(
                tx,
                existing.id,
                &draft.name,
                draft.description.as_deref(),
                total_amount,
            )
            .await?;

        let order = Order {
            id: existing.id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            created_at: existing.created_at,
            total_amount,
        };
        Ok((order, snapshots))
    }

    async fn run_delete_tx(&self, order_id: OrderId, lines: &LineSet) -> Result<(), ServiceError> {
        let mut tx = self.ledger.begin().await?;
        match self.delete_in_tx(&mut tx, order_id, lines).await {
            Ok(()) => {
                self.ledger.commit(tx).await?;
                Ok(())
            }
            Err(err) => {
                self.rollback(tx).await;
                Err(err)
            }
        }
    }

    async fn delete_in_tx(
        &self,
        tx: &mut L::Tx,
        order_id: OrderId,
        lines: &LineSet,
    ) -> Result<(), ServiceError> {
        for (&product_id, &quantity) in lines {
            match self.ledger.product_for_update(tx, product_id).await? {
                Some(_) => {
                    self.ledger
                        .adjust_stock(tx, product_id, i64::from(quantity))
                        .await?;
                }
                // Nothing left to restock; with referential integrity in
                // place this branch is unreachable.
                None => warn!(product_id = %product_id, order_id = %order_id,
                    "product missing during restock; skipping"),
            }
        }
        self.ledger.delete_order(tx, order_id).await?;
        Ok(())
    }

    async fn rollback(&self, tx: L::Tx) {
        if let Err(err) = self.ledger.rollback(tx).await {
            warn!(error = %err, "transaction rollback failed");
        }
    }
}
