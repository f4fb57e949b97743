//! Search projection synchronization: write path, read path, and replay.
//!
//! The ledger commit and the index write are two stores with no shared
//! transaction. The synchronizer makes the pair converge: after every
//! committed mutation it pushes (or deletes) the order's document, and
//! when that push fails it records an outbox entry instead of rolling
//! back or silently dropping the update. `drain_outbox` replays pending
//! entries with a bounded attempt budget.

use std::sync::Arc;

use tracing::{error, instrument, warn};

use reservoir_core::{Order, OrderId, Product};
use reservoir_ledger::{OutboxEntry, OutboxOp, StockLedger};
use reservoir_search::{DateRange, OrderDocument, ProductSnapshot, SearchError, SearchIndex};

use crate::error::ServiceError;

/// Replay attempts per outbox entry before it is left dead in the table.
pub const MAX_SYNC_ATTEMPTS: i32 = 5;

/// Snapshot a product's fields for embedding in an order document.
pub fn product_snapshot(product: &Product, quantity: u32) -> ProductSnapshot {
    ProductSnapshot {
        name: product.name.clone(),
        description: product.description.clone(),
        price: product.price,
        quantity,
    }
}

/// Build the denormalized document for a committed order.
pub fn order_document(order: &Order, products: Vec<ProductSnapshot>) -> OrderDocument {
    OrderDocument {
        id: order.id,
        name: order.name.clone(),
        description: order.description.clone(),
        created_at: order.created_at.timestamp(),
        total_amount: order.total_amount,
        products,
    }
}

/// Outcome of one `drain_outbox` pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub replayed: usize,
    pub failed: usize,
}

/// Keeps the queryable order copy convergent with the ledger.
pub struct ProjectionSynchronizer<L, S> {
    ledger: Arc<L>,
    index: Arc<S>,
}

impl<L, S> Clone for ProjectionSynchronizer<L, S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            index: Arc::clone(&self.index),
        }
    }
}

impl<L: StockLedger, S: SearchIndex> ProjectionSynchronizer<L, S> {
    pub fn new(ledger: Arc<L>, index: Arc<S>) -> Self {
        Self { ledger, index }
    }

    /// Push a freshly committed aggregate to the index.
    ///
    /// Post-commit and therefore never fatal: on failure the document is
    /// queued for replay and the error is logged, because the ledger
    /// mutation is already durable and must not be rolled back.
    pub async fn upsert(&self, document: OrderDocument) {
        if let Err(err) = self.index.add_or_update_document(&document).await {
            error!(order_id = %document.id, error = %err,
                "projection upsert failed after commit; queueing for replay");
            let payload = serde_json::to_value(&document).ok();
            self.enqueue(document.id, OutboxOp::Upsert, payload).await;
        }
    }

    /// Remove a deleted order's document from the index.
    pub async fn delete(&self, order_id: OrderId) {
        if let Err(err) = self.index.delete_document(order_id).await {
            error!(order_id = %order_id, error = %err,
                "projection delete failed after commit; queueing for replay");
            self.enqueue(order_id, OutboxOp::Delete, None).await;
        }
    }

    async fn enqueue(&self, order_id: OrderId, op: OutboxOp, payload: Option<serde_json::Value>) {
        if let Err(err) = self.ledger.outbox_enqueue(order_id, op, payload).await {
            // Both the index and the outbox are down; the log line is the
            // last trace of the divergence.
            error!(order_id = %order_id, error = %err,
                "failed to record projection replay task");
        }
    }

    /// Single-order lookup. `None` when the projection has no document.
    pub async fn get(&self, id: OrderId) -> Result<Option<OrderDocument>, SearchError> {
        self.index.get_document(id).await
    }

    /// Ranked search with an optional creation-date restriction. An empty
    /// query matches every document subject to the filter.
    pub async fn search(
        &self,
        query: &str,
        range: &DateRange,
    ) -> Result<Vec<OrderDocument>, SearchError> {
        self.index.search(query, range).await
    }

    /// Replay pending outbox entries, oldest first.
    ///
    /// Entries that fail again get their attempt count bumped; once an
    /// entry reaches [`MAX_SYNC_ATTEMPTS`] it stops being selected and
    /// stays in the table for operator inspection.
    #[instrument(skip(self), err)]
    pub async fn drain_outbox(&self, limit: i64) -> Result<DrainReport, ServiceError> {
        let pending = self.ledger.outbox_pending(MAX_SYNC_ATTEMPTS, limit).await?;

        let mut report = DrainReport::default();
        for entry in pending {
            match self.replay(&entry).await {
                Ok(()) => {
                    self.ledger.outbox_complete(entry.id).await?;
                    report.replayed += 1;
                }
                Err(err) => {
                    warn!(order_id = %entry.order_id, attempts = entry.attempts + 1,
                        error = %err, "projection replay failed");
                    self.ledger.outbox_bump_attempts(entry.id).await?;
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn replay(&self, entry: &OutboxEntry) -> Result<(), ServiceError> {
        let result = match entry.op {
            OutboxOp::Upsert => {
                let payload = entry.payload.clone().ok_or_else(|| {
                    SearchError::Decode("upsert outbox entry has no payload".to_string())
                });
                match payload.and_then(|p| {
                    serde_json::from_value::<OrderDocument>(p)
                        .map_err(|e| SearchError::Decode(e.to_string()))
                }) {
                    Ok(document) => self.index.add_or_update_document(&document).await,
                    Err(e) => Err(e),
                }
            }
            OutboxOp::Delete => self.index.delete_document(entry.order_id).await,
        };

        result.map_err(|source| ServiceError::ProjectionSync {
            order_id: entry.order_id,
            source,
        })
    }
}
