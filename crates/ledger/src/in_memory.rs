//! In-memory stock ledger for tests.
//!
//! Transactions buffer their writes and apply them atomically on commit;
//! reads observe committed state only. Row locking is not simulated —
//! tests rely on the resource lock manager for per-product serialization,
//! exactly as the production protocol does.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use reservoir_core::{LineSet, Order, OrderId, Product, ProductId};

use crate::error::LedgerError;
use crate::outbox::{OutboxEntry, OutboxOp};
use crate::store::{NewOrderRow, StockLedger};

#[derive(Debug, Default)]
struct State {
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    lines: BTreeMap<OrderId, LineSet>,
    outbox: BTreeMap<i64, OutboxEntry>,
    next_order_id: i64,
    next_outbox_id: i64,
}

#[derive(Debug)]
enum Op {
    AdjustStock(ProductId, i64),
    InsertOrder(Order),
    UpdateHeader {
        id: OrderId,
        name: String,
        description: Option<String>,
        total_amount: Decimal,
    },
    ReplaceLines(OrderId, LineSet),
    DeleteOrder(OrderId),
}

/// Buffered write set for one in-memory transaction.
#[derive(Debug, Default)]
pub struct InMemoryTx {
    ops: Vec<Op>,
}

/// Test double for the Postgres ledger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<State>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a product row (test setup; production products arrive through
    /// the excluded catalog CRUD surface).
    pub fn seed_product(&self, id: i64, name: &str, price: Decimal, stock: i64) -> ProductId {
        let product_id = ProductId::new(id);
        self.state.lock().unwrap().products.insert(
            product_id,
            Product {
                id: product_id,
                name: name.to_string(),
                description: None,
                price,
                stock,
            },
        );
        product_id
    }

    /// Committed stock level (test assertion helper).
    pub fn stock_of(&self, id: ProductId) -> Option<i64> {
        self.state.lock().unwrap().products.get(&id).map(|p| p.stock)
    }

    /// Number of committed order rows (test assertion helper).
    pub fn order_count(&self) -> usize {
        self.state.lock().unwrap().orders.len()
    }

    /// Snapshot of the outbox (test assertion helper).
    pub fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.state.lock().unwrap().outbox.values().cloned().collect()
    }
}

impl State {
    fn apply(&mut self, op: Op) {
        match op {
            Op::AdjustStock(id, delta) => {
                if let Some(product) = self.products.get_mut(&id) {
                    product.stock += delta;
                    debug_assert!(product.stock >= 0, "reservation protocol violated");
                }
            }
            Op::InsertOrder(order) => {
                self.orders.insert(order.id, order);
            }
            Op::UpdateHeader {
                id,
                name,
                description,
                total_amount,
            } => {
                if let Some(order) = self.orders.get_mut(&id) {
                    order.name = name;
                    order.description = description;
                    order.total_amount = total_amount;
                }
            }
            Op::ReplaceLines(order_id, lines) => {
                self.lines.insert(order_id, lines);
            }
            Op::DeleteOrder(id) => {
                self.lines.remove(&id);
                self.orders.remove(&id);
            }
        }
    }
}

#[async_trait]
impl StockLedger for InMemoryLedger {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<Self::Tx, LedgerError> {
        Ok(InMemoryTx::default())
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();
        for op in tx.ops {
            state.apply(op);
        }
        Ok(())
    }

    async fn rollback(&self, _tx: Self::Tx) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn product_for_update(
        &self,
        _tx: &mut Self::Tx,
        id: ProductId,
    ) -> Result<Option<Product>, LedgerError> {
        Ok(self.state.lock().unwrap().products.get(&id).cloned())
    }

    async fn product_by_id(
        &self,
        _tx: &mut Self::Tx,
        id: ProductId,
    ) -> Result<Option<Product>, LedgerError> {
        Ok(self.state.lock().unwrap().products.get(&id).cloned())
    }

    async fn adjust_stock(
        &self,
        tx: &mut Self::Tx,
        id: ProductId,
        delta: i64,
    ) -> Result<(), LedgerError> {
        tx.ops.push(Op::AdjustStock(id, delta));
        Ok(())
    }

    async fn insert_order(
        &self,
        tx: &mut Self::Tx,
        row: NewOrderRow<'_>,
    ) -> Result<OrderId, LedgerError> {
        // Ids come from a sequence and survive rollback, as in Postgres.
        let id = {
            let mut state = self.state.lock().unwrap();
            state.next_order_id += 1;
            OrderId::new(state.next_order_id)
        };
        tx.ops.push(Op::InsertOrder(Order {
            id,
            name: row.name.to_string(),
            description: row.description.map(str::to_string),
            created_at: row.created_at,
            total_amount: row.total_amount,
        }));
        Ok(id)
    }

    async fn update_order_header(
        &self,
        tx: &mut Self::Tx,
        id: OrderId,
        name: &str,
        description: Option<&str>,
        total_amount: Decimal,
    ) -> Result<(), LedgerError> {
        tx.ops.push(Op::UpdateHeader {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            total_amount,
        });
        Ok(())
    }

    async fn replace_lines(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        lines: &LineSet,
    ) -> Result<(), LedgerError> {
        tx.ops.push(Op::ReplaceLines(order_id, lines.clone()));
        Ok(())
    }

    async fn delete_order(&self, tx: &mut Self::Tx, id: OrderId) -> Result<(), LedgerError> {
        tx.ops.push(Op::DeleteOrder(id));
        Ok(())
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, LedgerError> {
        Ok(self.state.lock().unwrap().orders.get(&id).cloned())
    }

    async fn lines_for_order(&self, id: OrderId) -> Result<LineSet, LedgerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .lines
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn outbox_enqueue(
        &self,
        order_id: OrderId,
        op: OutboxOp,
        payload: Option<serde_json::Value>,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.next_outbox_id += 1;
        let id = state.next_outbox_id;
        state.outbox.insert(
            id,
            OutboxEntry {
                id,
                order_id,
                op,
                payload,
                attempts: 0,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn outbox_pending(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, LedgerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .outbox
            .values()
            .filter(|e| e.attempts < max_attempts)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn outbox_complete(&self, entry_id: i64) -> Result<(), LedgerError> {
        self.state.lock().unwrap().outbox.remove(&entry_id);
        Ok(())
    }

    async fn outbox_bump_attempts(&self, entry_id: i64) -> Result<(), LedgerError> {
        if let Some(entry) = self.state.lock().unwrap().outbox.get_mut(&entry_id) {
            entry.attempts += 1;
        }
        Ok(())
    }
}
