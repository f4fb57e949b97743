//! Postgres-backed stock ledger.
//!
//! ## Thread safety
//!
//! `PostgresLedger` is `Send + Sync` and can be shared across tasks; all
//! operations go through the SQLx connection pool. Transactions are owned
//! by the caller for the duration of one logical operation and either
//! committed or rolled back explicitly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use reservoir_core::{LineSet, Order, OrderId, Product, ProductId};

use crate::error::{map_sqlx_error, LedgerError};
use crate::outbox::{OutboxEntry, OutboxOp};
use crate::store::{NewOrderRow, StockLedger};

/// Stock ledger over a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn product_from_row(row: &sqlx::postgres::PgRow) -> Result<Product, LedgerError> {
    let read = |e: sqlx::Error| LedgerError::Sql(format!("failed to read product row: {e}"));
    Ok(Product {
        id: ProductId::new(row.try_get::<i64, _>("id").map_err(read)?),
        name: row.try_get("name").map_err(read)?,
        description: row.try_get("description").map_err(read)?,
        price: row.try_get::<Decimal, _>("price").map_err(read)?,
        stock: row.try_get::<i64, _>("stock").map_err(read)?,
    })
}

fn order_from_row(row: &sqlx::postgres::PgRow) -> Result<Order, LedgerError> {
    let read = |e: sqlx::Error| LedgerError::Sql(format!("failed to read order row: {e}"));
    Ok(Order {
        id: OrderId::new(row.try_get::<i64, _>("id").map_err(read)?),
        name: row.try_get("name").map_err(read)?,
        description: row.try_get("description").map_err(read)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(read)?,
        total_amount: row.try_get::<Decimal, _>("total_amount").map_err(read)?,
    })
}

#[async_trait]
impl StockLedger for PostgresLedger {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, LedgerError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), LedgerError> {
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), LedgerError> {
        tx.rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }

    #[instrument(skip(self, tx), fields(product_id = %id), err)]
    async fn product_for_update(
        &self,
        tx: &mut Self::Tx,
        id: ProductId,
    ) -> Result<Option<Product>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, price, stock
            FROM products
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.get())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("product_for_update", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn product_by_id(
        &self,
        tx: &mut Self::Tx,
        id: ProductId,
    ) -> Result<Option<Product>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, price, stock
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("product_by_id", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn adjust_stock(
        &self,
        tx: &mut Self::Tx,
        id: ProductId,
        delta: i64,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
            .bind(id.get())
            .bind(delta)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("adjust_stock", e))?;

        if result.rows_affected() != 1 {
            return Err(LedgerError::Conflict(format!(
                "product {id} disappeared during stock adjustment"
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, tx, row), fields(order_name = row.name), err)]
    async fn insert_order(
        &self,
        tx: &mut Self::Tx,
        row: NewOrderRow<'_>,
    ) -> Result<OrderId, LedgerError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (name, description, created_at, total_amount)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(row.name)
        .bind(row.description)
        .bind(row.created_at)
        .bind(row.total_amount)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        let id: i64 = inserted
            .try_get("id")
            .map_err(|e| LedgerError::Sql(format!("failed to read inserted order id: {e}")))?;
        Ok(OrderId::new(id))
    }

    async fn update_order_header(
        &self,
        tx: &mut Self::Tx,
        id: OrderId,
        name: &str,
        description: Option<&str>,
        total_amount: Decimal,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET name = $2, description = $3, total_amount = $4
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .bind(name)
        .bind(description)
        .bind(total_amount)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_order_header", e))?;

        if result.rows_affected() != 1 {
            return Err(LedgerError::Conflict(format!(
                "order {id} disappeared during header update"
            )));
        }
        Ok(())
    }

    async fn replace_lines(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        lines: &LineSet,
    ) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM order_lines WHERE order_id = $1")
            .bind(order_id.get())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("replace_lines/delete", e))?;

        for (product_id, quantity) in lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, product_id, quantity)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(order_id.get())
            .bind(product_id.get())
            .bind(i32::try_from(*quantity).map_err(|e| {
                LedgerError::Constraint(format!("quantity out of range for product {product_id}: {e}"))
            })?)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("replace_lines/insert", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, tx), fields(order_id = %id), err)]
    async fn delete_order(&self, tx: &mut Self::Tx, id: OrderId) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM order_lines WHERE order_id = $1")
            .bind(id.get())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("delete_order/lines", e))?;

        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.get())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("delete_order/header", e))?;
        Ok(())
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, created_at, total_amount
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("order_by_id", e))?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn lines_for_order(&self, id: OrderId) -> Result<LineSet, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, quantity
            FROM order_lines
            WHERE order_id = $1
            ORDER BY product_id
            "#,
        )
        .bind(id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("lines_for_order", e))?;

        let mut lines = LineSet::new();
        for row in rows {
            let product_id: i64 = row
                .try_get("product_id")
                .map_err(|e| LedgerError::Sql(format!("failed to read line row: {e}")))?;
            let quantity: i32 = row
                .try_get("quantity")
                .map_err(|e| LedgerError::Sql(format!("failed to read line row: {e}")))?;
            let quantity = u32::try_from(quantity).map_err(|e| {
                LedgerError::Sql(format!("negative quantity for product {product_id}: {e}"))
            })?;
            lines.insert(ProductId::new(product_id), quantity);
        }
        Ok(lines)
    }

    #[instrument(skip(self, payload), fields(order_id = %order_id, op = op.as_str()), err)]
    async fn outbox_enqueue(
        &self,
        order_id: OrderId,
        op: OutboxOp,
        payload: Option<serde_json::Value>,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO projection_outbox (order_id, op, payload)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(order_id.get())
        .bind(op.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("outbox_enqueue", e))?;
        Ok(())
    }

    async fn outbox_pending(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<OutboxEntry>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, op, payload, attempts, created_at
            FROM projection_outbox
            WHERE attempts < $1
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("outbox_pending", e))?;

        let read = |e: sqlx::Error| LedgerError::Sql(format!("failed to read outbox row: {e}"));
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(OutboxEntry {
                id: row.try_get("id").map_err(read)?,
                order_id: OrderId::new(row.try_get::<i64, _>("order_id").map_err(read)?),
                op: OutboxOp::parse(row.try_get::<String, _>("op").map_err(read)?.as_str())?,
                payload: row.try_get("payload").map_err(read)?,
                attempts: row.try_get("attempts").map_err(read)?,
                created_at: row.try_get("created_at").map_err(read)?,
            });
        }
        Ok(entries)
    }

    async fn outbox_complete(&self, entry_id: i64) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM projection_outbox WHERE id = $1")
            .bind(entry_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("outbox_complete", e))?;
        Ok(())
    }

    async fn outbox_bump_attempts(&self, entry_id: i64) -> Result<(), LedgerError> {
        sqlx::query("UPDATE projection_outbox SET attempts = attempts + 1 WHERE id = $1")
            .bind(entry_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("outbox_bump_attempts", e))?;
        Ok(())
    }
}
