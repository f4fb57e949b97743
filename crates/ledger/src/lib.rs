//! `reservoir-ledger` — the authoritative relational store of stock and
//! orders.
//!
//! All mutation happens inside a single commit-or-rollback unit per logical
//! operation, with row-level locking (`SELECT ... FOR UPDATE`) on product
//! rows as the storage-layer defense beneath the distributed lock manager.
//!
//! ## Expected schema
//!
//! Schema management is owned by the surrounding deployment, not this
//! crate. The queries here assume:
//!
//! ```sql
//! CREATE TABLE products (
//!     id          BIGSERIAL PRIMARY KEY,
//!     name        TEXT NOT NULL,
//!     description TEXT,
//!     price       NUMERIC NOT NULL,
//!     stock       BIGINT NOT NULL
//! );
//!
//! CREATE TABLE orders (
//!     id           BIGSERIAL PRIMARY KEY,
//!     name         TEXT NOT NULL,
//!     description  TEXT,
//!     created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     total_amount NUMERIC NOT NULL
//! );
//!
//! CREATE TABLE order_lines (
//!     order_id   BIGINT NOT NULL REFERENCES orders (id),
//!     product_id BIGINT NOT NULL REFERENCES products (id),
//!     quantity   INTEGER NOT NULL CHECK (quantity > 0),
//!     PRIMARY KEY (order_id, product_id)
//! );
//!
//! CREATE TABLE projection_outbox (
//!     id         BIGSERIAL PRIMARY KEY,
//!     order_id   BIGINT NOT NULL,
//!     op         TEXT NOT NULL,
//!     payload    JSONB,
//!     attempts   INTEGER NOT NULL DEFAULT 0,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

pub mod error;
pub mod in_memory;
pub mod outbox;
pub mod postgres;
pub mod store;

pub use error::LedgerError;
pub use in_memory::InMemoryLedger;
pub use outbox::{OutboxEntry, OutboxOp};
pub use postgres::PostgresLedger;
pub use store::{NewOrderRow, StockLedger};
