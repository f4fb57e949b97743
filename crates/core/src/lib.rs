//! `reservoir-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error taxonomy, the product/order model, and the
//! reconciliation engine that turns two order line sets into per-product
//! stock deltas.

pub mod error;
pub mod id;
pub mod order;
pub mod product;
pub mod reconcile;

pub use error::{DomainError, DomainResult};
pub use id::{OrderId, ProductId};
pub use order::{LineSet, Order, OrderDraft, OrderLine};
pub use product::Product;
pub use reconcile::{reconcile, DeltaKind, StockDelta};
