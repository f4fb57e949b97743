//! `reservoir-orders` — the order aggregate service.
//!
//! The central state machine of the system: create/update/delete workflows
//! that acquire per-product locks in canonical order, validate and mutate
//! stock inside one ledger transaction, commit, and then push the aggregate
//! to the search projection. Reads for single-order lookup and
//! listing/search go to the projection, never to the ledger.
//!
//! Three failure domains meet here — the relational transaction, the
//! distributed lock store, and the external index — and none of them are
//! jointly transactional. The workflows make them *appear* atomic to
//! callers: locks serialize per-product stock movement, the transaction
//! makes each order all-or-nothing, and the post-commit projection step is
//! eventually consistent with an outbox for replay.

pub mod config;
pub mod error;
pub mod projection;
pub mod service;
pub mod stack;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, ServiceConfig};
pub use error::ServiceError;
pub use projection::{order_document, product_snapshot, DrainReport, ProjectionSynchronizer};
pub use service::OrderService;
pub use stack::{OrderStack, StackError};
