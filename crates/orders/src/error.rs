//! Service-level error composition.

use thiserror::Error;

use reservoir_core::{DomainError, OrderId};
use reservoir_ledger::LedgerError;
use reservoir_locks::LockError;
use reservoir_search::SearchError;

/// Everything an order workflow can fail with.
///
/// Domain errors (not found, insufficient stock, validation) reject the
/// operation with no side effects. Lock and ledger errors abort before
/// commit; the transaction rolls back. Projection failures on the write
/// path never surface here — the mutation is already durable, so they are
/// logged and queued for replay instead (`ProjectionSync` appears only
/// from the explicit outbox drain pass, and `Search` only from the read
/// path).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Read-path failure against the projection store.
    #[error(transparent)]
    Search(#[from] SearchError),

    /// A queued projection replay failed again.
    #[error("projection sync for order {order_id} failed: {source}")]
    ProjectionSync {
        order_id: OrderId,
        source: SearchError,
    },
}
