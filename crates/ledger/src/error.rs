//! Ledger error model and sqlx error mapping.
//!
//! SQLx errors are mapped as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerError | Scenario |
//! |------------|----------------------|-------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate key under concurrency |
//! | Database (serialization failure) | `40001` | `Conflict` | Concurrent transactions collided |
//! | Database (foreign key violation) | `23503` | `Constraint` | Line references a missing row |
//! | Database (check constraint violation) | `23514` | `Constraint` | Invalid data (e.g. quantity <= 0) |
//! | Database (other) | Any other | `Sql` | Other database errors |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` | Connection pool / network failures |
//! | Other | N/A | `Sql` | Decode errors, protocol errors, etc. |

use thiserror::Error;

/// Failure at the relational storage layer.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Concurrent transactions collided (unique violation, serialization
    /// failure, or a row that vanished mid-transaction).
    #[error("ledger conflict: {0}")]
    Conflict(String),

    /// A database constraint rejected the write.
    #[error("ledger constraint violated: {0}")]
    Constraint(String),

    /// The database could not be reached (pool closed, timeouts, IO).
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// Any other SQL-level failure.
    #[error("ledger error: {0}")]
    Sql(String),
}

/// Map a sqlx error to a `LedgerError`, tagging the failing operation.
pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") => LedgerError::Conflict(msg),
                Some("23503") | Some("23514") => LedgerError::Constraint(msg),
                _ => LedgerError::Sql(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            LedgerError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            LedgerError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::Io(e) => LedgerError::Unavailable(format!("io error in {operation}: {e}")),
        other => LedgerError::Sql(format!("sqlx error in {operation}: {other}")),
    }
}
