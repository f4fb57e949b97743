//! Projection outbox types.
//!
//! When a ledger commit succeeds but the projection write fails, the
//! mutation must not be rolled back — instead the pending synchronization
//! is recorded here and retried by an explicit drain pass.

use chrono::{DateTime, Utc};

use reservoir_core::OrderId;

use crate::error::LedgerError;

/// The projection operation an outbox entry replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxOp {
    /// Re-push the order's document (create/update).
    Upsert,
    /// Remove the order's document (delete).
    Delete,
}

impl OutboxOp {
    pub fn as_str(self) -> &'static str {
        match self {
            OutboxOp::Upsert => "upsert",
            OutboxOp::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s {
            "upsert" => Ok(OutboxOp::Upsert),
            "delete" => Ok(OutboxOp::Delete),
            other => Err(LedgerError::Sql(format!("unknown outbox op: {other}"))),
        }
    }
}

/// A pending projection synchronization.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: i64,
    pub order_id: OrderId,
    pub op: OutboxOp,
    /// For upserts: the serialized document to re-push. Deletes carry no
    /// payload.
    pub payload: Option<serde_json::Value>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}
