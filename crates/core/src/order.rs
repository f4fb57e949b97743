//! Order model: header, lines, and draft validation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{OrderId, ProductId};

/// An order header as persisted by the ledger.
///
/// `created_at` is set once at creation and never changes. `total_amount` is
/// a snapshot of `Σ price × quantity` taken at the time of the mutating
/// operation, not a live recomputation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub total_amount: Decimal,
}

/// One line of an order. `quantity` is always positive: a quantity of zero
/// is modeled as line absence, never as a zero-quantity line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Canonical in-memory form of an order's line set.
///
/// Keyed by product id, so iteration order doubles as the canonical
/// (ascending) lock-acquisition order for multi-product operations.
pub type LineSet = BTreeMap<ProductId, u32>;

/// Caller-supplied input for creating an order or replacing one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub name: String,
    pub description: Option<String>,
    pub lines: Vec<OrderLine>,
}

impl OrderDraft {
    /// Validate the draft and return its canonical line set.
    ///
    /// Rejected before any lock is acquired: empty name, zero quantities,
    /// and duplicate product lines (the line set is a map; silently merging
    /// duplicates would hide caller bugs).
    pub fn validated_lines(&self) -> DomainResult<LineSet> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("order name cannot be empty"));
        }

        let mut set = LineSet::new();
        for line in &self.lines {
            if line.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "quantity for product {} must be positive",
                    line.product_id
                )));
            }
            if set.insert(line.product_id, line.quantity).is_some() {
                return Err(DomainError::validation(format!(
                    "product {} appears more than once",
                    line.product_id
                )));
            }
        }
        Ok(set)
    }
}
