//! The order document model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use reservoir_core::OrderId;

/// A line's product as it looked when the document was indexed.
///
/// This is a snapshot, not a live reference: later price or name changes to
/// the product do not rewrite existing documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
}

/// One searchable document per order.
///
/// `created_at` is stored as epoch seconds so the index can range-filter
/// on it; money fields serialize as plain JSON numbers at this edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDocument {
    pub id: OrderId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub products: Vec<ProductSnapshot>,
}
