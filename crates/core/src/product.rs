//! Product: the unit of stock reservation.

use rust_decimal::Decimal;

use crate::error::{DomainError, DomainResult};
use crate::id::ProductId;

/// A catalog product with a finite stock level.
///
/// `stock` is only ever mutated through the locked reservation/release
/// protocol; it must never go negative. `price` is the per-unit amount used
/// to snapshot an order's `total_amount` at mutation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i64,
}

impl Product {
    /// Check that the product can cover `requested` additional units.
    pub fn ensure_stock_for(&self, requested: u32) -> DomainResult<()> {
        if self.stock < i64::from(requested) {
            return Err(DomainError::insufficient_stock(
                self.id,
                requested,
                self.stock,
            ));
        }
        Ok(())
    }

    /// Amount contributed by `quantity` units at the current price.
    pub fn line_amount(&self, quantity: u32) -> Decimal {
        self.price * Decimal::from(quantity)
    }
}
