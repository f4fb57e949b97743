//! Reconciliation engine: minimal stock deltas between two line sets.
//!
//! Given an order's current line set and a desired replacement, compute the
//! per-product stock movement required to transition between them. Removed
//! or reduced lines restock; added or increased lines consume; unchanged
//! lines produce no delta.

use std::collections::BTreeSet;

use crate::id::ProductId;
use crate::order::LineSet;

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    /// Units leave stock (line added or quantity increased).
    Consume,
    /// Units return to stock (line removed or quantity reduced).
    Restock,
}

/// A per-product stock movement. `quantity` is always positive; the
/// direction lives in `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDelta {
    pub product_id: ProductId,
    pub kind: DeltaKind,
    pub quantity: u32,
}

impl StockDelta {
    /// The adjustment to apply to the product's stock level: negative for a
    /// consume, positive for a restock.
    pub fn stock_adjustment(&self) -> i64 {
        match self.kind {
            DeltaKind::Consume => -i64::from(self.quantity),
            DeltaKind::Restock => i64::from(self.quantity),
        }
    }
}

/// Compute the deltas required to move an order from `current` to `desired`.
///
/// Unions the product ids of both sets and takes `desired − current` per id
/// (absence counts as zero). Output is ordered by ascending product id —
/// the same canonical order used for lock acquisition.
pub fn reconcile(current: &LineSet, desired: &LineSet) -> Vec<StockDelta> {
    let ids: BTreeSet<ProductId> = current.keys().chain(desired.keys()).copied().collect();

    let mut deltas = Vec::new();
    for product_id in ids {
        let old = current.get(&product_id).copied().unwrap_or(0);
        let new = desired.get(&product_id).copied().unwrap_or(0);
        let diff = i64::from(new) - i64::from(old);
        if diff > 0 {
            deltas.push(StockDelta {
                product_id,
                kind: DeltaKind::Consume,
                quantity: diff as u32,
            });
        } else if diff < 0 {
            deltas.push(StockDelta {
                product_id,
                kind: DeltaKind::Restock,
                quantity: (-diff) as u32,
            });
        }
    }
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(entries: &[(i64, u32)]) -> LineSet {
        entries
            .iter()
            .map(|&(id, qty)| (ProductId::new(id), qty))
            .collect()
    }

    fn delta(id: i64, kind: DeltaKind, quantity: u32) -> StockDelta {
        StockDelta {
            product_id: ProductId::new(id),
            kind,
            quantity,
        }
    }

    #[test]
    fn identical_sets_produce_no_deltas() {
        let s = set(&[(1, 3), (2, 2)]);
        assert!(reconcile(&s, &s).is_empty());
    }

    #[test]
    fn mixed_update_produces_signed_deltas() {
        // {A:3, B:2} -> {A:1, B:5, C:2}: restock A by 2, consume B by 3,
        // consume C by 2.
        let current = set(&[(1, 3), (2, 2)]);
        let desired = set(&[(1, 1), (2, 5), (3, 2)]);
        assert_eq!(
            reconcile(&current, &desired),
            vec![
                delta(1, DeltaKind::Restock, 2),
                delta(2, DeltaKind::Consume, 3),
                delta(3, DeltaKind::Consume, 2),
            ]
        );
    }

    #[test]
    fn creating_from_empty_consumes_everything() {
        let desired = set(&[(4, 1), (9, 7)]);
        assert_eq!(
            reconcile(&LineSet::new(), &desired),
            vec![
                delta(4, DeltaKind::Consume, 1),
                delta(9, DeltaKind::Consume, 7),
            ]
        );
    }

    #[test]
    fn clearing_to_empty_restocks_everything() {
        let current = set(&[(4, 1), (9, 7)]);
        assert_eq!(
            reconcile(&current, &LineSet::new()),
            vec![
                delta(4, DeltaKind::Restock, 1),
                delta(9, DeltaKind::Restock, 7),
            ]
        );
    }

    #[test]
    fn deltas_are_ordered_by_product_id() {
        let current = set(&[(9, 1)]);
        let desired = set(&[(1, 1), (5, 1)]);
        let ids: Vec<i64> = reconcile(&current, &desired)
            .iter()
            .map(|d| d.product_id.get())
            .collect();
        assert_eq!(ids, vec![1, 5, 9]);
    }

    #[test]
    fn stock_adjustment_sign_matches_kind() {
        assert_eq!(delta(1, DeltaKind::Consume, 4).stock_adjustment(), -4);
        assert_eq!(delta(1, DeltaKind::Restock, 4).stock_adjustment(), 4);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn line_set() -> impl Strategy<Value = LineSet> {
            proptest::collection::btree_map(1i64..20, 1u32..100, 0..10).prop_map(|m| {
                m.into_iter()
                    .map(|(id, qty)| (ProductId::new(id), qty))
                    .collect()
            })
        }

        proptest! {
            /// Conservation: the signed sum of deltas equals the change in
            /// total reserved quantity between the two line sets.
            #[test]
            fn deltas_conserve_total_quantity(current in line_set(), desired in line_set()) {
                let deltas = reconcile(&current, &desired);
                let signed: i64 = deltas.iter().map(|d| -d.stock_adjustment()).sum();
                let total = |s: &LineSet| s.values().map(|&q| i64::from(q)).sum::<i64>();
                prop_assert_eq!(signed, total(&desired) - total(&current));
            }

            /// Applying each delta to the corresponding per-product reserved
            /// quantity transforms `current` exactly into `desired`.
            #[test]
            fn applying_deltas_reaches_desired(current in line_set(), desired in line_set()) {
                let mut reserved: std::collections::BTreeMap<ProductId, i64> = current
                    .iter()
                    .map(|(&id, &q)| (id, i64::from(q)))
                    .collect();
                for d in reconcile(&current, &desired) {
                    *reserved.entry(d.product_id).or_insert(0) -= d.stock_adjustment();
                }
                reserved.retain(|_, q| *q != 0);
                let expected: std::collections::BTreeMap<ProductId, i64> = desired
                    .iter()
                    .map(|(&id, &q)| (id, i64::from(q)))
                    .collect();
                prop_assert_eq!(reserved, expected);
            }

            /// Reconciling a set against itself is always a no-op.
            #[test]
            fn self_reconcile_is_empty(s in line_set()) {
                prop_assert!(reconcile(&s, &s).is_empty());
            }

            /// Each product id appears at most once, in ascending order.
            #[test]
            fn deltas_sorted_and_unique(current in line_set(), desired in line_set()) {
                let ids: Vec<ProductId> = reconcile(&current, &desired)
                    .iter()
                    .map(|d| d.product_id)
                    .collect();
                let mut sorted = ids.clone();
                sorted.sort();
                sorted.dedup();
                prop_assert_eq!(ids, sorted);
            }
        }
    }
}
