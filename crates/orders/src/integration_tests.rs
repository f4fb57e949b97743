//! Integration tests for the full mutation pipeline.
//!
//! Tests: draft → locks → ledger transaction → commit → projection.
//!
//! Runs against the in-memory ledger, lock store, and search index; the
//! workflows under test are exactly the production ones.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;

use reservoir_core::{DomainError, OrderDraft, OrderId, OrderLine, ProductId};
use reservoir_ledger::{InMemoryLedger, OutboxOp, StockLedger};
use reservoir_locks::{InMemoryLockStore, LockConfig, LockError, LockManager, LockStore};
use reservoir_search::{DateRange, InMemorySearchIndex};

use crate::error::ServiceError;
use crate::service::OrderService;

type TestService = OrderService<InMemoryLedger, InMemoryLockStore, InMemorySearchIndex>;

struct Harness {
    ledger: Arc<InMemoryLedger>,
    lock_store: Arc<InMemoryLockStore>,
    index: Arc<InMemorySearchIndex>,
    service: TestService,
}

fn harness() -> Harness {
    harness_with_attempts(10)
}

fn harness_with_attempts(max_attempts: u32) -> Harness {
    reservoir_observability::init();

    let ledger = Arc::new(InMemoryLedger::new());
    let lock_store = Arc::new(InMemoryLockStore::new());
    let index = Arc::new(InMemorySearchIndex::new());
    let locks = LockManager::new(
        Arc::clone(&lock_store),
        LockConfig {
            ttl: Duration::from_secs(5),
            backoff: Duration::from_millis(1),
            max_attempts,
        },
    );
    let service = OrderService::new(Arc::clone(&ledger), locks, Arc::clone(&index));

    Harness {
        ledger,
        lock_store,
        index,
        service,
    }
}

fn draft(name: &str, lines: &[(i64, u32)]) -> OrderDraft {
    OrderDraft {
        name: name.to_string(),
        description: None,
        lines: lines
            .iter()
            .map(|&(product_id, quantity)| OrderLine {
                product_id: ProductId::new(product_id),
                quantity,
            })
            .collect(),
    }
}

fn dec(n: i64) -> Decimal {
    Decimal::from(n)
}

#[tokio::test]
async fn create_reserves_stock_and_indexes_the_order() {
    let h = harness();
    let p1 = h.ledger.seed_product(1, "P1", Decimal::new(100, 1), 5); // 10.0

    let order = h
        .service
        .create_order(&draft("O1", &[(1, 2)]))
        .await
        .unwrap();

    assert_eq!(h.ledger.stock_of(p1), Some(3));
    assert_eq!(order.total_amount, dec(20));

    let document = h.service.get_order(order.id).await.unwrap();
    assert_eq!(document.id, order.id);
    assert_eq!(document.name, "O1");
    assert_eq!(document.total_amount, dec(20));
    assert_eq!(document.products.len(), 1);
    assert_eq!(document.products[0].quantity, 2);
    assert_eq!(document.products[0].price, dec(10));
    assert_eq!(document.created_at, order.created_at.timestamp());
}

#[tokio::test]
async fn create_with_insufficient_stock_names_the_product() {
    let h = harness();
    let p1 = h.ledger.seed_product(1, "P1", dec(10), 5);

    let err = h
        .service
        .create_order(&draft("O1", &[(1, 6)]))
        .await
        .unwrap_err();
    match err {
        ServiceError::Domain(DomainError::InsufficientStock {
            product_id,
            requested,
            available,
        }) => {
            assert_eq!(product_id, p1);
            assert_eq!(requested, 6);
            assert_eq!(available, 5);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    assert_eq!(h.ledger.stock_of(p1), Some(5));
    assert_eq!(h.ledger.order_count(), 0);
    assert!(h.index.is_empty());
}

#[tokio::test]
async fn create_is_all_or_nothing_across_products() {
    let h = harness();
    let p1 = h.ledger.seed_product(1, "P1", dec(10), 100);
    let p2 = h.ledger.seed_product(2, "P2", dec(5), 1);

    let err = h
        .service
        .create_order(&draft("O1", &[(1, 2), (2, 3)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::InsufficientStock { .. })
    ));

    // No partial reservation: neither product moved, nothing persisted.
    assert_eq!(h.ledger.stock_of(p1), Some(100));
    assert_eq!(h.ledger.stock_of(p2), Some(1));
    assert_eq!(h.ledger.order_count(), 0);
    assert!(h.index.is_empty());
}

#[tokio::test]
async fn create_with_unknown_product_is_not_found() {
    let h = harness();

    let err = h
        .service
        .create_order(&draft("O1", &[(42, 1)]))
        .await
        .unwrap_err();
    match err {
        ServiceError::Domain(DomainError::ProductNotFound(id)) => {
            assert_eq!(id, ProductId::new(42));
        }
        other => panic!("expected ProductNotFound, got {other:?}"),
    }
    assert_eq!(h.ledger.order_count(), 0);
}

#[tokio::test]
async fn invalid_draft_is_rejected_before_any_mutation() {
    let h = harness();
    let p1 = h.ledger.seed_product(1, "P1", dec(10), 5);

    let err = h
        .service
        .create_order(&draft("O1", &[(1, 0)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Validation(_))
    ));

    let err = h
        .service
        .create_order(&draft("O1", &[(1, 1), (1, 2)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Validation(_))
    ));

    assert_eq!(h.ledger.stock_of(p1), Some(5));
    assert_eq!(h.ledger.order_count(), 0);
}

#[tokio::test]
async fn update_applies_minimal_deltas_atomically() {
    let h = harness();
    let a = h.ledger.seed_product(1, "A", dec(1), 10);
    let b = h.ledger.seed_product(2, "B", dec(2), 10);
    let c = h.ledger.seed_product(3, "C", dec(3), 10);

    let order = h
        .service
        .create_order(&draft("O1", &[(1, 3), (2, 2)]))
        .await
        .unwrap();
    assert_eq!(h.ledger.stock_of(a), Some(7));
    assert_eq!(h.ledger.stock_of(b), Some(8));

    // {A:3, B:2} -> {A:1, B:5, C:2}
    let updated = h
        .service
        .update_order(order.id, &draft("O1", &[(1, 1), (2, 5), (3, 2)]))
        .await
        .unwrap();

    assert_eq!(h.ledger.stock_of(a), Some(9)); // restocked 2
    assert_eq!(h.ledger.stock_of(b), Some(5)); // consumed 3
    assert_eq!(h.ledger.stock_of(c), Some(8)); // consumed 2
    assert_eq!(updated.total_amount, dec(17)); // 1*1 + 2*5 + 3*2
    assert_eq!(updated.created_at, order.created_at);

    let document = h.service.get_order(order.id).await.unwrap();
    assert_eq!(document.total_amount, dec(17));
    assert_eq!(document.products.len(), 3);
}

#[tokio::test]
async fn update_short_on_one_product_changes_nothing() {
    let h = harness();
    let a = h.ledger.seed_product(1, "A", dec(1), 10);
    let b = h.ledger.seed_product(2, "B", dec(2), 10);
    let c = h.ledger.seed_product(3, "C", dec(3), 1); // short for the update

    let order = h
        .service
        .create_order(&draft("O1", &[(1, 3), (2, 2)]))
        .await
        .unwrap();
    let total_before = order.total_amount;

    let err = h
        .service
        .update_order(order.id, &draft("O1", &[(1, 1), (2, 5), (3, 2)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::InsufficientStock { .. })
    ));

    // None of A/B/C moved; lines and total are the create-time ones.
    assert_eq!(h.ledger.stock_of(a), Some(7));
    assert_eq!(h.ledger.stock_of(b), Some(8));
    assert_eq!(h.ledger.stock_of(c), Some(1));
    let lines = h.ledger.lines_for_order(order.id).await.unwrap();
    assert_eq!(lines.get(&a).copied(), Some(3));
    assert_eq!(lines.get(&b).copied(), Some(2));
    assert_eq!(lines.get(&c), None);
    let document = h.service.get_order(order.id).await.unwrap();
    assert_eq!(document.total_amount, total_before);
}

#[tokio::test]
async fn identical_update_is_a_no_op_on_stock_and_total() {
    let h = harness();
    let a = h.ledger.seed_product(1, "A", dec(4), 10);
    let b = h.ledger.seed_product(2, "B", dec(6), 10);

    let order = h
        .service
        .create_order(&draft("O1", &[(1, 2), (2, 1)]))
        .await
        .unwrap();

    let updated = h
        .service
        .update_order(order.id, &draft("O1", &[(1, 2), (2, 1)]))
        .await
        .unwrap();

    assert_eq!(h.ledger.stock_of(a), Some(8));
    assert_eq!(h.ledger.stock_of(b), Some(9));
    assert_eq!(updated.total_amount, order.total_amount);
}

#[tokio::test]
async fn update_of_missing_order_is_not_found() {
    let h = harness();
    h.ledger.seed_product(1, "A", dec(1), 10);

    let err = h
        .service
        .update_order(OrderId::new(99), &draft("O1", &[(1, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::OrderNotFound(_))
    ));
}

#[tokio::test]
async fn delete_reverses_create_exactly() {
    let h = harness();
    let a = h.ledger.seed_product(1, "A", dec(1), 9);
    let b = h.ledger.seed_product(2, "B", dec(2), 4);

    let order = h
        .service
        .create_order(&draft("O1", &[(1, 3), (2, 4)]))
        .await
        .unwrap();
    assert_eq!(h.ledger.stock_of(a), Some(6));
    assert_eq!(h.ledger.stock_of(b), Some(0));

    let deleted = h.service.delete_order(order.id).await.unwrap();
    assert_eq!(deleted.id, order.id);

    assert_eq!(h.ledger.stock_of(a), Some(9));
    assert_eq!(h.ledger.stock_of(b), Some(4));
    assert_eq!(h.ledger.order_count(), 0);

    let err = h.service.get_order(order.id).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::OrderNotFound(_))
    ));
}

#[tokio::test]
async fn delete_of_missing_order_is_not_found() {
    let h = harness();
    let err = h.service.delete_order(OrderId::new(5)).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::OrderNotFound(_))
    ));
}

#[tokio::test]
async fn list_orders_searches_and_filters_by_creation_date() {
    let h = harness();
    h.ledger.seed_product(1, "P1", dec(10), 100);

    let alpha = h
        .service
        .create_order(&draft("alpha order", &[(1, 1)]))
        .await
        .unwrap();
    h.service
        .create_order(&draft("beta order", &[(1, 1)]))
        .await
        .unwrap();

    let all = h
        .service
        .list_orders("", &DateRange::unbounded())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let hits = h
        .service
        .list_orders("alpha", &DateRange::unbounded())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, alpha.id);

    let now = Utc::now();
    let containing = DateRange::new(
        Some(now - chrono::Duration::minutes(1)),
        Some(now + chrono::Duration::minutes(1)),
    )
    .unwrap();
    assert_eq!(
        h.service.list_orders("", &containing).await.unwrap().len(),
        2
    );

    let future = DateRange::new(
        Some(now + chrono::Duration::hours(1)),
        Some(now + chrono::Duration::hours(2)),
    )
    .unwrap();
    assert!(h.service.list_orders("", &future).await.unwrap().is_empty());
}

#[tokio::test]
async fn lock_timeout_surfaces_without_touching_stock() {
    let h = harness();
    let p1 = h.ledger.seed_product(1, "P1", dec(10), 5);

    h.lock_store
        .set_if_absent("lock_product_1", "someone-else")
        .await
        .unwrap();

    let err = h
        .service
        .create_order(&draft("O1", &[(1, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Lock(LockError::Timeout { .. })));

    assert_eq!(h.ledger.stock_of(p1), Some(5));
    assert_eq!(h.ledger.order_count(), 0);
}

#[tokio::test]
async fn projection_failure_keeps_the_mutation_and_queues_replay() {
    let h = harness();
    let p1 = h.ledger.seed_product(1, "P1", dec(10), 5);

    h.index.set_fail_writes(true);
    let order = h
        .service
        .create_order(&draft("O1", &[(1, 2)]))
        .await
        .unwrap();

    // The ledger mutation is durable even though the index write failed.
    assert_eq!(h.ledger.stock_of(p1), Some(3));
    assert_eq!(h.ledger.order_count(), 1);
    assert!(h.index.is_empty());

    let entries = h.ledger.outbox_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].op, OutboxOp::Upsert);
    assert_eq!(entries[0].order_id, order.id);

    // Replay converges the projection once the index is reachable again.
    h.index.set_fail_writes(false);
    let report = h.service.projection().drain_outbox(10).await.unwrap();
    assert_eq!(report.replayed, 1);
    assert_eq!(report.failed, 0);
    assert!(h.ledger.outbox_entries().is_empty());

    let document = h.service.get_order(order.id).await.unwrap();
    assert_eq!(document.total_amount, dec(20));
}

#[tokio::test]
async fn failed_delete_sync_is_replayed_from_the_outbox() {
    let h = harness();
    h.ledger.seed_product(1, "P1", dec(10), 5);

    let order = h
        .service
        .create_order(&draft("O1", &[(1, 2)]))
        .await
        .unwrap();

    h.index.set_fail_writes(true);
    h.service.delete_order(order.id).await.unwrap();

    // Ledger row is gone, the stale document lingers until replay.
    assert_eq!(h.ledger.order_count(), 0);
    assert_eq!(h.index.len(), 1);
    let entries = h.ledger.outbox_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].op, OutboxOp::Delete);

    h.index.set_fail_writes(false);
    let report = h.service.projection().drain_outbox(10).await.unwrap();
    assert_eq!(report.replayed, 1);
    assert!(h.index.is_empty());
}

#[tokio::test]
async fn replay_attempts_are_bounded() {
    let h = harness();
    h.ledger.seed_product(1, "P1", dec(10), 5);

    h.index.set_fail_writes(true);
    h.service
        .create_order(&draft("O1", &[(1, 1)]))
        .await
        .unwrap();

    // Keep failing: each drain bumps the attempt count once.
    for _ in 0..crate::projection::MAX_SYNC_ATTEMPTS {
        let report = h.service.projection().drain_outbox(10).await.unwrap();
        assert_eq!(report.failed, 1);
    }

    // The entry is dead now: still in the table, no longer selected.
    let report = h.service.projection().drain_outbox(10).await.unwrap();
    assert_eq!(report, crate::projection::DrainReport::default());
    assert_eq!(h.ledger.outbox_entries().len(), 1);
}

#[tokio::test]
async fn concurrent_creates_conserve_stock() {
    let h = harness_with_attempts(1000);
    let p1 = h.ledger.seed_product(1, "P1", dec(1), 10);

    let mut handles = Vec::new();
    for i in 0..10 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service.create_order(&draft(&format!("O{i}"), &[(1, 2)])).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(ServiceError::Domain(DomainError::InsufficientStock { .. })) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    // Exactly five two-unit orders fit into ten units of stock.
    assert_eq!(succeeded, 5);
    assert_eq!(h.ledger.stock_of(p1), Some(0));
    assert_eq!(h.ledger.order_count(), 5);
}

#[tokio::test]
async fn opposite_line_orders_cannot_deadlock() {
    let h = harness_with_attempts(1000);
    h.ledger.seed_product(1, "P1", dec(1), 100);
    h.ledger.seed_product(2, "P2", dec(1), 100);

    // Locks are acquired in ascending product-id order regardless of the
    // draft's line order, so these two cannot wait on each other cyclically.
    let first = h.service.clone();
    let second = h.service.clone();
    let (a, b) = tokio::join!(
        async move { first.create_order(&draft("O1", &[(1, 1), (2, 1)])).await },
        async move { second.create_order(&draft("O2", &[(2, 1), (1, 1)])).await },
    );

    a.unwrap();
    b.unwrap();
    assert_eq!(h.ledger.stock_of(ProductId::new(1)), Some(98));
    assert_eq!(h.ledger.stock_of(ProductId::new(2)), Some(98));
}

#[tokio::test]
async fn update_to_empty_line_set_releases_everything() {
    let h = harness();
    let p1 = h.ledger.seed_product(1, "P1", dec(10), 5);

    let order = h
        .service
        .create_order(&draft("O1", &[(1, 4)]))
        .await
        .unwrap();
    assert_eq!(h.ledger.stock_of(p1), Some(1));

    let updated = h
        .service
        .update_order(order.id, &draft("O1", &[]))
        .await
        .unwrap();

    assert_eq!(h.ledger.stock_of(p1), Some(5));
    assert_eq!(updated.total_amount, Decimal::ZERO);
    let document = h.service.get_order(order.id).await.unwrap();
    assert!(document.products.is_empty());
}
