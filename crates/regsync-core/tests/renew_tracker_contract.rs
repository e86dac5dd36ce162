//! Architectural Contract Test: Backend Renewal Tracking
//!
//! This test verifies the renewal lifecycle invariants: one started row
//! per domain, registry-confirmed expiry only, and idempotent
//! completion.
//!
//! Constraints verified:
//! - Starting a second renewal returns the existing started row
//! - submit_renew never sends a second command while one is in flight
//! - Completion records the receipt but re-reads the registry for the
//!   domain's expiry
//! - Completing a processed row again is a no-op
//!
//! If this test fails, customers can be double-charged or shown expiry
//! dates the registry never confirmed.

mod common;

use std::sync::Arc;

use common::*;
use regsync_core::RenewTracker;
use tokio_test::assert_ok;
use regsync_core::model::{DomainStatus, RenewStatus};
use regsync_core::store::MemoryStore;
use regsync_core::traits::{RegistryStore, RenewReceipt};

#[tokio::test]
async fn a_second_start_returns_the_existing_row() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let (engine, _event_rx) = engine_with(gateway.clone(), store.clone(), &minimal_config());
    let tracker = RenewTracker::new(engine);

    let first = tokio_test::assert_ok!(
        tracker
            .start_renew("renewal.example.com", "owner@example.com", 100, None)
            .await
    );
    let second = tokio_test::assert_ok!(
        tracker
            .start_renew("renewal.example.com", "owner@example.com", 200, None)
            .await
    );

    assert_eq!(second.id, first.id, "no second started row");
    assert_eq!(second.order_id, 100, "the original order stays on the row");
    assert_eq!(
        store.list_renews("renewal.example.com").await.unwrap().len(),
        1
    );
    assert!(first.is_started());
}

#[tokio::test]
async fn submit_does_not_resend_while_one_is_in_flight() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let (engine, _event_rx) = engine_with(gateway.clone(), store.clone(), &minimal_config());
    let tracker = RenewTracker::new(engine);

    let started = tokio_test::assert_ok!(
        tracker
            .start_renew("renewal.example.com", "owner@example.com", 100, None)
            .await
    );

    let resubmitted = tokio_test::assert_ok!(
        tracker
            .submit_renew("renewal.example.com", "owner@example.com", 200, None, 1)
            .await
    );

    assert_eq!(resubmitted.id, started.id);
    assert!(resubmitted.is_started(), "still waiting for the confirmation");
    assert_eq!(gateway.renew_call_count(), 0, "no second renew command");
}

#[tokio::test]
async fn completion_confirms_expiry_from_the_registry() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let (engine, _event_rx) = engine_with(gateway.clone(), store.clone(), &minimal_config());
    let tracker = RenewTracker::new(engine);

    seed_domain(&store, "renewal.example.com", "owner@example.com", DomainStatus::Active).await;
    // The registry's own answer after the renewal
    gateway.script_info(
        "renewal.example.com",
        Ok(domain_info(
            "D-8001",
            DomainStatus::Active,
            registrant("C-8001", "owner@example.com"),
        )),
    );

    let started = tracker
        .start_renew("renewal.example.com", "owner@example.com", 300, None)
        .await
        .unwrap();

    let completed = tracker
        .complete_renew(started.id, date(2028, 1, 1))
        .await
        .expect("completion succeeds");
    assert_eq!(completed.status, RenewStatus::Processed);
    assert_eq!(completed.next_expiry, Some(date(2028, 1, 1)));
    assert!(completed.processed_at.is_some());

    // The domain row shows what the registry reported, not the receipt
    let domain = store.find_domain("renewal.example.com").await.unwrap().unwrap();
    assert_eq!(domain.expiry_date, Some(date(2027, 6, 1)));

    // Completing again is a no-op
    let again = tracker
        .complete_renew(started.id, date(2031, 12, 31))
        .await
        .expect("recompletion is idempotent");
    assert_eq!(again.next_expiry, Some(date(2028, 1, 1)));
    assert_eq!(again.processed_at, completed.processed_at);
}

#[tokio::test]
async fn submit_round_trip_completes_the_row() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let (engine, _event_rx) = engine_with(gateway.clone(), store.clone(), &minimal_config());
    let tracker = RenewTracker::new(engine);

    seed_domain(&store, "renewal.example.com", "owner@example.com", DomainStatus::Active).await;
    gateway.script_info(
        "renewal.example.com",
        Ok(domain_info(
            "D-8002",
            DomainStatus::Active,
            registrant("C-8002", "owner@example.com"),
        )),
    );
    gateway.script_renew(Ok(RenewReceipt {
        next_expiry: date(2029, 1, 1),
    }));

    let renew = tracker
        .submit_renew("renewal.example.com", "owner@example.com", 400, None, 1)
        .await
        .expect("submission completes");

    assert_eq!(gateway.renew_call_count(), 1);
    assert_eq!(renew.status, RenewStatus::Processed);
    assert_eq!(renew.next_expiry, Some(date(2029, 1, 1)));
    assert_eq!(renew.previous_expiry, None, "no expiry was known before");

    let domain = store.find_domain("renewal.example.com").await.unwrap().unwrap();
    assert_eq!(
        domain.expiry_date,
        Some(date(2027, 6, 1)),
        "expiry follows the registry read"
    );
}
