//! Architectural Contract Test: Poll Queue Safety
//!
//! This test verifies the listener's at-least-once discipline over the
//! registry's poll queue.
//!
//! Constraints verified:
//! - A message is acked only after it was processed successfully
//! - A failing message is redelivered, never acked
//! - Redelivering a processed message reaches the same end state
//! - Renewal confirmations close the matching renew row, with the
//!   expiry taken from the payload or from a fresh registry read
//!
//! If this test fails, registry announcements can be lost or applied
//! twice with different outcomes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use regsync_core::model::{DomainStatus, RenewStatus};
use regsync_core::store::MemoryStore;
use regsync_core::traits::{PollMessageKind, RegistryStore};
use regsync_core::{PollListener, RenewTracker};

/// Run a listener over the doubles for roughly `run_for`, then stop it
async fn run_listener(
    gateway: Arc<MockGateway>,
    engine: Arc<regsync_core::SyncEngine>,
    run_for: Duration,
) {
    let listener = PollListener::new(gateway, engine, Duration::from_millis(20));
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { listener.run_with_shutdown(shutdown_rx).await });

    tokio::time::sleep(run_for).await;
    shutdown_tx.send(()).expect("listener is still running");
    handle.await.expect("listener task joins");
}

#[tokio::test]
async fn message_is_acked_only_after_successful_processing() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let (engine, _event_rx) = engine_with(gateway.clone(), store.clone(), &minimal_config());

    seed_domain(&store, "news.example.com", "owner@example.com", DomainStatus::Active).await;
    gateway.script_info(
        "news.example.com",
        Ok(domain_info(
            "D-7001",
            DomainStatus::ServerHold,
            registrant("C-7001", "owner@example.com"),
        )),
    );
    gateway.queue_poll_message(poll_message(
        "m-1",
        PollMessageKind::StatusChanged,
        "news.example.com",
        serde_json::json!({}),
    ));

    run_listener(gateway.clone(), engine, Duration::from_millis(200)).await;

    assert_eq!(gateway.acked(), vec!["m-1".to_string()]);
    let stored = store.find_domain("news.example.com").await.unwrap().unwrap();
    assert_eq!(stored.status, DomainStatus::ServerHold);
    assert!(stored.last_synced_at.is_some());
}

#[tokio::test]
async fn failing_message_is_redelivered_and_never_acked() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let (engine, _event_rx) = engine_with(gateway.clone(), store.clone(), &minimal_config());

    // No local row and the registry answers 2303: processing fails
    gateway.queue_poll_message(poll_message(
        "m-2",
        PollMessageKind::StatusChanged,
        "missing.example.com",
        serde_json::json!({}),
    ));

    run_listener(gateway.clone(), engine, Duration::from_millis(300)).await;

    assert!(gateway.acked().is_empty(), "a failed message must stay queued");
    assert!(
        gateway.info_call_count() >= 2,
        "the queue redelivers an unacked message"
    );
}

#[tokio::test]
async fn redelivered_deletion_reaches_the_same_end_state() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let (engine, _event_rx) = engine_with(gateway.clone(), store.clone(), &minimal_config());

    // Queued for deletion and already absent at the registry (no script)
    seed_domain(&store, "done.example.com", "owner@example.com", DomainStatus::ToBeDeleted).await;

    let message = poll_message(
        "m-3",
        PollMessageKind::StatusChanged,
        "done.example.com",
        serde_json::json!({}),
    );
    gateway.queue_poll_message(message.clone());
    run_listener(gateway.clone(), engine.clone(), Duration::from_millis(200)).await;

    // Redelivery after a crash between processing and persistence
    gateway.queue_poll_message(message);
    run_listener(gateway.clone(), engine, Duration::from_millis(200)).await;

    assert_eq!(gateway.acked().len(), 2, "both deliveries were processed");
    let domains = store.list_domains().await.unwrap();
    assert_eq!(domains.len(), 1);
    assert!(domains[0].deleted_at.is_some(), "still one tombstoned row");
    assert_eq!(domains[0].status, DomainStatus::ToBeDeleted);
}

#[tokio::test]
async fn renew_confirmation_completes_the_started_row() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let (engine, _event_rx) = engine_with(gateway.clone(), store.clone(), &minimal_config());

    seed_domain(&store, "renewal.example.com", "owner@example.com", DomainStatus::Active).await;
    gateway.script_info(
        "renewal.example.com",
        Ok(domain_info(
            "D-7002",
            DomainStatus::Active,
            registrant("C-7002", "owner@example.com"),
        )),
    );

    let tracker = RenewTracker::new(engine.clone());
    let renew = tracker
        .start_renew("renewal.example.com", "owner@example.com", 4711, None)
        .await
        .expect("renewal opens");

    gateway.queue_poll_message(poll_message(
        "m-4",
        PollMessageKind::RenewProcessed,
        "renewal.example.com",
        serde_json::json!({ "next_expiry": "2028-01-01" }),
    ));
    run_listener(gateway.clone(), engine, Duration::from_millis(300)).await;

    let stored = store.find_renew(renew.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RenewStatus::Processed);
    assert_eq!(stored.next_expiry, Some(date(2028, 1, 1)));
    assert!(gateway.acked().contains(&"m-4".to_string()));

    // The domain's expiry comes from the registry read, not the payload
    let domain = store.find_domain("renewal.example.com").await.unwrap().unwrap();
    assert_eq!(domain.expiry_date, Some(date(2027, 6, 1)));
}

#[tokio::test]
async fn dateless_renew_confirmation_takes_the_registry_answer() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let (engine, _event_rx) = engine_with(gateway.clone(), store.clone(), &minimal_config());

    seed_domain(&store, "renewal.example.com", "owner@example.com", DomainStatus::Active).await;
    gateway.script_info(
        "renewal.example.com",
        Ok(domain_info(
            "D-7002",
            DomainStatus::Active,
            registrant("C-7002", "owner@example.com"),
        )),
    );

    let tracker = RenewTracker::new(engine.clone());
    let renew = tracker
        .start_renew("renewal.example.com", "owner@example.com", 4712, None)
        .await
        .expect("renewal opens");

    gateway.queue_poll_message(poll_message(
        "m-5",
        PollMessageKind::RenewProcessed,
        "renewal.example.com",
        serde_json::json!({}),
    ));
    run_listener(gateway.clone(), engine, Duration::from_millis(300)).await;

    let stored = store.find_renew(renew.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RenewStatus::Processed);
    assert_eq!(
        stored.next_expiry,
        Some(date(2027, 6, 1)),
        "expiry read back from the registry"
    );
}

#[tokio::test]
async fn unmatched_renew_confirmation_degrades_to_a_sync() {
    let gateway = Arc::new(MockGateway::new());
    let store = Arc::new(MemoryStore::new());
    let (engine, _event_rx) = engine_with(gateway.clone(), store.clone(), &minimal_config());

    seed_domain(&store, "quiet.example.com", "owner@example.com", DomainStatus::Active).await;
    gateway.script_info(
        "quiet.example.com",
        Ok(domain_info(
            "D-7003",
            DomainStatus::Active,
            registrant("C-7003", "owner@example.com"),
        )),
    );

    // Nothing was started here; perhaps another registrar tool renewed
    gateway.queue_poll_message(poll_message(
        "m-6",
        PollMessageKind::RenewProcessed,
        "quiet.example.com",
        serde_json::json!({ "next_expiry": "2030-01-01" }),
    ));
    run_listener(gateway.clone(), engine, Duration::from_millis(200)).await;

    assert_eq!(gateway.acked(), vec!["m-6".to_string()]);
    assert!(store.list_renews("quiet.example.com").await.unwrap().is_empty());
    let domain = store.find_domain("quiet.example.com").await.unwrap().unwrap();
    assert!(domain.last_synced_at.is_some());
}
