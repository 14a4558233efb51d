//! Scheduled firing, re-entrancy and retention through the public API

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use deposit_watch::engine::{spawn_schedule, Cadence, PassOutcome, Reconciler};
use deposit_watch::gateway::InMemoryGateway;
use deposit_watch::retention::RetentionSweeper;
use deposit_watch::types::{Alert, AlertPriority, AlertType, Deposit};

fn expired_deposit(id: &str) -> Deposit {
    Deposit::new(id, format!("DEP-{id}"), 1.0, 1.0).with_expiration(Utc::now() - ChronoDuration::days(3))
}

#[tokio::test]
async fn scheduled_passes_run_and_stay_idempotent() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.insert_deposit(expired_deposit("d1")).await;
    let reconciler = Arc::new(Reconciler::with_defaults(gateway.clone()));

    let handle = spawn_schedule(reconciler.clone(), Cadence::every(Duration::from_millis(25)));
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.stopped().await;
    tokio::time::sleep(Duration::from_millis(25)).await;

    assert!(reconciler.stats().completed >= 2);
    assert_eq!(gateway.alerts().await.len(), 1);
}

#[tokio::test]
async fn manual_run_during_a_pass_is_skipped_without_writes() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.insert_deposit(expired_deposit("d1")).await;
    let reconciler = Arc::new(Reconciler::with_defaults(gateway.clone()));
    gateway.stall_listing();

    let running = tokio::spawn({
        let reconciler = reconciler.clone();
        async move { reconciler.run_once().await }
    });
    gateway.listing_entered().await;

    for _ in 0..3 {
        assert!(matches!(reconciler.run_once().await, PassOutcome::Skipped));
    }
    assert_eq!(gateway.write_calls(), 0);

    gateway.release_listing();
    assert!(running.await.unwrap().summary().is_some());
    assert_eq!(reconciler.stats().skipped, 3);
    assert!(!reconciler.is_running());
}

#[tokio::test]
async fn hung_pass_blocks_every_later_tick() {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.insert_deposit(expired_deposit("d1")).await;
    let reconciler = Arc::new(Reconciler::with_defaults(gateway.clone()));
    gateway.stall_listing();

    let handle = spawn_schedule(reconciler.clone(), Cadence::every(Duration::from_millis(20)));
    gateway.listing_entered().await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    // The first pass never returns, so the guard is never released
    let stats = reconciler.stats();
    assert!(reconciler.is_running());
    assert_eq!(stats.completed, 0);
    assert!(stats.skipped >= 2);
    assert_eq!(gateway.write_calls(), 0);

    // Once the store answers again the stalled pass finishes and ticks resume
    gateway.release_listing();
    tokio::time::sleep(Duration::from_millis(150)).await;
    handle.stopped().await;

    assert!(reconciler.stats().completed >= 2);
    assert_eq!(gateway.alerts().await.len(), 1);
}

#[tokio::test]
async fn register_schedule_rejects_bad_cron() {
    let gateway = Arc::new(InMemoryGateway::new());
    let reconciler = Arc::new(Reconciler::with_defaults(gateway));

    assert!(reconciler.register_schedule("not a cron", "UTC").is_err());
    assert!(reconciler.register_schedule("0 * * * *", "Atlantis/Lost").is_err());

    let handle = reconciler
        .register_schedule("0 * * * *", "Europe/Madrid")
        .unwrap();
    assert_eq!(handle.job(), "alert_reconciliation");
    handle.stop();
    handle.stopped().await;
}

#[tokio::test]
async fn retention_sweep_keeps_open_and_recent_alerts() {
    let gateway = Arc::new(InMemoryGateway::new());
    let now = Utc::now();
    for (id, resolved_days_ago) in [("old", Some(91)), ("recent", Some(89)), ("open", None)] {
        let resolved_at = resolved_days_ago.map(|d| now - ChronoDuration::days(d));
        gateway
            .insert_alert(Alert {
                id: id.to_string(),
                alert_type: AlertType::Expired,
                priority: AlertPriority::High,
                message: "seeded".to_string(),
                deposit_id: "d1".to_string(),
                resolved: resolved_at.is_some(),
                resolved_at,
                observations: None,
                created_at: now - ChronoDuration::days(365),
            })
            .await;
    }

    let sweeper = RetentionSweeper::new(gateway.clone(), 90);
    let purged = tokio_test::assert_ok!(sweeper.sweep_at(now).await);
    assert_eq!(purged, Some(1));

    let remaining: Vec<String> = gateway.alerts().await.into_iter().map(|a| a.id).collect();
    assert_eq!(remaining, vec!["recent".to_string(), "open".to_string()]);
}
