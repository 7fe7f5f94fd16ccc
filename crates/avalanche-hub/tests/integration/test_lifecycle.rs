//! Start-up, enable/disable cascade, logging and delivery through the facade

use std::sync::Arc;

use avalanche_core::config::ConfigBuilder;
use avalanche_core::domain::{ChannelState, Priority};
use avalanche_core::logging::LogLevel;
use avalanche_core::ports::{IEventStorage, IFeature};
use avalanche_hub::HubError;
use avalanche_storage::DatabasePool;

use crate::common::{as_features, hub, hub_on, RecordingFeature, SECRET};

// ============================================================================
// start()
// ============================================================================

#[tokio::test]
async fn test_start_rejects_empty_secret() {
    let (t, _db) = hub().await;
    let crashes = RecordingFeature::new("crashes", "crashes");

    for secret in ["", "   "] {
        let result = t.hub.start(secret, as_features(&[&crashes])).await;
        assert!(matches!(result, Err(HubError::InvalidConfiguration(_))));
    }
    assert!(!t.hub.is_started());
    assert_eq!(crashes.started.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_start_rejects_duplicate_feature_in_one_call() {
    let (t, _db) = hub().await;
    let first = RecordingFeature::new("analytics", "analytics");
    let second = RecordingFeature::new("analytics", "analytics-2");

    let result = t.hub.start(SECRET, as_features(&[&first, &second])).await;
    assert!(matches!(result, Err(HubError::InvalidConfiguration(_))));
    assert!(t.hub.feature_names().is_empty());
}

#[tokio::test]
async fn test_start_is_idempotent_per_feature() {
    let (t, _db) = hub().await;
    let analytics = RecordingFeature::new("analytics", "analytics");
    let crashes = RecordingFeature::new("crashes", "crashes");

    t.hub.start(SECRET, as_features(&[&analytics])).await.unwrap();
    t.hub
        .start(SECRET, as_features(&[&analytics, &crashes]))
        .await
        .unwrap();

    assert_eq!(t.hub.feature_names(), vec!["analytics", "crashes"]);
    assert_eq!(analytics.started.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(crashes.started.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(analytics.is_enabled());
}

#[tokio::test]
async fn test_start_rejects_invalid_configuration() {
    let db = DatabasePool::in_memory().await.unwrap();
    let config = ConfigBuilder::new().batch_size(0).build();
    let t = hub_on(&db, config).await;

    let result = t.hub.start(SECRET, Vec::new()).await;
    assert!(matches!(result, Err(HubError::InvalidConfiguration(msg)) if msg.contains("batch_size")));
}

#[tokio::test]
async fn test_operations_before_start() {
    let (t, _db) = hub().await;
    assert!(matches!(t.hub.flush("analytics").await, Err(HubError::NotStarted)));
    assert!(matches!(
        t.hub.emit("analytics", serde_json::json!({}), Priority::Normal),
        Err(HubError::NotStarted)
    ));
    assert!(matches!(
        t.hub.set_feature_enabled("analytics", false),
        Err(HubError::UnknownFeature(_))
    ));
}

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn test_feature_events_are_delivered_in_order() {
    let (t, _db) = hub().await;
    let analytics = RecordingFeature::new("analytics", "analytics");
    t.hub.start(SECRET, as_features(&[&analytics])).await.unwrap();

    for n in 0..7 {
        analytics.track(n);
    }
    t.hub.flush("analytics").await.unwrap();

    let numbers: Vec<i64> = t
        .ingestion
        .batches
        .lock()
        .unwrap()
        .iter()
        .flat_map(|b| b.events().to_vec())
        .map(|s| s.event.payload()["n"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, (0..7).collect::<Vec<_>>());

    let status = t.hub.channel_status("analytics").await.unwrap();
    assert_eq!(status.pending, 0);
    assert_eq!(status.state, ChannelState::Idle);
}

#[tokio::test]
async fn test_flush_all_and_statuses() {
    let (t, _db) = hub().await;
    let analytics = RecordingFeature::new("analytics", "analytics");
    let crashes = RecordingFeature::new("crashes", "crashes");
    t.hub
        .start(SECRET, as_features(&[&analytics, &crashes]))
        .await
        .unwrap();

    analytics.track(1);
    crashes.track(2);
    t.hub
        .emit("crashes", serde_json::json!({ "n": 3 }), Priority::Critical)
        .unwrap();
    t.hub.flush_all().await.unwrap();

    assert_eq!(t.ingestion.event_count(), 3);
    let statuses = t.hub.channel_statuses().await.unwrap();
    let names: Vec<&str> = statuses.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["analytics", "crashes"]);
    assert!(statuses.iter().all(|s| s.pending == 0));
}

// ============================================================================
// Enable / disable
// ============================================================================

#[tokio::test]
async fn test_disable_cascades_and_drops_new_events() {
    let (t, _db) = hub().await;
    let analytics = RecordingFeature::new("analytics", "analytics");
    t.hub.start(SECRET, as_features(&[&analytics])).await.unwrap();

    t.hub.set_enabled(false).await;
    assert!(!t.hub.is_enabled());
    assert!(!analytics.is_enabled());

    for n in 0..5 {
        analytics.track(n);
    }
    assert!(matches!(
        t.hub.emit("analytics", serde_json::json!({}), Priority::High),
        Err(HubError::ChannelDisabled(_))
    ));
    assert_eq!(t.storage.append_count(), 0);

    t.hub.set_enabled(true).await;
    assert!(analytics.is_enabled());
    t.hub.flush_all().await.unwrap();
    assert_eq!(t.ingestion.event_count(), 0);
}

#[tokio::test]
async fn test_disable_during_start_reaches_channels() {
    let (t, _db) = hub().await;
    let analytics = RecordingFeature::new("analytics", "analytics");

    let (started, ()) = tokio::join!(
        t.hub.start(SECRET, as_features(&[&analytics])),
        t.hub.set_enabled(false),
    );
    started.unwrap();

    assert!(!t.hub.is_enabled());
    let status = t.hub.channel_status("analytics").await.unwrap();
    assert!(!status.enabled);
    assert!(matches!(
        t.hub.emit("analytics", serde_json::json!({}), Priority::Normal),
        Err(HubError::ChannelDisabled(_))
    ));
    assert_eq!(t.storage.append_count(), 0);

    t.hub.set_enabled(true).await;
    assert!(t.hub.channel_status("analytics").await.unwrap().enabled);
    t.hub
        .emit("analytics", serde_json::json!({}), Priority::Normal)
        .unwrap();
}

#[tokio::test]
async fn test_enabled_flag_is_persisted() {
    let db = DatabasePool::in_memory().await.unwrap();
    {
        let t = hub_on(&db, Default::default()).await;
        t.hub.set_enabled(false).await;
    }

    let t = hub_on(&db, Default::default()).await;
    assert!(!t.hub.is_enabled());

    let crashes = RecordingFeature::new("crashes", "crashes");
    t.hub.start(SECRET, as_features(&[&crashes])).await.unwrap();
    assert!(!crashes.is_enabled());
}

#[tokio::test]
async fn test_feature_toggle_only_affects_its_channel() {
    let (t, _db) = hub().await;
    let analytics = RecordingFeature::new("analytics", "analytics");
    let crashes = RecordingFeature::new("crashes", "crashes");
    t.hub
        .start(SECRET, as_features(&[&analytics, &crashes]))
        .await
        .unwrap();

    t.hub.set_feature_enabled("analytics", false).unwrap();
    assert!(!analytics.is_enabled());
    assert!(crashes.is_enabled());
    assert_eq!(t.hub.is_feature_enabled("analytics"), Some(false));

    analytics.track(1);
    crashes.track(2);
    t.hub.flush_all().await.unwrap();
    assert_eq!(t.ingestion.event_count(), 1);

    // Global re-enable leaves the feature off
    t.hub.set_enabled(false).await;
    t.hub.set_enabled(true).await;
    assert!(!analytics.is_enabled());
    assert!(crashes.is_enabled());
}

#[tokio::test]
async fn test_default_disabled_feature_starts_off() {
    let (t, _db) = hub().await;
    let push = RecordingFeature::with_default("push", "push", false);
    t.hub
        .start(SECRET, vec![push.clone() as Arc<dyn IFeature>])
        .await
        .unwrap();

    assert!(!push.is_enabled());
    push.track(1);
    assert_eq!(t.storage.append_count(), 0);
    assert_eq!(t.storage.total_count().await.unwrap(), 0);
}

// ============================================================================
// Logging
// ============================================================================

#[tokio::test]
async fn test_log_level_gates_handler() {
    let (t, _db) = hub().await;
    t.hub.set_log_level(LogLevel::Info);
    assert_eq!(t.hub.log_level(), LogLevel::Info);

    t.hub.start(SECRET, Vec::new()).await.unwrap();
    {
        let logs = t.logs.lock().unwrap();
        assert!(logs
            .iter()
            .any(|(level, msg)| *level == LogLevel::Info && msg.contains("Avalanche started")));
        assert!(logs.iter().all(|(level, _)| *level >= LogLevel::Info));
    }

    t.hub.set_log_level(LogLevel::None);
    let before = t.logs.lock().unwrap().len();
    t.hub.set_enabled(false).await;
    assert_eq!(t.logs.lock().unwrap().len(), before);
}

#[tokio::test]
async fn test_second_secret_is_ignored_with_warning() {
    let (t, _db) = hub().await;
    t.hub.start(SECRET, Vec::new()).await.unwrap();
    t.hub.start("another-secret", Vec::new()).await.unwrap();

    let logs = t.logs.lock().unwrap();
    assert!(logs
        .iter()
        .any(|(level, msg)| *level == LogLevel::Warning && msg.contains("secret")));
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_keeps_events_and_blocks_restart() {
    let (t, _db) = hub().await;
    let analytics = RecordingFeature::new("analytics", "analytics");
    t.hub.start(SECRET, as_features(&[&analytics])).await.unwrap();

    analytics.track(1);
    // Snapshot round-trips through the worker, so the append has happened
    let status = t.hub.channel_status("analytics").await.unwrap();
    assert_eq!(status.pending, 1);

    t.hub.shutdown().await;
    assert_eq!(t.storage.total_count().await.unwrap(), 1);
    assert!(matches!(
        t.hub.start(SECRET, Vec::new()).await,
        Err(HubError::ShutDown)
    ));
    assert!(matches!(
        t.hub.emit("analytics", serde_json::json!({}), Priority::Normal),
        Err(HubError::ShutDown)
    ));
}
