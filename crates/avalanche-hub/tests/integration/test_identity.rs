//! Install identity lifetime

use avalanche_core::config::{ConfigBuilder, IdentityBackend};
use avalanche_core::domain::{ChannelName, Priority};
use avalanche_hub::Avalanche;

use crate::common::{as_features, hub, RecordingFeature, SECRET};

#[tokio::test]
async fn test_install_id_is_stable_in_process() {
    let (t, _db) = hub().await;
    let first = t.hub.install_id().await.unwrap();
    let second = t.hub.install_id().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_install_id_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new()
        .storage_path(dir.path().join("nested").join("events.db"))
        .build();

    let first = {
        let hub = Avalanche::open(config.clone()).await.unwrap();
        let id = hub.install_id().await.unwrap();
        assert_eq!(hub.install_id().await.unwrap(), id);
        hub.shutdown().await;
        id
    };

    let hub = Avalanche::open(config).await.unwrap();
    assert_eq!(hub.install_id().await.unwrap(), first);
    hub.shutdown().await;
}

#[tokio::test]
async fn test_pending_events_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new()
        .storage_path(dir.path().join("events.db"))
        .ingestion_url("http://127.0.0.1:9")
        .batch_size(100)
        .max_batch_age_ms(0)
        .build();
    let analytics = RecordingFeature::new("analytics", "analytics");

    {
        let hub = Avalanche::open(config.clone()).await.unwrap();
        hub.start(SECRET, as_features(&[&analytics])).await.unwrap();
        for n in 0..3 {
            hub.emit("analytics", serde_json::json!({ "n": n }), Priority::Normal)
                .unwrap();
        }
        let status = hub.channel_status("analytics").await.unwrap();
        assert_eq!(status.pending, 3);
        hub.shutdown().await;
    }

    let hub = Avalanche::open(config).await.unwrap();
    let counts = hub.stored_counts().await.unwrap();
    assert_eq!(counts, vec![(ChannelName::new("analytics").unwrap(), 3)]);
    assert_eq!(hub.evicted_total(), 0);
    hub.shutdown().await;
}

#[tokio::test]
async fn test_keyring_backend_keeps_install_id_out_of_database() {
    keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.db");
    let keyring_config = ConfigBuilder::new()
        .storage_path(path.clone())
        .identity_backend(IdentityBackend::Keyring)
        .build();

    let from_keyring = {
        let hub = Avalanche::open(keyring_config).await.unwrap();
        let id = hub.install_id().await.unwrap();
        assert_eq!(hub.install_id().await.unwrap(), id);
        hub.shutdown().await;
        id
    };

    // The same database opened with the default backend never saw that id
    let hub = Avalanche::open(ConfigBuilder::new().storage_path(path).build())
        .await
        .unwrap();
    assert_ne!(hub.install_id().await.unwrap(), from_keyring);
    hub.shutdown().await;
}
