// Integration tests for page signals and the teardown flush

mod common;

use anyhow::Result;
use bytes::Bytes;
use capture_relay::{
    LifecycleCoordinator, LifecycleListener, PageSignal, PendingStore, RecorderState,
    SqlitePendingStore, TrialContext, VisibilityPolicy,
};
use common::{FakeCapture, FakeTransport};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct Harness {
    _temp_dir: TempDir,
    store: Arc<SqlitePendingStore>,
    transport: Arc<FakeTransport>,
    capture: FakeCapture,
    coordinator: LifecycleCoordinator,
}

fn harness(transport: FakeTransport, policy: VisibilityPolicy) -> Result<Harness> {
    let temp_dir = TempDir::new()?;
    let store = Arc::new(SqlitePendingStore::open_in_memory()?);
    let transport = Arc::new(transport);
    let config = common::delivery_config(temp_dir.path());
    let uploader = common::uploader(store.clone(), transport.clone(), config.clone());
    let capture = FakeCapture::new();
    let recorder = common::recorder(&capture, uploader, &config);

    Ok(Harness {
        _temp_dir: temp_dir,
        store,
        transport,
        capture,
        coordinator: LifecycleCoordinator::new(recorder, policy),
    })
}

fn context() -> TrialContext {
    TrialContext::new("P-007", "Trial_2")
}

/// Records the recorder state it observes when a signal arrives
struct ObservingListener {
    name: &'static str,
    log: Arc<Mutex<Vec<(String, PageSignal)>>>,
}

#[async_trait::async_trait]
impl LifecycleListener for ObservingListener {
    async fn on_signal(&self, signal: PageSignal) {
        self.log.lock().unwrap().push((self.name.to_string(), signal));
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[tokio::test]
async fn test_before_unload_sends_undelivered_artifact() -> Result<()> {
    let h = harness(FakeTransport::answering(500), VisibilityPolicy::Ignore)?;

    h.coordinator.start(context()).await?;
    h.capture.emit(b"undelivered").await;
    h.coordinator.stop().await;
    h.coordinator.recorder().wait_for_deliveries().await;
    assert_eq!(h.store.count().await?, 1);

    h.coordinator.dispatch(PageSignal::BeforeUnload).await;

    let beacons = h.transport.beacons();
    assert_eq!(beacons.len(), 1);
    assert_eq!(beacons[0].payload, Bytes::from_static(b"undelivered"));
    assert_eq!(h.store.count().await?, 0);

    let report = h.coordinator.pipeline().last_teardown().await.expect("teardown ran");
    assert_eq!(report.beacons, 1);
    assert_eq!(report.fallbacks, 0);
    assert_eq!(h.transport.flushes(), 1, "teardown waits for the send it started");

    Ok(())
}

#[tokio::test]
async fn test_before_unload_during_recording_stops_and_sends() -> Result<()> {
    let h = harness(FakeTransport::answering(200), VisibilityPolicy::Ignore)?;

    h.coordinator.start(context()).await?;
    h.capture.emit(&[9u8; 4096]).await;

    h.coordinator.dispatch(PageSignal::BeforeUnload).await;

    assert_eq!(h.coordinator.status().state, RecorderState::Idle);
    assert_eq!(h.capture.tracks_stopped(), 1);

    h.coordinator.recorder().wait_for_deliveries().await;

    // Closing: the primary path is never used
    assert!(h.transport.submitted().is_empty());
    let beacons = h.transport.beacons();
    assert_eq!(beacons.len(), 1);
    assert_eq!(beacons[0].payload.len(), 4096);
    assert_eq!(common::field(&beacons[0], "participant_id"), Some("P-007"));
    assert_eq!(h.store.count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_unavailable_beacon_keeps_artifact_for_next_load() -> Result<()> {
    let h = harness(
        FakeTransport::answering(200).without_beacon(),
        VisibilityPolicy::Ignore,
    )?;

    h.coordinator.start(context()).await?;
    h.capture.emit(b"survives").await;
    h.coordinator.dispatch(PageSignal::BeforeUnload).await;

    let report = h.coordinator.pipeline().last_teardown().await.expect("teardown ran");
    assert_eq!(report.beacons, 0);
    assert_eq!(report.fallbacks, 1);
    assert_eq!(h.store.count().await?, 1);

    // Next load drains it through the primary path
    let drain = h.coordinator.on_load().await;
    assert_eq!(drain.delivered, 1);
    assert_eq!(h.store.count().await?, 0);
    assert_eq!(h.transport.submitted()[0].payload, Bytes::from_static(b"survives"));

    Ok(())
}

#[tokio::test]
async fn test_hidden_page_keeps_recording_by_default() -> Result<()> {
    let h = harness(FakeTransport::answering(200), VisibilityPolicy::Ignore)?;

    h.coordinator.start(context()).await?;
    h.capture.emit(b"a").await;

    h.coordinator.dispatch(PageSignal::VisibilityHidden).await;
    assert_eq!(h.coordinator.status().state, RecorderState::Recording);

    h.coordinator.dispatch(PageSignal::VisibilityVisible).await;
    h.capture.emit(b"b").await;
    h.coordinator.stop().await;
    h.coordinator.recorder().wait_for_deliveries().await;

    assert_eq!(h.transport.submitted()[0].payload, Bytes::from_static(b"ab"));

    Ok(())
}

#[tokio::test]
async fn test_hidden_page_stops_recording_with_flush_policy() -> Result<()> {
    let h = harness(FakeTransport::answering(200), VisibilityPolicy::FlushAndStop)?;

    h.coordinator.start(context()).await?;
    h.capture.emit(b"hidden").await;

    h.coordinator.dispatch(PageSignal::VisibilityHidden).await;
    assert_eq!(h.coordinator.status().state, RecorderState::Idle);

    h.coordinator.recorder().wait_for_deliveries().await;

    // Not a teardown, so the confirmed path is used
    assert_eq!(h.transport.submitted().len(), 1);
    assert!(h.transport.beacons().is_empty());
    assert_eq!(h.store.count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_listeners_run_in_registration_order() -> Result<()> {
    let h = harness(FakeTransport::answering(200), VisibilityPolicy::Ignore)?;
    let log = Arc::new(Mutex::new(Vec::new()));

    for name in ["analytics", "autosave"] {
        h.coordinator
            .register(Arc::new(ObservingListener {
                name,
                log: Arc::clone(&log),
            }))
            .await;
    }

    h.coordinator.start(context()).await?;
    h.capture.emit(b"data").await;
    h.coordinator.dispatch(PageSignal::BeforeUnload).await;

    // The delivery pipeline always runs first, so by the time later listeners
    // see the signal the recording has been flushed
    assert_eq!(h.transport.beacons().len(), 1);

    let log = log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec![
            ("analytics".to_string(), PageSignal::BeforeUnload),
            ("autosave".to_string(), PageSignal::BeforeUnload),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_load_drains_orphaned_recordings() -> Result<()> {
    let h = harness(FakeTransport::answering(200), VisibilityPolicy::Ignore)?;

    for participant in ["P-1", "P-2", "P-3"] {
        h.store
            .put(Bytes::from_static(b"orphan"), common::metadata(participant))
            .await?;
    }

    let report = h.coordinator.on_load().await;

    assert_eq!(report.attempted, 3);
    assert_eq!(report.delivered, 3);
    assert_eq!(h.transport.submitted().len(), 3);
    assert_eq!(h.store.count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_start_after_cancelled_close_uses_primary_path() -> Result<()> {
    let h = harness(FakeTransport::answering(200), VisibilityPolicy::Ignore)?;

    h.coordinator.dispatch(PageSignal::BeforeUnload).await;
    assert!(h.coordinator.recorder().uploader().is_tearing_down());

    h.coordinator.dispatch(PageSignal::VisibilityVisible).await;
    assert!(!h.coordinator.recorder().uploader().is_tearing_down());

    h.coordinator.start(context()).await?;
    h.capture.emit(b"after").await;
    h.coordinator.stop().await;
    h.coordinator.recorder().wait_for_deliveries().await;

    assert_eq!(h.transport.submitted().len(), 1);
    assert!(h.transport.beacons().is_empty());

    Ok(())
}
