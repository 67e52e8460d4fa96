// Test doubles for the platform capture API, the upload transport and the
// pending store.

#![allow(dead_code)]

use anyhow::{bail, Result};
use bytes::Bytes;
use capture_relay::config::{CaptureConfig, DeliveryConfig, EndpointConfig};
use capture_relay::store::{PendingRecording, PendingStore, RecordingMetadata};
use capture_relay::{
    CaptureConstraints, DeliveryUploader, DisplayCapture, MediaStream, RecorderEvent,
    RecorderHandle, RecorderState, ScreenRecorder, StoreError, TransportError, TransportResponse,
    UploadForm, UploadTransport,
};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Capture
// ============================================================================

#[derive(Default)]
struct CaptureShared {
    sender: Mutex<Option<mpsc::Sender<RecorderEvent>>>,
    late_fragment: Mutex<Option<Bytes>>,
    acquired: AtomicUsize,
    stop_requests: AtomicUsize,
    tracks_stopped: AtomicUsize,
    last_mime: Mutex<Option<String>>,
    last_constraints: Mutex<Option<CaptureConstraints>>,
    gated: std::sync::atomic::AtomicBool,
    gate: tokio::sync::Notify,
}

/// Display capture whose recorder is driven by the test
#[derive(Clone, Default)]
pub struct FakeCapture {
    shared: Arc<CaptureShared>,
    supported: Vec<String>,
    deny: Option<String>,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supporting(mut self, mime_types: &[&str]) -> Self {
        self.supported = mime_types.iter().map(|m| m.to_string()).collect();
        self
    }

    /// Every acquisition fails with `reason`, as if the user cancelled
    pub fn denying(mut self, reason: &str) -> Self {
        self.deny = Some(reason.to_string());
        self
    }

    /// A fragment the recorder emits after a stop request, before `Stopped`
    pub fn with_late_fragment(self, fragment: Bytes) -> Self {
        *self.shared.late_fragment.lock().unwrap() = Some(fragment);
        self
    }

    /// Hold acquisitions until `release()`, like an unanswered share prompt
    pub fn gated(self) -> Self {
        self.shared.gated.store(true, Ordering::SeqCst);
        self
    }

    pub fn release(&self) {
        self.shared.gated.store(false, Ordering::SeqCst);
        self.shared.gate.notify_one();
    }

    pub async fn emit(&self, fragment: &[u8]) {
        self.event(RecorderEvent::Data(Bytes::copy_from_slice(fragment))).await;
    }

    pub async fn event(&self, event: RecorderEvent) {
        let sender = self.shared.sender.lock().unwrap().clone();
        if let Some(sender) = sender {
            sender.send(event).await.expect("recorder listening");
        }
    }

    pub fn acquired(&self) -> usize {
        self.shared.acquired.load(Ordering::SeqCst)
    }

    pub fn stop_requests(&self) -> usize {
        self.shared.stop_requests.load(Ordering::SeqCst)
    }

    pub fn tracks_stopped(&self) -> usize {
        self.shared.tracks_stopped.load(Ordering::SeqCst)
    }

    pub fn last_mime(&self) -> Option<String> {
        self.shared.last_mime.lock().unwrap().clone()
    }

    pub fn last_constraints(&self) -> Option<CaptureConstraints> {
        self.shared.last_constraints.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DisplayCapture for FakeCapture {
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<Box<dyn MediaStream>> {
        *self.shared.last_constraints.lock().unwrap() = Some(constraints.clone());
        if self.shared.gated.load(Ordering::SeqCst) {
            self.shared.gate.notified().await;
        }
        if let Some(reason) = &self.deny {
            bail!("{}", reason);
        }
        self.shared.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|m| m == mime_type)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FakeStream {
    shared: Arc<CaptureShared>,
}

impl MediaStream for FakeStream {
    fn start_recorder(&mut self, mime_type: Option<&str>) -> Result<RecorderHandle> {
        let (tx, rx) = mpsc::channel(64);
        *self.shared.sender.lock().unwrap() = Some(tx);
        *self.shared.last_mime.lock().unwrap() = mime_type.map(str::to_string);
        Ok(RecorderHandle {
            mime_type: mime_type.unwrap_or("video/webm").to_string(),
            events: rx,
        })
    }

    fn request_stop(&mut self) {
        self.shared.stop_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.shared.sender.lock().unwrap().as_ref() {
            if let Some(late) = self.shared.late_fragment.lock().unwrap().take() {
                let _ = tx.try_send(RecorderEvent::Data(late));
            }
            let _ = tx.try_send(RecorderEvent::Stopped);
        }
    }

    fn stop_tracks(&mut self) {
        self.shared.tracks_stopped.fetch_add(1, Ordering::SeqCst);
        self.shared.sender.lock().unwrap().take();
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Upload transport answering with scripted status codes
pub struct FakeTransport {
    statuses: Mutex<VecDeque<u16>>,
    default_status: Mutex<u16>,
    body: Mutex<Bytes>,
    failing_participants: Mutex<HashSet<String>>,
    beacon_available: bool,
    submitted: Mutex<Vec<UploadForm>>,
    beacons: Mutex<Vec<UploadForm>>,
    flushes: AtomicUsize,
}

impl FakeTransport {
    pub fn answering(status: u16) -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            default_status: Mutex::new(status),
            body: Mutex::new(Bytes::from_static(br#"{"success": true}"#)),
            failing_participants: Mutex::new(HashSet::new()),
            beacon_available: true,
            submitted: Mutex::new(Vec::new()),
            beacons: Mutex::new(Vec::new()),
            flushes: AtomicUsize::new(0),
        }
    }

    pub fn without_beacon(mut self) -> Self {
        self.beacon_available = false;
        self
    }

    pub fn with_body(self, body: &'static [u8]) -> Self {
        *self.body.lock().unwrap() = Bytes::from_static(body);
        self
    }

    /// Answer the next calls with these statuses, then the default
    pub fn then(&self, statuses: &[u16]) {
        self.statuses.lock().unwrap().extend(statuses.iter().copied());
    }

    pub fn set_default_status(&self, status: u16) {
        *self.default_status.lock().unwrap() = status;
    }

    /// Reject uploads carrying this participant id with a network error
    pub fn fail_participant(&self, participant_id: &str) {
        self.failing_participants
            .lock()
            .unwrap()
            .insert(participant_id.to_string());
    }

    pub fn submitted(&self) -> Vec<UploadForm> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn beacons(&self) -> Vec<UploadForm> {
        self.beacons.lock().unwrap().clone()
    }

    /// How often a teardown waited for its sends
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

pub fn field<'a>(form: &'a UploadForm, name: &str) -> Option<&'a str> {
    form.fields
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

#[async_trait::async_trait]
impl UploadTransport for FakeTransport {
    async fn submit(&self, form: UploadForm) -> Result<TransportResponse, TransportError> {
        self.submitted.lock().unwrap().push(form.clone());

        let participant = field(&form, "participant_id").unwrap_or_default().to_string();
        if self.failing_participants.lock().unwrap().contains(&participant) {
            return Err(TransportError::Request("connection refused".to_string()));
        }

        let status = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*self.default_status.lock().unwrap());

        let body = if (200..300).contains(&status) {
            self.body.lock().unwrap().clone()
        } else {
            Bytes::from_static(b"Internal Server Error")
        };

        Ok(TransportResponse { status, body })
    }

    fn send_beacon(&self, form: UploadForm) -> bool {
        if !self.beacon_available {
            return false;
        }
        self.beacons.lock().unwrap().push(form);
        true
    }

    async fn flush_beacons(&self, _grace: Duration) -> usize {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        0
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// ============================================================================
// Store
// ============================================================================

/// Store whose writes always fail
#[derive(Default)]
pub struct UnavailableStore {
    pub puts: AtomicUsize,
}

#[async_trait::async_trait]
impl PendingStore for UnavailableStore {
    async fn put(&self, _payload: Bytes, _metadata: RecordingMetadata) -> Result<i64, StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("quota exceeded".to_string()))
    }

    async fn list_all(&self) -> Result<Vec<PendingRecording>, StoreError> {
        Ok(Vec::new())
    }

    async fn remove(&self, _id: i64) -> Result<(), StoreError> {
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Store that counts inserts on top of an in-memory SQLite store
pub struct CountingStore {
    pub inner: capture_relay::SqlitePendingStore,
    pub puts: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: capture_relay::SqlitePendingStore::open_in_memory().expect("in-memory store"),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PendingStore for CountingStore {
    async fn put(&self, payload: Bytes, metadata: RecordingMetadata) -> Result<i64, StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(payload, metadata).await
    }

    async fn list_all(&self) -> Result<Vec<PendingRecording>, StoreError> {
        self.inner.list_all().await
    }

    async fn remove(&self, id: i64) -> Result<(), StoreError> {
        self.inner.remove(id).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub fn delivery_config(fallback_dir: &Path) -> DeliveryConfig {
    DeliveryConfig {
        max_primary_attempts: 1,
        retry_backoff_ms: 1,
        persist_attempts: 2,
        local_fallback: false,
        fallback_dir: fallback_dir.to_path_buf(),
        beacon_max_bytes: None,
        beacon_grace_ms: 100,
    }
}

pub fn capture_config() -> CaptureConfig {
    CaptureConfig {
        liveness_interval_secs: 1,
        ..Default::default()
    }
}

pub fn uploader(
    store: Arc<dyn PendingStore>,
    transport: Arc<FakeTransport>,
    config: DeliveryConfig,
) -> Arc<DeliveryUploader> {
    Arc::new(DeliveryUploader::new(
        store,
        transport,
        EndpointConfig::default(),
        config,
    ))
}

pub fn recorder(capture: &FakeCapture, uploader: Arc<DeliveryUploader>, config: &DeliveryConfig) -> ScreenRecorder {
    ScreenRecorder::new(Arc::new(capture.clone()), uploader, capture_config(), config)
}

pub fn metadata(participant_id: &str) -> RecordingMetadata {
    RecordingMetadata {
        filename: format!("session_recording_{participant_id}.webm"),
        trial_type: "Trial_1".to_string(),
        participant_id: participant_id.to_string(),
        content_type: "video/webm".to_string(),
        created_at: chrono::Utc::now(),
    }
}

/// Wait until the recorder is back to a resting state
pub async fn wait_until_settled(recorder: &ScreenRecorder) -> RecorderState {
    let mut rx = recorder.subscribe();
    let status = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| !s.state.is_active()),
    )
    .await
    .expect("recorder settled in time")
    .expect("status channel open")
    .clone();
    status.state
}
