use super::config::TrialContext;
use super::stats::{format_elapsed, RecorderState, RecorderStatus};
use crate::capture::{
    select_mime_type, Artifact, Assembled, CaptureConstraints, ChunkAssembler, DisplayCapture,
    MediaStream, RecorderEvent,
};
use crate::config::{CaptureConfig, DeliveryConfig};
use crate::delivery::{linear_backoff, DeliveryUploader};
use crate::error::RecorderError;
use crate::store::{PendingRecording, RecordingMetadata};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Why a recording left the `Recording` state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called
    Requested,
    /// The captured source ended out-of-band
    TrackEnded,
    /// The recorder failed mid-session
    RecorderFault,
}

/// What happened to the artifact of a finished session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub stop_reason: StopReason,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
    pub fragments: usize,
    /// Artifact size; `None` when nothing was captured
    pub artifact_bytes: Option<usize>,
    /// Store id; `None` when nothing was captured or persistence failed
    pub pending_id: Option<i64>,
}

/// State owned by the task driving one capture lifecycle
struct RecordingSession {
    state: RecorderState,
    started_at: Option<DateTime<Utc>>,
    context: TrialContext,
    stream: Box<dyn MediaStream>,
    events: mpsc::Receiver<RecorderEvent>,
    assembler: ChunkAssembler,
    stop_reason: Option<StopReason>,
}

impl RecordingSession {
    /// Converge every stop trigger on one path; later triggers are ignored
    fn begin_stop(&mut self, reason: StopReason) -> bool {
        if self.state != RecorderState::Recording {
            return false;
        }

        info!("Stopping recording ({:?})", reason);
        self.state = RecorderState::Stopping;
        self.stop_reason = Some(reason);
        self.stream.request_stop();
        true
    }

    fn elapsed_secs(&self) -> f64 {
        elapsed_since(self.started_at)
    }
}

struct Inner {
    capture: Arc<dyn DisplayCapture>,
    uploader: Arc<DeliveryUploader>,
    capture_config: CaptureConfig,
    persist_attempts: u32,
    persist_backoff: Duration,
    status: watch::Sender<RecorderStatus>,
    start_lock: Mutex<()>,
    stop_tx: StdMutex<Option<mpsc::Sender<StopReason>>>,
    stop_requested: AtomicBool,
    deliveries: Mutex<Vec<JoinHandle<()>>>,
    last_report: Mutex<Option<SessionReport>>,
}

/// Screen recorder state machine
///
/// `Idle → Acquiring → Recording → Stopping → Assembling → Idle`, with
/// `Error` reachable from `Acquiring` (and from a recorder that fails to
/// start). A running recording is driven by one spawned task that owns the
/// `RecordingSession`; the handle only publishes status and forwards stop
/// requests.
#[derive(Clone)]
pub struct ScreenRecorder {
    inner: Arc<Inner>,
}

impl ScreenRecorder {
    pub fn new(
        capture: Arc<dyn DisplayCapture>,
        uploader: Arc<DeliveryUploader>,
        capture_config: CaptureConfig,
        delivery_config: &DeliveryConfig,
    ) -> Self {
        let (status, _) = watch::channel(RecorderStatus::default());

        info!("Screen recorder initialized (capture={})", capture.name());

        Self {
            inner: Arc::new(Inner {
                capture,
                uploader,
                capture_config,
                persist_attempts: delivery_config.persist_attempts.max(1),
                persist_backoff: Duration::from_millis(delivery_config.retry_backoff_ms),
                status,
                start_lock: Mutex::new(()),
                stop_tx: StdMutex::new(None),
                stop_requested: AtomicBool::new(false),
                deliveries: Mutex::new(Vec::new()),
                last_report: Mutex::new(None),
            }),
        }
    }

    pub fn uploader(&self) -> &Arc<DeliveryUploader> {
        &self.inner.uploader
    }

    /// Acquire a display stream and start recording
    ///
    /// Acquisition failures leave the recorder in `Error` with nothing held.
    pub async fn start(&self, context: TrialContext) -> Result<(), RecorderError> {
        context.validate()?;

        let _guard = self.inner.start_lock.lock().await;

        if self.state().is_active() {
            warn!("Recording already started");
            return Err(RecorderError::AlreadyActive);
        }

        info!(
            "Starting screen recording (participant={}, trial={})",
            context.participant_id, context.trial_type
        );

        self.inner.stop_requested.store(false, Ordering::SeqCst);
        self.inner.status.send_modify(|s| {
            *s = RecorderStatus {
                state: RecorderState::Acquiring,
                ..Default::default()
            }
        });

        // Dropped after every exit from here on, including cancellation of
        // this future while the platform prompt is open.
        let _acquiring = AcquiringGuard(&self.inner);

        let capture = Arc::clone(&self.inner.capture);
        let constraints = CaptureConstraints::from(&self.inner.capture_config);

        let mut stream = match capture.acquire(&constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                let message = format!("{:#}", e);
                error!("Screen capture unavailable: {}", message);
                self.fail(message.clone());
                return Err(RecorderError::Acquisition(message));
            }
        };

        if self.inner.stop_requested.load(Ordering::SeqCst) {
            info!("Stop requested during acquisition; releasing stream");
            stream.stop_tracks();
            self.inner.status.send_modify(|s| *s = RecorderStatus::default());
            return Ok(());
        }

        let preferred = select_mime_type(&self.inner.capture_config.mime_types, |m| {
            capture.is_type_supported(m)
        });
        match &preferred {
            Some(mime) => info!("Using recorder format {}", mime),
            None => info!("No preferred format supported; using platform default"),
        }

        let handle = match stream.start_recorder(preferred.as_deref()) {
            Ok(handle) => handle,
            Err(e) => {
                let message = format!("{:#}", e);
                error!("Recorder failed to start: {}", message);
                stream.stop_tracks();
                self.fail(message.clone());
                return Err(RecorderError::RecorderFault(message));
            }
        };

        let started_at = Utc::now();
        let (stop_tx, stop_rx) = mpsc::channel(4);
        *lock(&self.inner.stop_tx) = Some(stop_tx);

        let mime_type = handle.mime_type.clone();
        self.inner.status.send_modify(|s| {
            *s = RecorderStatus {
                state: RecorderState::Recording,
                started_at: Some(started_at),
                mime_type: Some(mime_type),
                ..Default::default()
            }
        });

        let session = RecordingSession {
            state: RecorderState::Recording,
            started_at: Some(started_at),
            context,
            stream,
            assembler: ChunkAssembler::new(handle.mime_type),
            events: handle.events,
            stop_reason: None,
        };

        tokio::spawn(run_session(Arc::clone(&self.inner), session, stop_rx));

        info!("Screen recording started");

        Ok(())
    }

    /// Stop the active recording and wait until its resources are released
    ///
    /// Idempotent: a no-op while `Idle` or `Error`, and concurrent callers
    /// all wait on the same session. Delivery continues in the background.
    pub async fn stop(&self) -> RecorderStatus {
        match self.state() {
            RecorderState::Idle | RecorderState::Error => {
                debug!("Stop ignored; no active recording");
            }
            RecorderState::Acquiring => {
                info!("Stop requested while acquiring");
                self.inner.stop_requested.store(true, Ordering::SeqCst);
            }
            RecorderState::Recording | RecorderState::Stopping | RecorderState::Assembling => {
                self.inner.stop_requested.store(true, Ordering::SeqCst);
                let stop_tx = lock(&self.inner.stop_tx).clone();
                if let Some(tx) = stop_tx {
                    // A full or closed channel means a stop is already under way.
                    let _ = tx.try_send(StopReason::Requested);
                }
                self.settled().await;
            }
        }

        self.status()
    }

    /// Current state with elapsed time computed now
    pub fn status(&self) -> RecorderStatus {
        let mut status = self.inner.status.borrow().clone();
        status.elapsed_secs = elapsed_since(status.started_at);
        status
    }

    pub fn state(&self) -> RecorderState {
        self.inner.status.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<RecorderStatus> {
        self.inner.status.subscribe()
    }

    /// Report of the most recently finished session
    pub async fn last_report(&self) -> Option<SessionReport> {
        self.inner.last_report.lock().await.clone()
    }

    /// Wait for the background deliveries of finished sessions
    pub async fn wait_for_deliveries(&self) {
        let handles: Vec<_> = self.inner.deliveries.lock().await.drain(..).collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Delivery task panicked: {}", e);
            }
        }
    }

    async fn settled(&self) {
        let mut rx = self.inner.status.subscribe();
        if rx.wait_for(|s| !s.state.is_active()).await.is_err() {
            warn!("Recorder status channel closed while stopping");
        }
    }

    fn fail(&self, message: String) {
        self.inner.status.send_modify(|s| {
            *s = RecorderStatus {
                state: RecorderState::Error,
                last_error: Some(message),
                ..Default::default()
            }
        });
    }
}

/// Drive one recording from first fragment to release
async fn run_session(inner: Arc<Inner>, mut session: RecordingSession, mut stop_rx: mpsc::Receiver<StopReason>) {
    let period = Duration::from_secs(inner.capture_config.liveness_interval_secs.max(1));
    let mut liveness = tokio::time::interval_at(Instant::now() + period, period);

    // A stop that raced with start-up.
    if inner.stop_requested.load(Ordering::SeqCst) && session.begin_stop(StopReason::Requested) {
        publish_state(&inner, &session);
    }

    loop {
        tokio::select! {
            event = session.events.recv() => match event {
                Some(RecorderEvent::Data(fragment)) => {
                    session.assembler.append(fragment);
                    publish_progress(&inner, &session);
                }
                Some(RecorderEvent::TrackEnded) => {
                    info!("Captured display track ended");
                    if session.begin_stop(StopReason::TrackEnded) {
                        publish_state(&inner, &session);
                    }
                }
                Some(RecorderEvent::Fault(message)) => {
                    error!("Media recorder error: {}", message);
                    if session.begin_stop(StopReason::RecorderFault) {
                        publish_state(&inner, &session);
                    }
                }
                Some(RecorderEvent::Stopped) | None => break,
            },
            Some(reason) = stop_rx.recv() => {
                if session.begin_stop(reason) {
                    publish_state(&inner, &session);
                }
            }
            _ = liveness.tick() => {
                if session.state == RecorderState::Recording {
                    info!(
                        "Recording {} ({} fragments)",
                        format_elapsed(session.elapsed_secs() as u64),
                        session.assembler.fragment_count()
                    );
                }
            }
        }
    }

    let stop_reason = session.stop_reason.unwrap_or(StopReason::Requested);
    let fragments = session.assembler.fragment_count();
    let duration_secs = session.elapsed_secs();

    info!(
        "Recorder stopped after {}s, fragments={}",
        duration_secs.round(),
        fragments
    );

    let assembled = session.assembler.finalize();

    session.state = RecorderState::Assembling;
    publish_state(&inner, &session);

    // Release before delivery so a slow store or network never holds the display.
    session.stream.stop_tracks();
    drop(liveness);

    let mut report = SessionReport {
        stop_reason,
        started_at: session.started_at,
        duration_secs,
        fragments,
        artifact_bytes: None,
        pending_id: None,
    };

    match assembled {
        Assembled::Empty => {
            info!("No data captured; nothing to deliver");
        }
        Assembled::Artifact(artifact) => {
            report.artifact_bytes = Some(artifact.len());
            report.pending_id = hand_off(&inner, artifact, &session.context).await;
        }
    }

    *inner.last_report.lock().await = Some(report);
    *lock(&inner.stop_tx) = None;

    inner.status.send_modify(|s| *s = RecorderStatus::default());
}

/// Persist the artifact, then dispatch the primary upload in the background
async fn hand_off(inner: &Arc<Inner>, artifact: Artifact, context: &TrialContext) -> Option<i64> {
    let metadata = RecordingMetadata::for_artifact(&artifact, context, Utc::now());
    let uploader = Arc::clone(&inner.uploader);
    let mut last_error = None;

    for attempt in 1..=inner.persist_attempts {
        match uploader.store().put(artifact.bytes.clone(), metadata.clone()).await {
            Ok(id) => {
                if uploader.is_tearing_down() {
                    // The teardown sweep sends everything still queued.
                    info!("Recording {} queued for teardown send", id);
                    return Some(id);
                }

                let record = PendingRecording {
                    id,
                    payload: artifact.bytes,
                    metadata,
                };
                let task = tokio::spawn(async move {
                    let outcome = uploader.deliver(&record).await;
                    debug!("Delivery of recording {} finished: {:?}", record.id, outcome);
                });
                inner.deliveries.lock().await.push(task);
                return Some(id);
            }
            Err(e) => {
                warn!(
                    "Failed to persist recording (attempt {}/{}): {}",
                    attempt, inner.persist_attempts, e
                );
                last_error = Some(e);
                if attempt < inner.persist_attempts {
                    tokio::time::sleep(linear_backoff(inner.persist_backoff, attempt)).await;
                }
            }
        }
    }

    warn!(
        "Pending store unavailable ({}); falling back to best-effort delivery without retry",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    );

    if uploader.is_tearing_down() {
        uploader.send_teardown_unpersisted(artifact.bytes, metadata).await;
    } else {
        let task = tokio::spawn(async move {
            let outcome = uploader.deliver_unpersisted(artifact.bytes, metadata).await;
            debug!("Best-effort delivery finished: {:?}", outcome);
        });
        inner.deliveries.lock().await.push(task);
    }

    None
}

fn publish_state(inner: &Inner, session: &RecordingSession) {
    let state = session.state;
    let fragments = session.assembler.fragment_count();
    let bytes = session.assembler.buffered_bytes();
    inner.status.send_modify(|s| {
        s.state = state;
        s.fragments_buffered = fragments;
        s.bytes_buffered = bytes;
    });
}

fn publish_progress(inner: &Inner, session: &RecordingSession) {
    let fragments = session.assembler.fragment_count();
    let bytes = session.assembler.buffered_bytes();
    inner.status.send_modify(|s| {
        s.fragments_buffered = fragments;
        s.bytes_buffered = bytes;
    });
}

/// Puts a recorder whose acquisition never finished back to `Idle`
struct AcquiringGuard<'a>(&'a Inner);

impl Drop for AcquiringGuard<'_> {
    fn drop(&mut self) {
        self.0.status.send_if_modified(|s| {
            if s.state != RecorderState::Acquiring {
                return false;
            }
            warn!("Screen capture request abandoned; recorder reset");
            *s = RecorderStatus::default();
            true
        });
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn elapsed_since(started_at: Option<DateTime<Utc>>) -> f64 {
    started_at
        .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
        .unwrap_or(0.0)
}
