use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use super::signal::{PageSignal, VisibilityPolicy};
use crate::delivery::{DrainReport, TeardownOutcome};
use crate::error::RecorderError;
use crate::session::{RecorderStatus, ScreenRecorder, TrialContext};

/// Receives page signals in registration order
#[async_trait::async_trait]
pub trait LifecycleListener: Send + Sync {
    async fn on_signal(&self, signal: PageSignal);

    /// Listener name for logging
    fn name(&self) -> &str;
}

/// Outcome of a flush-before-exit pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    /// Queued recordings whose teardown send was initiated
    pub beacons: usize,
    /// Recordings that could only be written locally (or not at all)
    pub fallbacks: usize,
}

/// Binds the recorder and uploader to page signals
///
/// Always the first listener of a `LifecycleCoordinator`.
pub struct DeliveryPipeline {
    recorder: ScreenRecorder,
    policy: VisibilityPolicy,
    last_teardown: Mutex<Option<TeardownReport>>,
}

impl DeliveryPipeline {
    pub fn new(recorder: ScreenRecorder, policy: VisibilityPolicy) -> Self {
        Self {
            recorder,
            policy,
            last_teardown: Mutex::new(None),
        }
    }

    /// Stop any active recording and push everything queued out through the
    /// teardown-safe send
    pub async fn flush_for_teardown(&self) -> TeardownReport {
        let uploader = self.recorder.uploader();
        uploader.set_tearing_down(true);

        if self.recorder.state().is_active() {
            info!("Teardown: stopping active recording");
            self.recorder.stop().await;
        }

        let pending = match uploader.store().list_all().await {
            Ok(pending) => pending,
            Err(e) => {
                error!("Teardown: pending store unreadable: {}", e);
                Vec::new()
            }
        };

        let mut report = TeardownReport::default();
        for record in &pending {
            match uploader.send_teardown(record).await {
                TeardownOutcome::BeaconInitiated => report.beacons += 1,
                TeardownOutcome::FallbackExhausted { .. } => report.fallbacks += 1,
            }
        }

        if report.beacons > 0 {
            uploader.flush_teardown_sends().await;
        }

        if !pending.is_empty() {
            info!(
                "Teardown flush: {} sent, {} saved locally",
                report.beacons, report.fallbacks
            );
        }

        *self.last_teardown.lock().await = Some(report.clone());
        report
    }

    pub async fn last_teardown(&self) -> Option<TeardownReport> {
        self.last_teardown.lock().await.clone()
    }

    async fn on_hidden(&self) {
        let status = self.recorder.status();
        if status.state.is_active() {
            match self.policy {
                VisibilityPolicy::Ignore => {
                    info!(
                        "Page hidden while recording ({:.0}s); continuing",
                        status.elapsed_secs
                    );
                }
                VisibilityPolicy::FlushAndStop => {
                    info!("Page hidden while recording; stopping and flushing");
                    self.recorder.stop().await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl LifecycleListener for DeliveryPipeline {
    async fn on_signal(&self, signal: PageSignal) {
        match signal {
            PageSignal::BeforeUnload | PageSignal::Unload => {
                self.flush_for_teardown().await;
            }
            PageSignal::VisibilityHidden => self.on_hidden().await,
            PageSignal::VisibilityVisible => {
                let uploader = self.recorder.uploader();
                if uploader.is_tearing_down() {
                    // The close was cancelled; the page lives on.
                    info!("Page visible again; leaving teardown mode");
                    uploader.set_tearing_down(false);
                }
            }
        }
    }

    fn name(&self) -> &str {
        "delivery-pipeline"
    }
}

/// Control surface for the host page
pub struct LifecycleCoordinator {
    recorder: ScreenRecorder,
    pipeline: Arc<DeliveryPipeline>,
    listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
}

impl LifecycleCoordinator {
    pub fn new(recorder: ScreenRecorder, policy: VisibilityPolicy) -> Self {
        let pipeline = Arc::new(DeliveryPipeline::new(recorder.clone(), policy));
        let first: Arc<dyn LifecycleListener> = pipeline.clone();

        info!("Lifecycle coordinator ready (visibility policy: {:?})", policy);

        Self {
            recorder,
            pipeline,
            listeners: RwLock::new(vec![first]),
        }
    }

    pub fn recorder(&self) -> &ScreenRecorder {
        &self.recorder
    }

    pub fn pipeline(&self) -> &Arc<DeliveryPipeline> {
        &self.pipeline
    }

    /// Append a listener; it runs after every listener registered before it
    pub async fn register(&self, listener: Arc<dyn LifecycleListener>) {
        info!("Registered lifecycle listener {}", listener.name());
        self.listeners.write().await.push(listener);
    }

    /// Deliver a page signal to every listener, in registration order
    pub async fn dispatch(&self, signal: PageSignal) {
        info!("Page signal: {}", signal);
        let listeners = self.listeners.read().await.clone();
        for listener in listeners {
            listener.on_signal(signal).await;
        }
    }

    /// Sweep recordings orphaned by a previous run
    pub async fn on_load(&self) -> DrainReport {
        self.retry_pending().await
    }

    pub async fn start(&self, context: TrialContext) -> Result<(), RecorderError> {
        let uploader = self.recorder.uploader();
        if uploader.is_tearing_down() {
            warn!("Starting a recording after a teardown signal");
            uploader.set_tearing_down(false);
        }
        self.recorder.start(context).await
    }

    pub async fn stop(&self) -> RecorderStatus {
        self.recorder.stop().await
    }

    pub async fn retry_pending(&self) -> DrainReport {
        self.recorder.uploader().drain_pending().await
    }

    pub fn status(&self) -> RecorderStatus {
        self.recorder.status()
    }
}
