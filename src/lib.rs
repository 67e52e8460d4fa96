pub mod capture;
pub mod config;
pub mod delivery;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod session;
pub mod store;

pub use capture::{
    Artifact, Assembled, CaptureConstraints, ChunkAssembler, DisplayCapture, FileReplayCapture,
    MediaStream, RecorderEvent, RecorderHandle,
};
pub use config::Config;
pub use delivery::{
    Acknowledgment, DeliveryOutcome, DeliveryUploader, DrainReport, HttpTransport, TeardownOutcome,
    TransportResponse, UploadForm, UploadTransport,
};
pub use error::{RecorderError, StoreError, TransportError};
pub use http::{create_router, AppState};
pub use lifecycle::{LifecycleCoordinator, LifecycleListener, PageSignal, VisibilityPolicy};
pub use session::{RecorderState, RecorderStatus, ScreenRecorder, SessionReport, StopReason, TrialContext};
pub use store::{PendingRecording, PendingStore, RecordingMetadata, SqlitePendingStore};
