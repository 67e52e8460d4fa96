use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of the screen recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    /// No recording in progress
    Idle,
    /// Waiting for the platform to hand over a display stream
    Acquiring,
    /// Capturing fragments
    Recording,
    /// Stop requested; waiting for the recorder to flush
    Stopping,
    /// Building, persisting and dispatching the artifact
    Assembling,
    /// The last attempt failed; a new `start()` is allowed
    Error,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self::Idle
    }
}

impl RecorderState {
    /// States in which the recorder owns a display stream
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Acquiring | Self::Recording | Self::Stopping | Self::Assembling
        )
    }
}

/// Diagnostic snapshot of the recorder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecorderStatus {
    pub state: RecorderState,

    /// When the current recording started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since `started_at`
    pub elapsed_secs: f64,

    /// Fragments buffered for the current recording
    pub fragments_buffered: usize,

    /// Bytes buffered for the current recording
    pub bytes_buffered: usize,

    /// Content type negotiated with the recorder
    pub mime_type: Option<String>,

    /// Last acquisition or recorder error, if any
    pub last_error: Option<String>,
}

/// Format elapsed seconds as `m:ss`
pub fn format_elapsed(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
