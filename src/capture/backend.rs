use anyhow::Result;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::CaptureConfig;

/// Quality preferences passed to the platform when requesting a display stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub ideal_frame_rate: u32,
    pub max_frame_rate: u32,
    /// Draw the pointer into every captured frame
    pub cursor: bool,
    /// Audio is never requested for screen recordings
    pub audio: bool,
}

impl From<&CaptureConfig> for CaptureConstraints {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            ideal_width: config.ideal_width,
            ideal_height: config.ideal_height,
            max_width: config.max_width,
            max_height: config.max_height,
            ideal_frame_rate: config.ideal_frame_rate.min(config.max_frame_rate),
            max_frame_rate: config.max_frame_rate,
            cursor: true,
            audio: false,
        }
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

/// Notifications emitted by a running media recorder, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// An encoded fragment; may be empty during idle periods
    Data(Bytes),
    /// The recorder failed mid-session
    Fault(String),
    /// The captured source went away (e.g. the user revoked sharing)
    TrackEnded,
    /// The recorder has flushed every buffered fragment and is inactive
    Stopped,
}

/// A started recorder: the negotiated content type and its event feed
#[derive(Debug)]
pub struct RecorderHandle {
    pub mime_type: String,
    pub events: mpsc::Receiver<RecorderEvent>,
}

/// Display capture backend trait
///
/// Platform-specific implementations wrap the OS or browser capture API.
/// `FileReplayCapture` replays a media file for batch runs and testing.
#[async_trait::async_trait]
pub trait DisplayCapture: Send + Sync {
    /// Ask the platform for a display stream
    ///
    /// Fails when the user denies the request or no display is available.
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<Box<dyn MediaStream>>;

    /// Whether the recorder can produce the given container/codec string
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// An acquired display stream
pub trait MediaStream: Send {
    /// Start recording; `None` lets the platform pick its default format
    fn start_recorder(&mut self, mime_type: Option<&str>) -> Result<RecorderHandle>;

    /// Ask the recorder to flush and stop
    ///
    /// Completion is signalled by `RecorderEvent::Stopped`; fragments may
    /// still arrive before that.
    fn request_stop(&mut self);

    /// Release every track of the stream
    fn stop_tracks(&mut self);
}
