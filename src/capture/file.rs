// Display capture backed by a pre-recorded media file
//
// The file is replayed as a live recorder would deliver it: one slice per
// timeslice tick, a TrackEnded notification once the file is exhausted, and
// a Stopped confirmation after a stop request.

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use super::backend::{CaptureConstraints, DisplayCapture, MediaStream, RecorderEvent, RecorderHandle};

pub struct FileReplayCapture {
    path: PathBuf,
    mime_type: String,
    slice_bytes: usize,
    timeslice: Duration,
}

impl FileReplayCapture {
    pub fn new(path: impl AsRef<Path>, mime_type: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mime_type: mime_type.into(),
            slice_bytes: 64 * 1024,
            timeslice: Duration::from_millis(250),
        }
    }

    pub fn with_slices(mut self, slice_bytes: usize, timeslice: Duration) -> Self {
        self.slice_bytes = slice_bytes.max(1);
        self.timeslice = timeslice;
        self
    }
}

#[async_trait::async_trait]
impl DisplayCapture for FileReplayCapture {
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<Box<dyn MediaStream>> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("No capture source at {}", self.path.display()))?;
        if !meta.is_file() {
            bail!("Capture source {} is not a file", self.path.display());
        }

        info!(
            "Replaying {} ({} bytes) at up to {}x{} @ {}fps",
            self.path.display(),
            meta.len(),
            constraints.max_width,
            constraints.max_height,
            constraints.max_frame_rate
        );

        Ok(Box::new(FileReplayStream {
            path: self.path.clone(),
            mime_type: self.mime_type.clone(),
            slice_bytes: self.slice_bytes,
            timeslice: self.timeslice,
            stop_tx: None,
        }))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type == self.mime_type
    }

    fn name(&self) -> &str {
        "file-replay"
    }
}

struct FileReplayStream {
    path: PathBuf,
    mime_type: String,
    slice_bytes: usize,
    timeslice: Duration,
    stop_tx: Option<watch::Sender<bool>>,
}

impl MediaStream for FileReplayStream {
    fn start_recorder(&mut self, mime_type: Option<&str>) -> Result<RecorderHandle> {
        if self.stop_tx.is_some() {
            bail!("Recorder already started");
        }

        let negotiated = mime_type.unwrap_or(&self.mime_type).to_string();
        let (event_tx, event_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = watch::channel(false);
        self.stop_tx = Some(stop_tx);

        tokio::spawn(replay(
            self.path.clone(),
            self.slice_bytes,
            self.timeslice,
            event_tx,
            stop_rx,
        ));

        Ok(RecorderHandle {
            mime_type: negotiated,
            events: event_rx,
        })
    }

    fn request_stop(&mut self) {
        if let Some(tx) = &self.stop_tx {
            let _ = tx.send(true);
        }
    }

    fn stop_tracks(&mut self) {
        self.request_stop();
        self.stop_tx = None;
    }
}

async fn replay(
    path: PathBuf,
    slice_bytes: usize,
    timeslice: Duration,
    events: mpsc::Sender<RecorderEvent>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let data = match tokio::fs::read(&path).await {
        Ok(data) => Bytes::from(data),
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            let _ = events.send(RecorderEvent::Fault(e.to_string())).await;
            Bytes::new()
        }
    };

    let mut ticker = tokio::time::interval(timeslice);
    let mut offset = 0;
    let mut ended = data.is_empty();

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if offset < data.len() {
                    let end = (offset + slice_bytes).min(data.len());
                    if events.send(RecorderEvent::Data(data.slice(offset..end))).await.is_err() {
                        return;
                    }
                    offset = end;
                } else if !ended {
                    ended = true;
                    if events.send(RecorderEvent::TrackEnded).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    let _ = events.send(RecorderEvent::Stopped).await;
}
