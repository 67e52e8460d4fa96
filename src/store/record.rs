use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::{extension_for, Artifact};
use crate::session::TrialContext;

/// Descriptive fields stored next to an undelivered payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    /// Filename sent with the multipart upload
    pub filename: String,

    pub trial_type: String,

    pub participant_id: String,

    /// Content type negotiated by the recorder
    pub content_type: String,

    /// When the artifact was assembled
    pub created_at: DateTime<Utc>,
}

impl RecordingMetadata {
    pub fn for_artifact(artifact: &Artifact, context: &TrialContext, created_at: DateTime<Utc>) -> Self {
        Self {
            filename: upload_filename(created_at, &artifact.content_type),
            trial_type: context.trial_type.clone(),
            participant_id: context.participant_id.clone(),
            content_type: artifact.content_type.clone(),
            created_at,
        }
    }
}

/// A finalized artifact that has not yet been confirmed by the endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecording {
    pub id: i64,
    pub payload: Bytes,
    pub metadata: RecordingMetadata,
}

/// `session_recording_<ISO-8601 timestamp with ':' and '.' stripped>.<ext>`
pub fn upload_filename(at: DateTime<Utc>, content_type: &str) -> String {
    format!(
        "session_recording_{}.{}",
        at.format("%Y-%m-%dT%H%M%S%3fZ"),
        extension_for(content_type)
    )
}
