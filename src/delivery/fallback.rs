use bytes::Bytes;
use std::path::PathBuf;
use tracing::info;

use crate::capture::extension_for;
use crate::store::RecordingMetadata;

/// Writes artifacts to a local directory so a person can recover them
#[derive(Debug, Clone)]
pub struct LocalFileSink {
    dir: PathBuf,
}

impl LocalFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Materialize the artifact as `session_<unix ms>.<ext>`
    ///
    /// The file is written under a temporary name and renamed into place, so
    /// a crash never leaves a truncated recording behind.
    pub async fn materialize(
        &self,
        payload: &Bytes,
        metadata: &RecordingMetadata,
    ) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stem = format!("session_{}", metadata.created_at.timestamp_millis());
        let ext = extension_for(&metadata.content_type);

        let mut target = self.dir.join(format!("{stem}.{ext}"));
        let mut suffix = 1;
        while tokio::fs::try_exists(&target).await? {
            target = self.dir.join(format!("{stem}-{suffix}.{ext}"));
            suffix += 1;
        }

        let partial = target.with_extension(format!("{ext}.part"));
        tokio::fs::write(&partial, payload).await?;
        tokio::fs::rename(&partial, &target).await?;

        info!(
            "Recording saved locally for manual recovery: {} ({} bytes)",
            target.display(),
            payload.len()
        );

        Ok(target)
    }
}
