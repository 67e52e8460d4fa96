use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::fallback::LocalFileSink;
use super::transport::{TransportResponse, UploadForm, UploadTransport};
use crate::config::{DeliveryConfig, EndpointConfig};
use crate::store::{PendingRecording, PendingStore, RecordingMetadata};

/// Optional JSON body the endpoint returns on success
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Acknowledgment {
    /// Parse a response body; absent or malformed bodies yield `None`
    pub fn parse(body: &[u8]) -> Option<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        serde_json::from_slice(body).ok()
    }
}

/// Result of a single delivery attempt against one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The endpoint accepted the artifact and the pending entry was removed
    Delivered { ack: Option<Acknowledgment> },
    /// The artifact is still queued and will be retried on the next drain
    RetryableFailure { reason: String },
    /// Primary delivery failed; the artifact was written locally and is
    /// still queued
    FallbackUsed { path: PathBuf, reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Result of the teardown-safe send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// The send was initiated and the entry optimistically removed
    BeaconInitiated,
    /// The beacon could not be started; the artifact was written locally
    /// when possible and stays queued
    FallbackExhausted { path: Option<PathBuf> },
}

/// Summary of a drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: Vec<i64>,
}

/// Sends recordings to the collection endpoint
///
/// Strategies, strongest guarantee first:
/// - primary: multipart POST, confirmed by a 2xx status
/// - teardown: fire-and-forget beacon, at most one attempt and never
///   confirmed; the entry is removed once the send is initiated, so a send
///   cut off by process exit loses that recording
/// - local: the artifact is written to disk for manual recovery
pub struct DeliveryUploader {
    store: Arc<dyn PendingStore>,
    transport: Arc<dyn UploadTransport>,
    sink: LocalFileSink,
    endpoint: EndpointConfig,
    config: DeliveryConfig,
    tearing_down: AtomicBool,
}

impl DeliveryUploader {
    pub fn new(
        store: Arc<dyn PendingStore>,
        transport: Arc<dyn UploadTransport>,
        endpoint: EndpointConfig,
        config: DeliveryConfig,
    ) -> Self {
        info!(
            "Delivery uploader ready (transport={}, attempts={}, local fallback={})",
            transport.name(),
            config.max_primary_attempts,
            config.local_fallback
        );

        Self {
            store,
            transport,
            sink: LocalFileSink::new(config.fallback_dir.clone()),
            endpoint,
            config,
            tearing_down: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn PendingStore> {
        &self.store
    }

    /// Mark the host as closing; local fallback is skipped from now on
    pub fn set_tearing_down(&self, tearing_down: bool) {
        self.tearing_down.store(tearing_down, Ordering::SeqCst);
    }

    pub fn is_tearing_down(&self) -> bool {
        self.tearing_down.load(Ordering::SeqCst)
    }

    /// Deliver a queued recording with the primary strategy
    ///
    /// Retries up to `max_primary_attempts`, then writes the artifact locally
    /// unless the host is tearing down. The entry only leaves the store on a
    /// 2xx response.
    pub async fn deliver(&self, record: &PendingRecording) -> DeliveryOutcome {
        let attempts = self.config.max_primary_attempts.max(1);
        let mut reason = String::new();

        for attempt in 1..=attempts {
            match self.submit(&record.payload, &record.metadata).await {
                Ok(response) => {
                    let ack = Acknowledgment::parse(&response.body);
                    info!(
                        "Recording {} delivered ({} bytes, status {})",
                        record.id,
                        record.payload.len(),
                        response.status
                    );
                    if let Err(e) = self.store.remove(record.id).await {
                        // The endpoint has the data; a later drain re-sends it.
                        warn!("Delivered recording {} could not be dequeued: {}", record.id, e);
                    }
                    return DeliveryOutcome::Delivered { ack };
                }
                Err(e) => {
                    warn!(
                        "Upload of recording {} failed (attempt {}/{}): {}",
                        record.id, attempt, attempts, e
                    );
                    reason = e;
                }
            }

            if attempt < attempts && !self.is_tearing_down() {
                let base = Duration::from_millis(self.config.retry_backoff_ms);
                tokio::time::sleep(linear_backoff(base, attempt)).await;
            }
        }

        match self.save_locally(&record.payload, &record.metadata).await {
            Some(path) => DeliveryOutcome::FallbackUsed { path, reason },
            None => DeliveryOutcome::RetryableFailure { reason },
        }
    }

    /// Best-effort delivery for an artifact the store could not persist
    ///
    /// One primary attempt, then the local file. Nothing is retried later.
    pub async fn deliver_unpersisted(&self, payload: Bytes, metadata: RecordingMetadata) -> DeliveryOutcome {
        match self.submit(&payload, &metadata).await {
            Ok(response) => {
                info!(
                    "Unpersisted recording {} delivered (status {})",
                    metadata.filename, response.status
                );
                DeliveryOutcome::Delivered {
                    ack: Acknowledgment::parse(&response.body),
                }
            }
            Err(reason) => {
                error!(
                    "Unpersisted recording {} could not be delivered: {}",
                    metadata.filename, reason
                );
                match self.save_locally(&payload, &metadata).await {
                    Some(path) => DeliveryOutcome::FallbackUsed { path, reason },
                    None => DeliveryOutcome::RetryableFailure { reason },
                }
            }
        }
    }

    /// Teardown-safe send of a queued recording
    ///
    /// Does not wait for the endpoint. Once the send is initiated the entry
    /// is removed without confirmation.
    pub async fn send_teardown(&self, record: &PendingRecording) -> TeardownOutcome {
        let outcome = self.teardown(&record.payload, &record.metadata).await;

        if outcome == TeardownOutcome::BeaconInitiated {
            if let Err(e) = self.store.remove(record.id).await {
                warn!("Recording {} stays queued after teardown send: {}", record.id, e);
            }
        }

        outcome
    }

    /// Teardown-safe send for an artifact the store could not persist
    pub async fn send_teardown_unpersisted(&self, payload: Bytes, metadata: RecordingMetadata) -> TeardownOutcome {
        self.teardown(&payload, &metadata).await
    }

    async fn teardown(&self, payload: &Bytes, metadata: &RecordingMetadata) -> TeardownOutcome {
        let within_limit = self
            .config
            .beacon_max_bytes
            .map_or(true, |max| payload.len() <= max);

        if within_limit && self.transport.send_beacon(self.form(payload, metadata)) {
            info!(
                "Teardown send initiated for {} ({} bytes)",
                metadata.filename,
                payload.len()
            );
            return TeardownOutcome::BeaconInitiated;
        }

        error!(
            "Teardown send unavailable for {} ({} bytes); saving locally",
            metadata.filename,
            payload.len()
        );

        let path = if self.config.local_fallback {
            match self.sink.materialize(payload, metadata).await {
                Ok(path) => Some(path),
                Err(e) => {
                    error!("Local save of {} failed: {}", metadata.filename, e);
                    None
                }
            }
        } else {
            None
        };

        TeardownOutcome::FallbackExhausted { path }
    }

    /// Wait, within the configured grace period, for initiated teardown
    /// sends to leave the process
    pub async fn flush_teardown_sends(&self) -> usize {
        let grace = Duration::from_millis(self.config.beacon_grace_ms);
        self.transport.flush_beacons(grace).await
    }

    /// Retry every queued recording once with the primary strategy
    ///
    /// Entries are attempted independently; a failure never stops the pass.
    pub async fn drain_pending(&self) -> DrainReport {
        let pending = match self.store.list_all().await {
            Ok(pending) => pending,
            Err(e) => {
                error!("Pending store unreadable, nothing drained: {}", e);
                return DrainReport::default();
            }
        };

        if pending.is_empty() {
            return DrainReport::default();
        }

        info!("Draining {} pending recording(s)", pending.len());

        let mut report = DrainReport {
            attempted: pending.len(),
            ..Default::default()
        };

        for record in &pending {
            match self.submit(&record.payload, &record.metadata).await {
                Ok(response) => {
                    info!(
                        "Pending recording {} delivered (status {})",
                        record.id, response.status
                    );
                    match self.store.remove(record.id).await {
                        Ok(()) => report.delivered += 1,
                        Err(e) => {
                            warn!("Delivered recording {} could not be dequeued: {}", record.id, e);
                            report.failed.push(record.id);
                        }
                    }
                }
                Err(e) => {
                    warn!("Pending recording {} still undeliverable: {}", record.id, e);
                    report.failed.push(record.id);
                }
            }
        }

        info!(
            "Drain complete: {}/{} delivered",
            report.delivered, report.attempted
        );

        report
    }

    async fn submit(&self, payload: &Bytes, metadata: &RecordingMetadata) -> Result<TransportResponse, String> {
        let response = self
            .transport
            .submit(self.form(payload, metadata))
            .await
            .map_err(|e| e.to_string())?;

        if response.is_success() {
            Ok(response)
        } else {
            Err(format!(
                "endpoint answered {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body).trim()
            ))
        }
    }

    async fn save_locally(&self, payload: &Bytes, metadata: &RecordingMetadata) -> Option<PathBuf> {
        if !self.config.local_fallback || self.is_tearing_down() {
            return None;
        }

        match self.sink.materialize(payload, metadata).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Local save of {} failed: {}", metadata.filename, e);
                None
            }
        }
    }

    fn form(&self, payload: &Bytes, metadata: &RecordingMetadata) -> UploadForm {
        UploadForm {
            file_field: self.endpoint.file_field.clone(),
            filename: metadata.filename.clone(),
            content_type: metadata.content_type.clone(),
            payload: payload.clone(),
            fields: vec![
                (
                    self.endpoint.trial_type_field.clone(),
                    or_unknown(&metadata.trial_type),
                ),
                (
                    self.endpoint.participant_id_field.clone(),
                    or_unknown(&metadata.participant_id),
                ),
            ],
        }
    }
}

/// Delay before the attempt after `attempt`; saturates instead of overflowing
pub fn linear_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

fn or_unknown(value: &str) -> String {
    if value.trim().is_empty() {
        "unknown".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledgment_parse() {
        let ack = Acknowledgment::parse(br#"{"success": true, "filename": "a.webm"}"#);
        assert_eq!(
            ack,
            Some(Acknowledgment {
                success: Some(true),
                filename: Some("a.webm".to_string()),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_acknowledgment_absent_or_malformed() {
        assert_eq!(Acknowledgment::parse(b""), None);
        assert_eq!(Acknowledgment::parse(b"  \n"), None);
        assert_eq!(Acknowledgment::parse(b"<html>ok</html>"), None);
    }

    #[test]
    fn test_linear_backoff_saturates() {
        assert_eq!(linear_backoff(Duration::from_millis(500), 3), Duration::from_millis(1500));
        assert_eq!(linear_backoff(Duration::from_millis(u64::MAX), u32::MAX), Duration::MAX);
        assert_eq!(linear_backoff(Duration::MAX, 2), Duration::MAX);
    }

    #[test]
    fn test_or_unknown() {
        assert_eq!(or_unknown(""), "unknown");
        assert_eq!(or_unknown("Trial_2"), "Trial_2");
    }
}
