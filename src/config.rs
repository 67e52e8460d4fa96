use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

use crate::lifecycle::VisibilityPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub endpoint: EndpointConfig,
    pub store: StoreConfig,
    pub capture: CaptureConfig,
    pub delivery: DeliveryConfig,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "capture-relay".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Remote collection endpoint and the multipart field names it expects
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub file_field: String,
    pub trial_type_field: String,
    pub participant_id_field: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000/export_complete_data".to_string(),
            timeout_secs: 120,
            file_field: "screen_recording".to_string(),
            trial_type_field: "trial_type".to_string(),
            participant_id_field: "participant_id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database holding undelivered recordings
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/pending-recordings.db"),
        }
    }
}

/// Display capture preferences
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub ideal_frame_rate: u32,
    pub max_frame_rate: u32,

    /// Preferred container/codec strings, most preferred first
    pub mime_types: Vec<String>,

    /// Interval of the diagnostic "still recording" log line
    pub liveness_interval_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ideal_width: 1920,
            ideal_height: 1080,
            max_width: 3840,
            max_height: 2160,
            ideal_frame_rate: 15,
            max_frame_rate: 30,
            mime_types: vec![
                "video/webm;codecs=vp9".to_string(),
                "video/webm;codecs=vp8".to_string(),
                "video/webm".to_string(),
                "video/mp4".to_string(),
            ],
            liveness_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Primary upload attempts per delivery before falling back
    pub max_primary_attempts: u32,
    /// Backoff between primary attempts, multiplied by the attempt number
    pub retry_backoff_ms: u64,
    /// Attempts at writing an artifact to the pending store
    pub persist_attempts: u32,
    /// Write undeliverable artifacts to `fallback_dir` for manual recovery
    pub local_fallback: bool,
    pub fallback_dir: PathBuf,
    /// Largest payload the teardown beacon will try to send
    pub beacon_max_bytes: Option<usize>,
    /// How long a teardown waits for initiated sends before the process exits
    pub beacon_grace_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_primary_attempts: 2,
            retry_backoff_ms: 500,
            persist_attempts: 3,
            local_fallback: true,
            fallback_dir: PathBuf::from("data/recovered"),
            beacon_max_bytes: None,
            beacon_grace_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub visibility_policy: VisibilityPolicy,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CAPTURE_RELAY").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
