//! Error types for the capture and delivery pipeline
//!
//! Capture-side errors surface to the caller of `start()`. Store and
//! transport errors are consumed inside the delivery path and only show up
//! in logs and in the pending store.

use thiserror::Error;

/// Failures reported to the caller of the recorder control surface
#[derive(Error, Debug)]
pub enum RecorderError {
    /// The user denied or cancelled capture, or no display is available
    #[error("screen capture could not be acquired: {0}")]
    Acquisition(String),

    /// The platform recorder failed while starting
    #[error("media recorder fault: {0}")]
    RecorderFault(String),

    #[error("a recording is already in progress")]
    AlreadyActive,

    /// Participant or trial context was not supplied before `start()`
    #[error("missing recording context: {0}")]
    MissingContext(&'static str),
}

/// Pending store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("metadata encoding error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pending store unavailable: {0}")]
    Unavailable(String),
}

/// Upload transport failures; every variant is retryable
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),
}

pub type StoreResult<T> = Result<T, StoreError>;
