//! Screen recording lifecycle
//!
//! This module provides the `ScreenRecorder` state machine that manages:
//! - Display stream acquisition and codec selection
//! - Fragment collection until the recorder confirms its flush
//! - Persisting the finished artifact before handing it to the uploader
//! - Releasing capture resources regardless of delivery outcome

mod config;
mod recorder;
mod stats;

pub use config::TrialContext;
pub use recorder::{ScreenRecorder, SessionReport, StopReason};
pub use stats::{format_elapsed, RecorderState, RecorderStatus};
