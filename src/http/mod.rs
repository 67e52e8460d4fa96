//! HTTP control surface for the host page
//!
//! This module provides a REST API over the recorder and lifecycle:
//! - POST /recording/start - Start a recording (participant + trial)
//! - POST /recording/stop - Stop the active recording
//! - POST /recording/retry - Retry pending deliveries
//! - GET /recording/status - Recorder state and elapsed time
//! - GET /pending - Recordings not yet delivered
//! - POST /lifecycle/:signal - Forward a page lifecycle signal
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
