use crate::lifecycle::LifecycleCoordinator;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Recorder control and page lifecycle
    pub coordinator: Arc<LifecycleCoordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<LifecycleCoordinator>) -> Self {
        Self { coordinator }
    }
}
