//! Page lifecycle handling
//!
//! Impending-close and final-unload signals stop any active recording and
//! flush the pending store through the teardown-safe send. Visibility loss
//! follows `VisibilityPolicy`.

mod coordinator;
mod signal;

pub use coordinator::{DeliveryPipeline, LifecycleCoordinator, LifecycleListener, TeardownReport};
pub use signal::{PageSignal, VisibilityPolicy};
