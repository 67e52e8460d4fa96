//! Delivery of finished recordings to the collection endpoint
//!
//! - `uploader`: strategy selection and the drain-on-load sweep
//! - `transport`: the HTTP client behind the primary and teardown sends
//! - `multipart`: form-data encoding
//! - `fallback`: local files for manual recovery

mod fallback;
mod multipart;
mod transport;
mod uploader;

pub use fallback::LocalFileSink;
pub use transport::{HttpTransport, TransportResponse, UploadForm, UploadTransport};
pub use uploader::{
    linear_backoff, Acknowledgment, DeliveryOutcome, DeliveryUploader, DrainReport, TeardownOutcome,
};
