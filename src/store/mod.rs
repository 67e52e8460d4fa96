//! Durable queue of recordings that still need to leave this device
//!
//! The store is the single source of truth for pending deliveries: the
//! uploader never tracks pending state itself, it only reads and deletes.

mod record;
mod sqlite;

pub use record::{upload_filename, PendingRecording, RecordingMetadata};
pub use sqlite::SqlitePendingStore;

use bytes::Bytes;

use crate::error::StoreResult;

#[async_trait::async_trait]
pub trait PendingStore: Send + Sync {
    /// Durably persist an artifact and return its store-assigned id
    async fn put(&self, payload: Bytes, metadata: RecordingMetadata) -> StoreResult<i64>;

    /// Every undelivered entry
    async fn list_all(&self) -> StoreResult<Vec<PendingRecording>>;

    /// Delete an entry; removing a missing id is not an error
    async fn remove(&self, id: i64) -> StoreResult<()>;

    async fn count(&self) -> StoreResult<usize>;
}
