// Integration tests for the SQLite pending store
//
// These tests verify that queued recordings survive reopening the database
// and that removal is idempotent.

mod common;

use anyhow::Result;
use bytes::Bytes;
use capture_relay::{PendingStore, SqlitePendingStore};
use tempfile::TempDir;

#[tokio::test]
async fn test_put_then_list_returns_entry() -> Result<()> {
    let store = SqlitePendingStore::open_in_memory()?;
    let metadata = common::metadata("P-1");

    let id = store.put(Bytes::from_static(b"webm-bytes"), metadata.clone()).await?;

    let pending = store.list_all().await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].payload.as_ref(), b"webm-bytes");
    assert_eq!(pending[0].metadata, metadata);

    Ok(())
}

#[tokio::test]
async fn test_ids_are_unique() -> Result<()> {
    let store = SqlitePendingStore::open_in_memory()?;

    let a = store.put(Bytes::from_static(b"a"), common::metadata("P-1")).await?;
    let b = store.put(Bytes::from_static(b"b"), common::metadata("P-1")).await?;
    store.remove(b).await?;
    let c = store.put(Bytes::from_static(b"c"), common::metadata("P-1")).await?;

    assert_ne!(a, b);
    assert_ne!(b, c, "ids are never reused");
    assert_eq!(store.count().await?, 2);

    Ok(())
}

#[tokio::test]
async fn test_remove_is_idempotent() -> Result<()> {
    let store = SqlitePendingStore::open_in_memory()?;
    let id = store.put(Bytes::from_static(b"x"), common::metadata("P-2")).await?;

    store.remove(id).await?;
    store.remove(id).await?;
    store.remove(9999).await?;

    assert!(store.list_all().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_entries_survive_reopen() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("nested").join("pending.db");

    let kept = {
        let store = SqlitePendingStore::open(&path).await?;
        let kept = store.put(Bytes::from(vec![7u8; 4096]), common::metadata("P-3")).await?;
        let gone = store.put(Bytes::from(vec![8u8; 10]), common::metadata("P-4")).await?;
        store.remove(gone).await?;
        kept
    };

    let reopened = SqlitePendingStore::open(&path).await?;
    let pending = reopened.list_all().await?;

    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, kept);
    assert_eq!(pending[0].payload.len(), 4096);
    assert_eq!(pending[0].metadata.participant_id, "P-3");
    assert_eq!(reopened.get(kept).await?.map(|r| r.id), Some(kept));

    Ok(())
}

#[tokio::test]
async fn test_empty_payload_is_rejected() -> Result<()> {
    let store = SqlitePendingStore::open_in_memory()?;

    assert!(store.put(Bytes::new(), common::metadata("P-5")).await.is_err());
    assert_eq!(store.count().await?, 0);

    Ok(())
}
