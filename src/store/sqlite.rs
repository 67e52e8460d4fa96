//! Pending recordings stored in SQLite
//!
//! One row per undelivered artifact. Rows are only ever inserted and
//! deleted; each statement is its own transaction, so a crash leaves either
//! the whole record or nothing.

use bytes::Bytes;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::record::{PendingRecording, RecordingMetadata};
use super::PendingStore;
use crate::error::{StoreError, StoreResult};

pub struct SqlitePendingStore {
    path: Option<PathBuf>,
    db: Arc<Mutex<Connection>>,
}

impl SqlitePendingStore {
    /// Open (or create) the store at `path`
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&path)?;
        let store = Self::with_connection(conn, Some(path))?;

        info!(
            "Pending store opened at {:?} ({} queued)",
            store.path,
            store.count().await?
        );

        Ok(store)
    }

    /// Store that lives only as long as the process
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        debug!("Pending store journal mode: {}", mode);

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS pending_recordings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload BLOB NOT NULL,
                metadata TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        Ok(Self {
            path,
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Fetch a single entry by id
    pub async fn get(&self, id: i64) -> StoreResult<Option<PendingRecording>> {
        let db = self.db.lock().await;
        let row = db
            .query_row(
                "SELECT id, payload, metadata FROM pending_recordings WHERE id = ?",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(decode_row).transpose()
    }
}

fn decode_row((id, payload, metadata): (i64, Vec<u8>, String)) -> StoreResult<PendingRecording> {
    Ok(PendingRecording {
        id,
        payload: Bytes::from(payload),
        metadata: serde_json::from_str(&metadata)?,
    })
}

#[async_trait::async_trait]
impl PendingStore for SqlitePendingStore {
    async fn put(&self, payload: Bytes, metadata: RecordingMetadata) -> StoreResult<i64> {
        if payload.is_empty() {
            return Err(StoreError::Unavailable("refusing to queue an empty payload".to_string()));
        }

        let encoded = serde_json::to_string(&metadata)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO pending_recordings (payload, metadata, created_at) VALUES (?, ?, ?)",
            params![&payload[..], encoded, Utc::now().timestamp_millis()],
        )?;
        let id = db.last_insert_rowid();

        info!(
            "Queued recording {} ({} bytes, {})",
            id,
            payload.len(),
            metadata.filename
        );

        Ok(id)
    }

    async fn list_all(&self) -> StoreResult<Vec<PendingRecording>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT id, payload, metadata FROM pending_recordings ORDER BY id")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(decode_row).collect()
    }

    async fn remove(&self, id: i64) -> StoreResult<()> {
        let db = self.db.lock().await;
        let removed = db.execute("DELETE FROM pending_recordings WHERE id = ?", params![id])?;

        if removed == 0 {
            debug!("Recording {} already removed", id);
        } else {
            info!("Removed delivered recording {}", id);
        }

        Ok(())
    }

    async fn count(&self) -> StoreResult<usize> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM pending_recordings", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
