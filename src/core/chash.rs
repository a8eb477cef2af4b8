//! Scoped content-hash tracker: accumulates `(file_id, content_hash)` pairs
//! off the hot path (e.g. a reindex walk that's reading blobs anyway) and
//! flushes them as a single batched update on `commit`, rather than one
//! transaction per file.

use std::sync::Mutex;

use uuid::Uuid;

use crate::db::Handle;
use crate::error::CoreResult;
use crate::hashing;
use crate::repository;

pub struct CHashBatch<'a> {
    db: &'a Handle,
    attempts: u32,
    items: Mutex<Vec<(Uuid, String)>>,
}

impl<'a> CHashBatch<'a> {
    pub(crate) fn new(db: &'a Handle, attempts: u32) -> Self {
        CHashBatch { db, attempts, items: Mutex::new(Vec::new()) }
    }

    /// Hash `content` off the calling task (CPU-bound work runs in the
    /// blocking pool) and stage the result for the eventual `commit`.
    pub async fn add(&self, file_id: Uuid, content: Vec<u8>) {
        let hash = tokio::task::spawn_blocking(move || hashing::content_hash(&content))
            .await
            .unwrap_or_default();
        self.items.lock().unwrap().push((file_id, hash));
    }

    /// Flush every staged `(file_id, content_hash)` pair in one transaction.
    pub fn commit(self) -> CoreResult<()> {
        let items = self.items.into_inner().unwrap();
        if items.is_empty() {
            return Ok(());
        }
        self.db.atomic(self.attempts, |tx| repository::file::set_chash_batch(tx, &items))
    }
}
