//! Content pipeline: everything derived from a file's bytes rather than
//! its metadata row. `ContentService` orchestrates EXIF extraction,
//! perceptual-hash fingerprinting, and thumbnail generation; it is the one
//! place that actually reads blob bytes for anything other than a direct
//! download.

pub mod dhash;
pub mod metadata;
pub mod thumbnail;

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::Configuration;
use crate::core::FileCore;
use crate::db::Handle;
use crate::domain::File;
use crate::error::{CoreError, CoreResult};
use crate::object_store::ObjectStore;
use crate::path::Path;
use crate::repository;
use thumbnail::ThumbnailService;

pub struct ContentService {
    core: Arc<FileCore>,
    store: Arc<dyn ObjectStore>,
    db: Arc<Handle>,
    thumbnails: Arc<ThumbnailService>,
    config: Configuration,
}

impl ContentService {
    pub fn new(
        core: Arc<FileCore>,
        store: Arc<dyn ObjectStore>,
        db: Arc<Handle>,
        thumbnails: Arc<ThumbnailService>,
        config: Configuration,
    ) -> Self {
        ContentService { core, store, db, thumbnails, config }
    }

    /// Run the full pipeline against an already-uploaded file: EXIF, dHash
    /// (images only), thumbnails. Best-effort per stage -- a fingerprint
    /// collision or a thumbnail failure doesn't roll back the others.
    pub async fn process(&self, ns: &str, path: &Path) -> CoreResult<()> {
        let file = self.core.get_by_path(ns, path).await?;
        if file.is_folder() {
            return Ok(());
        }
        let mut reader = self.store.download(ns, camino::Utf8Path::new(path.as_str())).await?;
        let mut bytes = Vec::with_capacity(file.size.max(0) as usize);
        reader.read_to_end(&mut bytes).await.map_err(crate::error::CoreError::from)?;
        self.process_bytes(ns, &file, &bytes).await
    }

    async fn process_bytes(&self, ns: &str, file: &File, bytes: &[u8]) -> CoreResult<()> {
        let file_id = file.id;
        if let Some(meta) = {
            let bytes = bytes.to_vec();
            tokio::task::spawn_blocking(move || metadata::extract(file_id, &bytes)).await.unwrap_or(None)
        } {
            self.db.atomic(self.config.db_retry_attempts, |tx| repository::content_meta::save(tx, &meta))?;
        }

        if ThumbnailService::is_supported(&file.media_type) && file.media_type != crate::mediatype::APPLICATION_PDF {
            let decoded = {
                let bytes = bytes.to_vec();
                tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
                    .await
                    .map_err(|e| crate::error::CoreError::Internal(anyhow::Error::new(e)))?
            };
            if let Ok(img) = decoded {
                let fp = dhash::compute(file_id, &img);
                let ns_owned = ns.to_string();
                let path_owned = file.path.clone();
                match self.db.atomic(self.config.db_retry_attempts, |tx| repository::fingerprint::save(tx, &ns_owned, &path_owned, &fp)) {
                    Ok(_) => {}
                    Err(crate::error::CoreError::FingerprintAlreadyExists { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        if file.size <= self.config.max_thumbnailable_size.as_u64() as i64 {
            match self.thumbnails.generate_thumbnails(bytes.to_vec(), &file.media_type, &file.content_hash).await {
                Ok(()) | Err(CoreError::ThumbnailUnavailable { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Generate thumbnails directly from already-known bytes, bypassing the
    /// object-store read and EXIF/dHash stages. Used by the worker's
    /// standalone thumbnail-generation job, where the caller already has
    /// the content in hand.
    pub async fn thumbnails_for(&self, content: Vec<u8>, media_type: &str, content_hash: &str) -> CoreResult<()> {
        self.thumbnails.generate_thumbnails(content, media_type, content_hash).await
    }

    /// Fire-and-forget variant for callers on a request path that shouldn't
    /// block on thumbnail/EXIF work (e.g. right after `FileCore::create_file`
    /// returns). Failures are logged, not propagated -- there's no caller
    /// left to propagate them to.
    pub fn process_async(self: &Arc<Self>, ns: String, path: Path) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.process(&ns, &path).await {
                tracing::warn!(error = %e, ns = %ns, path = %path, "content processing failed");
            }
        });
    }

    /// Re-run the pipeline for every file under `path`, recomputing content
    /// hashes along the way. Files are walked in batches of at most 500 (as
    /// the full tree under `path` may be too large to hold in one
    /// transaction's worth of updates), and within each batch per-file work
    /// (blob read, dHash, EXIF, thumbnails) runs inside a bounded task
    /// group sized to the number of cores, rather than one file at a time.
    /// Used after [`FileCore::reindex`], which rebuilds the metadata tree
    /// but leaves `content_hash` empty.
    pub async fn reindex_contents(self: &Arc<Self>, ns: &str, path: &Path) -> CoreResult<()> {
        let ns_owned = ns.to_string();
        let path_owned = path.clone();
        let mut files = self
            .db
            .atomic(self.config.db_retry_attempts, |tx| repository::file::list_with_prefix_recursive(tx, &ns_owned, &path_owned))?;
        if let Ok(anchor) = self.core.get_by_path(ns, path).await {
            files.push(anchor);
        }
        let files: Vec<File> = files.into_iter().filter(|f| !f.is_folder()).collect();

        let concurrency = num_cpus::get().max(1);
        for chunk in files.chunks(500) {
            let limit = Arc::new(Semaphore::new(concurrency));
            let tasks = chunk.iter().cloned().map(|file| {
                let this = Arc::clone(self);
                let ns = ns.to_string();
                let limit = Arc::clone(&limit);
                async move {
                    let _permit = limit.acquire_owned().await.expect("semaphore is never closed");
                    anyhow::Result::<Option<(Uuid, String)>>::Ok(this.reindex_one(&ns, file).await)
                }
            });
            let chashes: Vec<(Uuid, String)> =
                crate::concurrently::map_concurrently(tasks).await.map_err(CoreError::Internal)?.into_iter().flatten().collect();
            if !chashes.is_empty() {
                self.db.atomic(self.config.db_retry_attempts, |tx| repository::file::set_chash_batch(tx, &chashes))?;
            }
        }
        Ok(())
    }

    /// Read `file`'s blob, hash it, and run it through [`Self::process_bytes`].
    /// Failures are logged and treated as "nothing to contribute to this
    /// batch's content-hash update" rather than aborting the whole reindex.
    async fn reindex_one(&self, ns: &str, file: File) -> Option<(Uuid, String)> {
        let mut reader = match self.store.download(ns, camino::Utf8Path::new(file.path.as_str())).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, path = %file.path, "reindex: couldn't read blob, skipping content");
                return None;
            }
        };
        let mut bytes = Vec::with_capacity(file.size.max(0) as usize);
        if let Err(e) = reader.read_to_end(&mut bytes).await {
            tracing::warn!(error = %e, path = %file.path, "reindex: couldn't read blob, skipping content");
            return None;
        }

        let hash = {
            let bytes = bytes.clone();
            tokio::task::spawn_blocking(move || crate::hashing::content_hash(&bytes)).await.ok()?
        };

        if let Err(e) = self.process_bytes(ns, &file, &bytes).await {
            tracing::warn!(error = %e, path = %file.path, "reindex: content processing failed");
        }
        Some((file.id, hash))
    }
}
