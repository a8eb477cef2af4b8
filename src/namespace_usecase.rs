//! Top-level application operations: everything a caller needs once an
//! owner and a namespace are in scope, composing `FileCore`/`FileService`
//! with quota enforcement, the Trash folder, content reindexing, and
//! duplicate detection. The file tree and mount resolution below this
//! layer know nothing about accounts or quotas; this is where those join.

use std::sync::Arc;

use jiff::Timestamp;
use uuid::Uuid;

use crate::config::Configuration;
use crate::content::ContentService;
use crate::core::FileCore;
use crate::db::Handle;
use crate::dedup::{DuplicateFinderService, DuplicateGroup};
use crate::domain::{Account, AuditAction, AuditEvent, File, FileView, Namespace, TRASH_FOLDER};
use crate::error::{CoreError, CoreResult};
use crate::file_service::FileService;
use crate::path::Path;
use crate::repository;

pub struct NamespaceUseCase {
    files: Arc<FileService>,
    core: Arc<FileCore>,
    content: Arc<ContentService>,
    dedup: Arc<DuplicateFinderService>,
    db: Arc<Handle>,
    config: Configuration,
}

impl NamespaceUseCase {
    pub fn new(
        files: Arc<FileService>,
        core: Arc<FileCore>,
        content: Arc<ContentService>,
        dedup: Arc<DuplicateFinderService>,
        db: Arc<Handle>,
        config: Configuration,
    ) -> Self {
        NamespaceUseCase { files, core, content, dedup, db, config }
    }

    /// Provision a namespace for a newly-registered owner: the `namespaces`
    /// row, an `accounts` row (quota, possibly unlimited), and the root
    /// folder plus its `Trash` subfolder -- `FileCore::create_folder`
    /// builds the whole ancestor chain in one call, so asking it for
    /// `Trash` also materializes the root row, since the root has no
    /// dedicated creation path of its own.
    pub async fn create_namespace(&self, ns_path: &str, owner_id: Uuid, storage_quota: Option<i64>) -> CoreResult<Namespace> {
        let ns = Namespace { id: Uuid::new_v4(), path: ns_path.to_string(), owner_id };
        let saved = self.db.atomic(self.config.db_retry_attempts, |tx| {
            let saved = repository::namespace::save(tx, &ns)?;
            repository::account::save(tx, &Account { user_id: owner_id, storage_quota })?;
            Ok(saved)
        })?;
        match self.core.create_folder(ns_path, &Path::new(TRASH_FOLDER)).await {
            Ok(_) | Err(CoreError::AlreadyExists { .. }) => {}
            Err(e) => return Err(e),
        }
        Ok(saved)
    }

    /// Upload `content` to `path`, enforcing the per-upload size limit and
    /// the owner's storage quota (if any) before writing anything, then
    /// kicking off content processing (EXIF/dHash/thumbnails)
    /// asynchronously -- the caller gets the file back as soon as its
    /// bytes are durable, not once thumbnails exist.
    pub async fn add_file(&self, ns: &str, path: &Path, content: Vec<u8>) -> CoreResult<File> {
        if is_trash_or_below(path) {
            return Err(CoreError::MalformedPath { reason: "can't upload directly into Trash".into() });
        }
        if content.len() as u64 > self.config.upload_size_limit.as_u64() {
            return Err(CoreError::TooLarge { path: path.as_str().into() });
        }

        let ns_owned = ns.to_string();
        let namespace = self
            .db
            .atomic(self.config.db_retry_attempts, |tx| repository::namespace::get_by_path(tx, &ns_owned))?
            .ok_or_else(|| CoreError::not_found(ns))?;
        if let Some(account) = self.db.atomic(self.config.db_retry_attempts, |tx| repository::account::get(tx, namespace.owner_id))? {
            if let Some(quota) = account.storage_quota {
                let used = self.core.get_by_path(ns, &Path::root()).await.map(|f| f.size).unwrap_or(0);
                if used + content.len() as i64 > quota {
                    return Err(CoreError::StorageQuotaExceeded);
                }
            }
        }

        let file = self.core.create_file(ns, path, content).await?;
        self.record(ns, AuditAction::Create, &file.path).await?;
        self.content.process_async(ns.to_string(), file.path.clone());
        Ok(file)
    }

    pub async fn delete_item(&self, ns: &str, path: &Path) -> CoreResult<FileView> {
        if path.is_root() || is_trash_or_below(path) {
            return Err(CoreError::MalformedPath { reason: "can't delete the root or Trash itself".into() });
        }
        let view = self.files.delete(ns, path).await?;
        self.record(ns, AuditAction::Delete, path).await?;
        Ok(view)
    }

    pub async fn move_item(&self, ns: &str, at_path: &Path, to_ns: &str, to_path: &Path) -> CoreResult<FileView> {
        if at_path.is_root() || is_exactly_trash(at_path) {
            return Err(CoreError::MalformedPath { reason: "can't move the root or Trash itself".into() });
        }
        let view = self.files.r#move(ns, at_path, to_ns, to_path).await?;
        self.record(ns, AuditAction::Move, at_path).await?;
        Ok(view)
    }

    /// Move `path` into `Trash`, renaming on a collision by appending a
    /// microsecond timestamp to the stem rather than the usual
    /// `"(N)"` free-name suffix -- trashed items don't need a
    /// human-legible disambiguator, just a unique one.
    pub async fn move_item_to_trash(&self, ns: &str, path: &Path) -> CoreResult<FileView> {
        let trash = Path::new(TRASH_FOLDER);
        match self.core.create_folder(ns, &trash).await {
            Ok(_) | Err(CoreError::AlreadyExists { .. }) => {}
            Err(e) => return Err(e),
        }

        let mut target = trash.join(path.name());
        if self.core.exists_at_path(ns, &target).await? {
            let micros = Timestamp::now().as_microsecond();
            let stem = target.stem().to_string();
            let suffix = target.suffix();
            target = target.parent().join(&format!("{stem} {micros}{suffix}"));
        }

        let view = self.files.r#move(ns, path, ns, &target).await?;
        self.record(ns, AuditAction::Move, path).await?;
        Ok(view)
    }

    pub async fn empty_trash(&self, ns: &str) -> CoreResult<()> {
        self.core.empty_folder(ns, &Path::new(TRASH_FOLDER)).await
    }

    /// Group duplicate fingerprints under `path`, then hydrate each group's
    /// file ids into full `File` rows (sorted, so identical inputs always
    /// come back in the same order regardless of fingerprint scan order).
    pub async fn find_duplicates(&self, ns: &str, path: &Path) -> CoreResult<Vec<Vec<File>>> {
        let groups = self.dedup.find_in_folder(ns, path).await?;
        let mut out = Vec::with_capacity(groups.len());
        for DuplicateGroup { mut file_ids } in groups {
            file_ids.sort();
            out.push(self.core.get_by_id_batch(&file_ids).await?);
        }
        Ok(out)
    }

    /// Rebuild `path`'s metadata tree from the object store, then
    /// recompute content hashes and re-run the content pipeline across it.
    pub async fn reindex(&self, ns: &str, path: &Path) -> CoreResult<()> {
        self.core.reindex(ns, path).await?;
        self.content.reindex_contents(ns, path).await
    }

    async fn record(&self, ns: &str, action: AuditAction, path: &Path) -> CoreResult<()> {
        let ns = ns.to_string();
        let path = path.clone();
        self.db.atomic(self.config.db_retry_attempts, |tx| {
            repository::audit::record(
                tx,
                &AuditEvent { id: Uuid::new_v4(), ns_path: ns.clone(), action, path: path.clone(), at: Timestamp::now() },
            )
        })
    }
}

fn is_exactly_trash(path: &Path) -> bool {
    path.as_str().eq_ignore_ascii_case(TRASH_FOLDER)
}

fn is_trash_or_below(path: &Path) -> bool {
    path.is_relative_to(&Path::new(TRASH_FOLDER))
}
