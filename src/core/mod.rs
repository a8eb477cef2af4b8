//! The transactional heart: every mutation to the file tree goes through
//! `FileCore`, which pairs one `db::Handle::atomic` block (metadata) with
//! calls into an `ObjectStore` (blobs), in an order chosen so a crash
//! between the two leaves the metadata tree as the source of truth --
//! an orphan blob is cheap to garbage-collect later, a dangling row
//! pointing at a missing blob is not.

pub mod chash;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use camino::Utf8Path;
use jiff::Timestamp;
use regex::RegexBuilder;
use uuid::Uuid;

use crate::config::Configuration;
use crate::db::Handle;
use crate::domain::{File, FilePendingDeletion};
use crate::error::{CoreError, CoreResult};
use crate::mediatype;
use crate::object_store::{BoxedReader, ObjectStore};
use crate::path::Path;
use crate::repository;

pub use chash::CHashBatch;

pub struct FileCore {
    db: Arc<Handle>,
    store: Arc<dyn ObjectStore>,
    config: Configuration,
}

impl FileCore {
    pub fn new(db: Arc<Handle>, store: Arc<dyn ObjectStore>, config: Configuration) -> Self {
        FileCore { db, store, config }
    }

    pub fn chash_batch(&self) -> CHashBatch<'_> {
        CHashBatch::new(&self.db, self.config.db_retry_attempts)
    }

    pub async fn get_by_path(&self, ns: &str, path: &Path) -> CoreResult<File> {
        self.get_by_path_opt(ns, path).await?.ok_or_else(|| CoreError::not_found(path.as_str()))
    }

    async fn get_by_path_opt(&self, ns: &str, path: &Path) -> CoreResult<Option<File>> {
        let ns = ns.to_string();
        let path = path.clone();
        self.db.atomic(self.config.db_retry_attempts, |tx| repository::file::get_by_path(tx, &ns, &path))
    }

    pub async fn get_by_id(&self, id: Uuid) -> CoreResult<File> {
        self.db
            .atomic(self.config.db_retry_attempts, |tx| repository::file::get_by_id(tx, id))?
            .ok_or_else(|| CoreError::not_found(id.to_string()))
    }

    pub async fn get_by_id_batch(&self, ids: &[Uuid]) -> CoreResult<Vec<File>> {
        let ids = ids.to_vec();
        self.db.atomic(self.config.db_retry_attempts, |tx| repository::file::get_by_id_batch(tx, &ids))
    }

    pub async fn exists_at_path(&self, ns: &str, path: &Path) -> CoreResult<bool> {
        Ok(self.get_by_path_opt(ns, path).await?.is_some())
    }

    pub async fn exists_with_id(&self, id: Uuid) -> CoreResult<bool> {
        self.db.atomic(self.config.db_retry_attempts, |tx| repository::file::exists_with_id(tx, id))
    }

    pub async fn list_folder(&self, ns: &str, path: &Path) -> CoreResult<Vec<File>> {
        let folder = self.get_by_path(ns, path).await?;
        if !folder.is_folder() {
            return Err(CoreError::NotADirectory { path: path.as_str().into() });
        }
        let ns = ns.to_string();
        let path = path.clone();
        self.db.atomic(self.config.db_retry_attempts, |tx| repository::file::list_with_prefix(tx, &ns, &path))
    }

    /// A free name at `path`: `path` itself if nothing's there yet,
    /// otherwise `"{stem} (N){suffix}"` for the smallest unused `N`.
    pub async fn get_available_path(&self, ns: &str, path: &Path) -> CoreResult<Path> {
        if !self.exists_at_path(ns, path).await? {
            return Ok(path.clone());
        }
        let full = path.as_str();
        let suffix = path.suffix();
        let full_stem = &full[..full.len() - suffix.len()];
        let pattern_src = format!("^{} \\([0-9]+\\){}$", regex::escape(full_stem), regex::escape(&suffix));
        let pattern = RegexBuilder::new(&pattern_src)
            .case_insensitive(true)
            .build()
            .map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
        let ns_owned = ns.to_string();
        let count = self
            .db
            .atomic(self.config.db_retry_attempts, |tx| repository::file::count_by_path_pattern(tx, &ns_owned, &pattern))?;
        Ok(Path::new(format!("{full_stem} ({}){suffix}", count + 1)))
    }

    /// Create a new file at (an available name near) `path`. The parent
    /// folder is created on demand if missing; an existing non-folder
    /// parent is `NotADirectory`.
    pub async fn create_file(&self, ns: &str, path: &Path, content: Vec<u8>) -> CoreResult<File> {
        let parent_path = path.parent();
        match self.get_by_path_opt(ns, &parent_path).await? {
            None => match self.create_folder(ns, &parent_path).await {
                Ok(_) => {}
                Err(CoreError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e),
            },
            Some(f) if !f.is_folder() => {
                return Err(CoreError::NotADirectory { path: parent_path.as_str().into() });
            }
            Some(_) => {}
        }

        let resolved = self.get_available_path(ns, path).await?;
        let head_len = content.len().min(512);
        let media_type = mediatype::guess(&content[..head_len], Some(resolved.name()));

        let content_hash = {
            let bytes = content.clone();
            tokio::task::spawn_blocking(move || crate::hashing::content_hash(&bytes))
                .await
                .map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?
        };

        let reader: BoxedReader = Box::pin(std::io::Cursor::new(content));
        let outcome = self.store.save(ns, Utf8Path::new(resolved.as_str()), reader).await?;

        let file = File {
            id: Uuid::new_v4(),
            ns_path: ns.to_string(),
            name: resolved.name().to_string(),
            path: resolved.clone(),
            size: outcome.size as i64,
            content_hash,
            media_type,
            modified_at: Timestamp::now(),
        };

        let ancestors = resolved.parents();
        let size = file.size;
        self.db.atomic(self.config.create_file_retry_attempts, |tx| {
            let saved = repository::file::save(tx, &file)?;
            repository::file::incr_size_batch(tx, ns, &ancestors, size)?;
            Ok(saved)
        })
    }

    /// Create `path` and every missing ancestor, preserving the casing of
    /// whichever deepest prefix already existed. `AlreadyExists` if `path`
    /// itself is already there; `NotADirectory` if any existing prefix is
    /// a file.
    pub async fn create_folder(&self, ns: &str, path: &Path) -> CoreResult<File> {
        let mut chain: Vec<Path> = path.parents();
        chain.reverse();
        chain.push(path.clone());

        let mut existing: Vec<Option<File>> = Vec::with_capacity(chain.len());
        for p in &chain {
            existing.push(self.get_by_path_opt(ns, p).await?);
        }

        if existing.iter().flatten().any(|f| !f.is_folder()) {
            return Err(CoreError::NotADirectory { path: path.as_str().into() });
        }

        let deepest_idx = existing.iter().rposition(|f| f.is_some());
        if let Some(idx) = deepest_idx {
            if chain[idx] == *path {
                return Err(CoreError::already_exists(path.as_str()));
            }
        }

        let start_idx = deepest_idx.map(|i| i + 1).unwrap_or(0);
        let mut restored: Vec<Path> = chain.clone();
        if let Some(idx) = deepest_idx {
            let base = existing[idx].as_ref().unwrap().path.clone();
            restored[idx] = base.clone();
            let mut prev = base;
            for r in restored.iter_mut().take(chain.len()).skip(idx + 1) {
                prev = prev.join(r.name());
                *r = prev.clone();
            }
        }

        let deepest_new = restored.last().unwrap().clone();
        self.store.make_dirs(ns, Utf8Path::new(deepest_new.as_str())).await?;

        let mut to_create = Vec::new();
        for p in restored.iter().skip(start_idx) {
            to_create.push(File {
                id: Uuid::new_v4(),
                ns_path: ns.to_string(),
                name: p.name().to_string(),
                path: p.clone(),
                size: 0,
                content_hash: String::new(),
                media_type: mediatype::FOLDER.to_string(),
                modified_at: Timestamp::now(),
            });
        }

        self.db.atomic(self.config.db_retry_attempts, |tx| repository::file::save_batch(tx, &to_create))?;

        self.get_by_path(ns, &deepest_new).await
    }

    /// Delete one file or folder (recursively) immediately: metadata is
    /// gone in this call, but the blob purge happens right after rather
    /// than deferring through the pending-deletion queue. Use
    /// [`FileCore::delete_batch`] when the caller wants that durability.
    pub async fn delete(&self, ns: &str, path: &Path) -> CoreResult<File> {
        let ns_owned = ns.to_string();
        let path_owned = path.clone();
        let (deleted, is_folder) = self.db.atomic(self.config.db_retry_attempts, |tx| {
            let existing = repository::file::get_by_path(tx, &ns_owned, &path_owned)?
                .ok_or_else(|| CoreError::not_found(path_owned.as_str()))?;
            repository::file::delete(tx, &ns_owned, &path_owned)?;
            if existing.is_folder() {
                repository::file::delete_all_with_prefix(tx, &ns_owned, &path_owned)?;
            }
            repository::file::incr_size_batch(tx, &ns_owned, &path_owned.parents(), -existing.size)?;
            let is_folder = existing.is_folder();
            Ok((existing, is_folder))
        })?;

        let cpath_buf = camino::Utf8PathBuf::from(deleted.path.as_str());
        let result = if is_folder {
            self.store.delete_dir(ns, &cpath_buf).await
        } else {
            self.store.delete(ns, &cpath_buf).await
        };
        match result {
            Ok(()) => {}
            Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        Ok(deleted)
    }

    /// Delete every listed path's metadata in one transaction and enqueue a
    /// [`crate::domain::FilePendingDeletion`] per removed row (the
    /// requested root and, for folders, every descendant) so the blob purge
    /// can happen later, off this call's critical path.
    pub async fn delete_batch(&self, ns: &str, paths: &[Path]) -> CoreResult<Vec<File>> {
        let ns_owned = ns.to_string();
        let paths_owned = paths.to_vec();
        self.db.atomic(self.config.db_retry_attempts, |tx| {
            let mut roots = Vec::new();
            let now = Timestamp::now();
            for path in &paths_owned {
                let Some(existing) = repository::file::get_by_path(tx, &ns_owned, path)? else {
                    continue;
                };
                repository::file::delete(tx, &ns_owned, path)?;
                let mut removed = vec![existing.clone()];
                if existing.is_folder() {
                    removed.extend(repository::file::delete_all_with_prefix(tx, &ns_owned, path)?);
                }
                repository::file::incr_size_batch(tx, &ns_owned, &path.parents(), -existing.size)?;

                for f in &removed {
                    repository::pending_deletion::enqueue(
                        tx,
                        &FilePendingDeletion {
                            id: Uuid::new_v4(),
                            ns_path: ns_owned.clone(),
                            path: f.path.clone(),
                            content_hash: f.content_hash.clone(),
                            media_type: f.media_type.clone(),
                            created_at: now,
                        },
                    )?;
                }
                roots.push(existing);
            }
            Ok(roots)
        })
    }

    /// Empty a folder in place: delete every descendant row and blob, but
    /// keep the folder itself.
    pub async fn empty_folder(&self, ns: &str, path: &Path) -> CoreResult<()> {
        let folder = self.get_by_path(ns, path).await?;
        if !folder.is_folder() {
            return Err(CoreError::NotADirectory { path: path.as_str().into() });
        }
        if folder.size == 0 {
            return Ok(());
        }
        let ns_owned = ns.to_string();
        let path_owned = path.clone();
        let ancestors: Vec<Path> = std::iter::once(path.clone()).chain(path.parents()).collect();
        self.db.atomic(self.config.db_retry_attempts, |tx| {
            repository::file::delete_all_with_prefix(tx, &ns_owned, &path_owned)?;
            repository::file::incr_size_batch(tx, &ns_owned, &ancestors, -folder.size)?;
            Ok(())
        })?;
        self.store.empty_dir(ns, Utf8Path::new(path.as_str())).await?;
        Ok(())
    }

    /// Move (and/or rename) `at_path` in `at_ns` to `to_path` in `to_ns`.
    /// Moving a path to itself or into its own subtree is `MalformedPath`
    /// unless it's purely a case-only rename.
    pub async fn r#move(&self, at_ns: &str, at_path: &Path, to_ns: &str, to_path: &Path) -> CoreResult<File> {
        let same_ns = at_ns == to_ns;
        let case_only_rename = at_path.as_str() != to_path.as_str() && at_path == to_path;
        if same_ns && to_path.is_relative_to(at_path) && !case_only_rename {
            return Err(CoreError::MalformedPath { reason: "can't move a path into itself".into() });
        }

        let src = self.get_by_path(at_ns, at_path).await?;
        let dest_parent_path = to_path.parent();
        let dest_parent = self
            .get_by_path_opt(to_ns, &dest_parent_path)
            .await?
            .ok_or_else(|| CoreError::MissingParent { path: to_path.as_str().into() })?;
        if !dest_parent.is_folder() {
            return Err(CoreError::NotADirectory { path: dest_parent_path.as_str().into() });
        }

        if let Some(existing) = self.get_by_path_opt(to_ns, to_path).await? {
            if !(same_ns && existing.id == src.id) {
                return Err(CoreError::already_exists(to_path.as_str()));
            }
        }

        let new_name = to_path.name().to_string();
        let final_path = dest_parent.path.join(&new_name);

        let from_cpath = camino::Utf8PathBuf::from(src.path.as_str());
        let to_cpath = camino::Utf8PathBuf::from(final_path.as_str());
        if src.is_folder() {
            self.store.move_dir(at_ns, &from_cpath, to_ns, &to_cpath).await?;
        } else {
            self.store.r#move(at_ns, &from_cpath, to_ns, &to_cpath).await?;
        }

        let src_parents = src.path.parents();
        let final_parents = final_path.parents();
        let (dec, inc): (Vec<Path>, Vec<Path>) = if same_ns {
            let dst_set: HashSet<String> = final_parents.iter().map(|p| p.as_str().to_lowercase()).collect();
            let src_set: HashSet<String> = src_parents.iter().map(|p| p.as_str().to_lowercase()).collect();
            let dec = src_parents.iter().filter(|p| !dst_set.contains(&p.as_str().to_lowercase())).cloned().collect();
            let inc = final_parents.iter().filter(|p| !src_set.contains(&p.as_str().to_lowercase())).cloned().collect();
            (dec, inc)
        } else {
            (src_parents.clone(), final_parents.clone())
        };

        let at_ns_owned = at_ns.to_string();
        let to_ns_owned = to_ns.to_string();
        let size = src.size;
        let is_folder = src.is_folder();
        let src_path = src.path.clone();
        let src_id = src.id;
        self.db.atomic(self.config.db_retry_attempts, |tx| {
            let patch = repository::file::FileUpdate {
                ns_path: if same_ns { None } else { Some(to_ns_owned.clone()) },
                name: Some(new_name.clone()),
                path: Some(final_path.clone()),
                content_hash: None,
                size: None,
            };
            let updated = repository::file::update(tx, src_id, &patch)?;
            if is_folder {
                repository::file::replace_path_prefix(tx, &at_ns_owned, &src_path, &to_ns_owned, &final_path)?;
            }
            repository::file::incr_size_batch(tx, &at_ns_owned, &dec, -size)?;
            repository::file::incr_size_batch(tx, &to_ns_owned, &inc, size)?;
            Ok(updated)
        })
    }

    /// Rebuild `path`'s metadata tree from whatever the object store
    /// actually holds: drop every existing descendant row, walk the blob
    /// tree breadth-first, reinsert, and set folder sizes from what was
    /// found. Content hashes and fingerprints are not recomputed here --
    /// that's [`crate::content::ContentService::reindex_contents`]'s job.
    /// Does not re-propagate the new total up past `path` itself.
    pub async fn reindex(&self, ns: &str, path: &Path) -> CoreResult<()> {
        let ns_owned = ns.to_string();
        let path_owned = path.clone();
        self.db
            .atomic(self.config.db_retry_attempts, |tx| repository::file::delete_all_with_prefix(tx, &ns_owned, &path_owned))?;

        let existing_root = self.get_by_path_opt(ns, path).await?;
        if let Some(root) = &existing_root {
            if !root.is_folder() {
                return Err(CoreError::NotADirectory { path: path.as_str().into() });
            }
        }

        let mut folder_sizes: HashMap<String, i64> = HashMap::new();
        let mut new_files: Vec<File> = Vec::new();
        let mut queue: VecDeque<Path> = VecDeque::new();
        queue.push_back(path.clone());

        while let Some(folder) = queue.pop_front() {
            let entries = self.store.iter_dir(ns, Utf8Path::new(folder.as_str())).await?;
            for entry in entries {
                let entry_path = folder.join(&entry.name);
                if entry.is_dir {
                    queue.push_back(entry_path.clone());
                    new_files.push(File {
                        id: Uuid::new_v4(),
                        ns_path: ns.to_string(),
                        name: entry.name.clone(),
                        path: entry_path,
                        size: 0,
                        content_hash: String::new(),
                        media_type: mediatype::FOLDER.to_string(),
                        modified_at: entry.modified_at.unwrap_or_else(Timestamp::now),
                    });
                } else {
                    let mut cursor = entry_path.parent();
                    loop {
                        *folder_sizes.entry(cursor.as_str().to_lowercase()).or_insert(0) += entry.size as i64;
                        if cursor == *path || cursor.is_root() {
                            break;
                        }
                        cursor = cursor.parent();
                    }
                    new_files.push(File {
                        id: Uuid::new_v4(),
                        ns_path: ns.to_string(),
                        name: entry.name.clone(),
                        path: entry_path,
                        size: entry.size as i64,
                        content_hash: String::new(),
                        media_type: mediatype::guess_unsafe(&entry.name),
                        modified_at: entry.modified_at.unwrap_or_else(Timestamp::now),
                    });
                }
            }
        }

        for f in new_files.iter_mut().filter(|f| f.is_folder()) {
            if let Some(sz) = folder_sizes.get(&f.path.as_str().to_lowercase()) {
                f.size = *sz;
            }
        }

        for chunk in new_files.chunks(500) {
            let chunk = chunk.to_vec();
            self.db.atomic(self.config.db_retry_attempts, |tx| repository::file::save_batch(tx, &chunk))?;
        }

        if existing_root.is_none() {
            match self.create_folder(ns, path).await {
                Ok(_) | Err(CoreError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let anchor_size = folder_sizes.get(&path.as_str().to_lowercase()).copied().unwrap_or(0);
        let ns_owned = ns.to_string();
        let path_owned = path.clone();
        self.db.atomic(self.config.db_retry_attempts, |tx| {
            let anchor = repository::file::get_by_path(tx, &ns_owned, &path_owned)?
                .ok_or_else(|| CoreError::not_found(path_owned.as_str()))?;
            repository::file::update(
                tx,
                anchor.id,
                &repository::file::FileUpdate {
                    ns_path: None,
                    name: None,
                    path: None,
                    content_hash: None,
                    size: Some(anchor_size),
                },
            )?;
            Ok(())
        })
    }

    pub async fn download(&self, ns: &str, path: &Path) -> CoreResult<(File, BoxedReader)> {
        let file = self.get_by_path(ns, path).await?;
        if file.is_folder() {
            let reader = self.store.download_dir(ns, Utf8Path::new(path.as_str())).await?;
            return Ok((file, reader));
        }
        let reader = self.store.download(ns, Utf8Path::new(path.as_str())).await?;
        Ok((file, reader))
    }

    /// Work off the durable pending-deletion queue: physically purge each
    /// entry's blob (tolerating it being already gone) and drop the row.
    /// Entries whose blob deletion fails for any other reason are left
    /// queued for the next pass.
    pub async fn process_pending_deletions(&self, limit: i64) -> CoreResult<Vec<FilePendingDeletion>> {
        let pending = self.db.atomic(self.config.db_retry_attempts, |tx| repository::pending_deletion::list_pending(tx, limit))?;
        let mut removed = Vec::with_capacity(pending.len());
        for entry in pending {
            let cpath = camino::Utf8PathBuf::from(entry.path.as_str());
            let result = if entry.media_type == mediatype::FOLDER {
                self.store.delete_dir(&entry.ns_path, &cpath).await
            } else {
                self.store.delete(&entry.ns_path, &cpath).await
            };
            match result {
                Ok(()) => {}
                Err(CoreError::NotFound { .. }) => {}
                Err(e) => {
                    tracing::error!(error = %e, path = %entry.path, "failed to purge pending-deletion blob, leaving queued");
                    continue;
                }
            }
            let id = entry.id;
            self.db.atomic(self.config.db_retry_attempts, |tx| repository::pending_deletion::remove(tx, id))?;
            removed.push(entry);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::object_store::MemoryStore;
    use crate::repository;

    fn setup() -> FileCore {
        let db = Handle::open_in_memory().unwrap();
        repository::init_schema(&db).unwrap();
        FileCore::new(Arc::new(db), Arc::new(MemoryStore::new()), Configuration::default())
    }

    /// Seed scenario 1: creating a nested path creates every missing
    /// ancestor folder and the root's size reflects the new file.
    #[tokio::test]
    async fn create_file_materializes_missing_ancestors() {
        let core = setup();
        let file = core.create_file("u", &Path::new("a/b/f.txt"), b"Dummy file".to_vec()).await.unwrap();
        assert_eq!(file.size, 10);

        let a = core.get_by_path("u", &Path::new("a")).await.unwrap();
        let b = core.get_by_path("u", &Path::new("a/b")).await.unwrap();
        let root = core.get_by_path("u", &Path::root()).await.unwrap();
        assert_eq!(a.size, 10);
        assert_eq!(b.size, 10);
        assert_eq!(root.size, 10);
    }

    /// Seed scenario 2: a second create at the same path gets a free,
    /// suffixed name rather than failing.
    #[tokio::test]
    async fn duplicate_create_gets_a_free_suffixed_name() {
        let core = setup();
        let a = core.create_file("u", &Path::new("f.txt"), b"x".to_vec()).await.unwrap();
        let b = core.create_file("u", &Path::new("f.txt"), b"x".to_vec()).await.unwrap();
        assert_eq!(a.path, Path::new("f.txt"));
        assert_eq!(b.path, Path::new("f (1).txt"));
    }

    /// Seed scenario 3: moving a subtree adjusts the ancestor sizes it
    /// leaves and the ones it joins, without double-counting a shared
    /// parent (`root`).
    #[tokio::test]
    async fn move_rebalances_ancestor_sizes() {
        let core = setup();
        core.create_file("u", &Path::new("a/b/f.txt"), vec![0u8; 10]).await.unwrap();
        core.create_file("u", &Path::new("a/b/c/x.txt"), vec![0u8; 10]).await.unwrap();
        core.create_file("u", &Path::new("a/b/c/y.txt"), vec![0u8; 10]).await.unwrap();
        core.create_file("u", &Path::new("a/g/z.txt"), vec![0u8; 10]).await.unwrap();

        core.r#move("u", &Path::new("a/b/c"), "u", &Path::new("a/g/c")).await.unwrap();

        let root = core.get_by_path("u", &Path::root()).await.unwrap();
        let a = core.get_by_path("u", &Path::new("a")).await.unwrap();
        let b = core.get_by_path("u", &Path::new("a/b")).await.unwrap();
        let g = core.get_by_path("u", &Path::new("a/g")).await.unwrap();
        assert_eq!(root.size, 40);
        assert_eq!(a.size, 40);
        assert_eq!(b.size, 10);
        assert_eq!(g.size, 30);
    }

    /// Seed scenario 4: deleting a folder removes its descendants and
    /// decrements every ancestor by the removed subtree's size, leaving
    /// siblings untouched.
    #[tokio::test]
    async fn delete_folder_removes_descendants_and_shrinks_ancestors() {
        let core = setup();
        core.create_file("u", &Path::new("a/b/f.txt"), vec![0u8; 10]).await.unwrap();

        core.delete("u", &Path::new("a/b")).await.unwrap();

        assert!(core.get_by_path("u", &Path::new("a/b")).await.is_err());
        let a = core.get_by_path("u", &Path::new("a")).await.unwrap();
        let root = core.get_by_path("u", &Path::root()).await.unwrap();
        assert_eq!(a.size, 0);
        assert_eq!(root.size, 0);
    }

    #[tokio::test]
    async fn create_folder_twice_fails_and_does_not_mutate() {
        let core = setup();
        core.create_folder("u", &Path::new("a")).await.unwrap();
        let err = core.create_folder("u", &Path::new("a")).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists { .. }));
        let folder = core.get_by_path("u", &Path::new("a")).await.unwrap();
        assert_eq!(folder.size, 0);
    }

    #[tokio::test]
    async fn move_to_itself_is_malformed() {
        let core = setup();
        core.create_folder("u", &Path::new("a")).await.unwrap();
        let err = core.r#move("u", &Path::new("a"), "u", &Path::new("a/b")).await.unwrap_err();
        assert!(matches!(err, CoreError::MalformedPath { .. }));
    }

    #[tokio::test]
    async fn reindex_rebuilds_metadata_from_the_object_store() {
        let core = setup();
        core.create_file("u", &Path::new("a/f.txt"), vec![0u8; 5]).await.unwrap();
        core.create_file("u", &Path::new("a/g.txt"), vec![0u8; 7]).await.unwrap();

        // Drop the metadata row for `a` and everything under it, simulating
        // metadata that's fallen behind the object store, then rebuild.
        core.reindex("u", &Path::new("a")).await.unwrap();

        let a = core.get_by_path("u", &Path::new("a")).await.unwrap();
        assert_eq!(a.size, 12);
        let f = core.get_by_path("u", &Path::new("a/f.txt")).await.unwrap();
        assert_eq!(f.size, 5);
    }
}
