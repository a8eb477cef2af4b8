//! The mount-aware facade most callers should use instead of `FileCore`
//! directly: every operation resolves its path(s) through
//! `MountResolver` first, delegates to `FileCore` against the resolved
//! (possibly different) namespace, then rewrites the result back into a
//! `FileView` from the caller's point of view.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::Configuration;
use crate::core::FileCore;
use crate::db::Handle;
use crate::domain::{Actions, FileView, MountFolder, MountPoint, MountSource};
use crate::error::{CoreError, CoreResult};
use crate::mount_resolver::{MountResolver, Resolved};
use crate::object_store::BoxedReader;
use crate::path::Path;
use crate::repository;

pub struct FileService {
    core: Arc<FileCore>,
    mounts: Arc<MountResolver>,
    db: Arc<Handle>,
    config: Configuration,
}

impl FileService {
    pub fn new(core: Arc<FileCore>, mounts: Arc<MountResolver>, db: Arc<Handle>, config: Configuration) -> Self {
        FileService { core, mounts, db, config }
    }

    /// Resolve `path` as seen from `ns` through the deepest applicable
    /// mount point. Exposed so callers needing the real backing namespace
    /// and path (the content pipeline, `NamespaceUseCase`) don't need
    /// their own `MountResolver` handle.
    pub async fn resolve(&self, ns: &str, path: &Path) -> CoreResult<Resolved> {
        self.mounts.resolve_path(ns, path).await
    }

    fn to_view(resolved: &Resolved, file: crate::domain::File) -> FileView {
        match resolved {
            Resolved::Direct { .. } => FileView::Regular(file),
            Resolved::Mounted { mount_point, .. } => FileView::Mounted { file, mount_point: mount_point.clone() },
        }
    }

    pub async fn get_by_path(&self, ns: &str, path: &Path) -> CoreResult<FileView> {
        let resolved = self.mounts.resolve_path(ns, path).await?;
        let file = self.core.get_by_path(resolved.ns(), resolved.path()).await?;
        Ok(Self::to_view(&resolved, file))
    }

    /// Look a file up by id as seen from `ns`: a regular view if it
    /// actually lives in `ns`, a mounted view if `ns` reaches it through a
    /// mount, `NotFound` if neither.
    pub async fn get_by_id(&self, ns: &str, id: Uuid) -> CoreResult<FileView> {
        let file = self.core.get_by_id(id).await?;
        if file.ns_path == ns {
            return Ok(FileView::Regular(file));
        }
        match self.mounts.reverse_path(&file.ns_path, &file.path, ns).await? {
            Some((mount_point, _display)) => Ok(FileView::Mounted { file, mount_point }),
            None => Err(CoreError::not_found(file.path.as_str())),
        }
    }

    /// Direct children of `path` under `ns`: the folder's regular children
    /// plus, for each mount point anchored directly at `path`, a mounted
    /// entry for that mount's source root.
    pub async fn list_folder(&self, ns: &str, path: &Path) -> CoreResult<Vec<FileView>> {
        let resolved = self.mounts.resolve_path(ns, path).await?;
        let files = self.core.list_folder(resolved.ns(), resolved.path()).await?;
        let mut views: Vec<FileView> = files.into_iter().map(FileView::Regular).collect();

        let ns_owned = ns.to_string();
        let anchored = self.db.atomic(self.config.db_retry_attempts, |tx| repository::mount::list_all(tx, &ns_owned))?;
        for mp in anchored.into_iter().filter(|mp| mp.folder.ns_path == ns && mp.folder.path == *path) {
            let source_file = self.core.get_by_path(&mp.source.ns_path, &mp.source.path).await?;
            views.push(FileView::Mounted { file: source_file, mount_point: mp });
        }

        views.sort_by(|a, b| a.display_path().cmp(&b.display_path()));
        Ok(views)
    }

    pub async fn r#move(&self, ns: &str, at_path: &Path, to_ns: &str, to_path: &Path) -> CoreResult<FileView> {
        let at_resolved = self.mounts.resolve_path(ns, at_path).await?;
        let to_resolved = self.mounts.resolve_path(to_ns, to_path).await?;
        let file = self
            .core
            .r#move(at_resolved.ns(), at_resolved.path(), to_resolved.ns(), to_resolved.path())
            .await?;
        Ok(Self::to_view(&to_resolved, file))
    }

    pub async fn delete(&self, ns: &str, path: &Path) -> CoreResult<FileView> {
        let resolved = self.mounts.resolve_path(ns, path).await?;
        let file = self.core.delete(resolved.ns(), resolved.path()).await?;
        Ok(Self::to_view(&resolved, file))
    }

    /// Delete several paths, each resolved independently (they may land in
    /// different real namespaces through different mounts), deferring blob
    /// cleanup the way `FileCore::delete_batch` does.
    pub async fn delete_batch(&self, ns: &str, paths: &[Path]) -> CoreResult<Vec<FileView>> {
        let mut by_ns: std::collections::HashMap<String, Vec<Path>> = std::collections::HashMap::new();
        let mut resolved_of: std::collections::HashMap<String, Resolved> = std::collections::HashMap::new();
        for path in paths {
            let resolved = self.mounts.resolve_path(ns, path).await?;
            resolved_of.entry(resolved.ns().to_string()).or_insert_with(|| resolved.clone());
            by_ns.entry(resolved.ns().to_string()).or_default().push(resolved.path().clone());
        }
        let mut views = Vec::new();
        for (target_ns, target_paths) in by_ns {
            let resolved = resolved_of.get(&target_ns).unwrap();
            let deleted = self.core.delete_batch(&target_ns, &target_paths).await?;
            views.extend(deleted.into_iter().map(|f| Self::to_view(resolved, f)));
        }
        Ok(views)
    }

    pub async fn download(&self, ns: &str, path: &Path) -> CoreResult<(FileView, BoxedReader)> {
        let resolved = self.mounts.resolve_path(ns, path).await?;
        let (file, reader) = self.core.download(resolved.ns(), resolved.path()).await?;
        Ok((Self::to_view(&resolved, file), reader))
    }

    /// Graft `source_ns:source_path` onto `folder_ns:folder_path` under a
    /// free name near `display_name`. Rejects a mount that would resolve
    /// back into its own source subtree (a cycle an unmounting caller
    /// could never escape by path alone).
    pub async fn create_mount(
        &self,
        source_ns: &str,
        source_path: &Path,
        folder_ns: &str,
        folder_path: &Path,
        display_name: &str,
        actions: Actions,
    ) -> CoreResult<MountPoint> {
        let folder = self.core.get_by_path(folder_ns, folder_path).await?;
        if !folder.is_folder() {
            return Err(CoreError::NotADirectory { path: folder_path.as_str().into() });
        }
        let source = self.core.get_by_path(source_ns, source_path).await?;
        if !source.is_folder() {
            return Err(CoreError::NotADirectory { path: source_path.as_str().into() });
        }

        let resolved_folder = self.mounts.resolve_path(folder_ns, folder_path).await?;
        if resolved_folder.ns() == source_ns && resolved_folder.path().is_relative_to(source_path) {
            return Err(CoreError::MalformedPath { reason: "mount would resolve into its own source".into() });
        }

        let name = self.mounts.get_available_name(folder_ns, folder_path, display_name).await?;
        let mp = MountPoint {
            id: Uuid::new_v4(),
            source: MountSource { ns_path: source_ns.to_string(), path: source_path.clone() },
            folder: MountFolder { ns_path: folder_ns.to_string(), path: folder_path.clone() },
            display_name: name,
            actions,
        };
        self.db.atomic(self.config.db_retry_attempts, |tx| repository::mount::save(tx, &mp))
    }

    pub async fn remove_mount(&self, id: Uuid) -> CoreResult<()> {
        self.db.atomic(self.config.db_retry_attempts, |tx| {
            tx.execute("DELETE FROM mount_points WHERE id = ?1", rusqlite::params![id.to_string()])
                .map_err(CoreError::from)?;
            Ok(())
        })
    }
}
