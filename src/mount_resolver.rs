//! Cross-namespace path resolution through mount points.
//!
//! A mount point grafts another namespace's subtree onto a folder under a
//! `display_name`. Resolving a path means walking up from it looking for
//! the deepest mount whose display path is an ancestor (or itself), then
//! rewriting the remaining suffix onto the mount's source namespace/path.
//! A path under no mount resolves to itself.

use std::sync::Arc;

use regex::RegexBuilder;

use crate::config::Configuration;
use crate::db::Handle;
use crate::domain::MountPoint;
use crate::error::{CoreError, CoreResult};
use crate::path::Path;
use crate::repository;

/// The outcome of resolving a namespace-relative path: either it lives
/// directly in the namespace asked about, or it's projected through a
/// mount point into another one.
#[derive(Debug, Clone)]
pub enum Resolved {
    Direct { ns: String, path: Path },
    Mounted { ns: String, path: Path, mount_point: MountPoint },
}

impl Resolved {
    pub fn ns(&self) -> &str {
        match self {
            Resolved::Direct { ns, .. } => ns,
            Resolved::Mounted { ns, .. } => ns,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Resolved::Direct { path, .. } => path,
            Resolved::Mounted { path, .. } => path,
        }
    }

    pub fn mount_point(&self) -> Option<&MountPoint> {
        match self {
            Resolved::Direct { .. } => None,
            Resolved::Mounted { mount_point, .. } => Some(mount_point),
        }
    }
}

pub struct MountResolver {
    db: Arc<Handle>,
    config: Configuration,
}

impl MountResolver {
    pub fn new(db: Arc<Handle>, config: Configuration) -> Self {
        MountResolver { db, config }
    }

    /// Resolve `path` (as seen from namespace `ns`) through the deepest
    /// applicable mount point, if any.
    pub async fn resolve_path(&self, ns: &str, path: &Path) -> CoreResult<Resolved> {
        let ns_owned = ns.to_string();
        let path_owned = path.clone();
        let closest = self.db.atomic(self.config.db_retry_attempts, |tx| repository::mount::get_closest(tx, &ns_owned, &path_owned))?;

        let Some(mp) = closest else {
            return Ok(Resolved::Direct { ns: ns.to_string(), path: path.clone() });
        };

        let display_path = mp.display_path();
        let rel = path
            .as_str()
            .strip_prefix(display_path.as_str())
            .map(|s| s.trim_start_matches('/'))
            .unwrap_or("");
        let source_path = if rel.is_empty() { mp.source.path.clone() } else { mp.source.path.join(rel) };

        Ok(Resolved::Mounted { ns: mp.source.ns_path.clone(), path: source_path, mount_point: mp })
    }

    /// The mount (if any) exposing `source_path` from `source_ns` into
    /// `target_ns`, and the display path that results from rewriting
    /// `source_path` through it. Used to show a shared item at its
    /// borrowed location rather than its real one.
    pub async fn reverse_path(&self, source_ns: &str, source_path: &Path, target_ns: &str) -> CoreResult<Option<(MountPoint, Path)>> {
        let source_ns = source_ns.to_string();
        let source_path = source_path.clone();
        let target_ns = target_ns.to_string();
        let found = self.db.atomic(self.config.db_retry_attempts, |tx| {
            repository::mount::get_closest_by_source(tx, &source_ns, &source_path, &target_ns)
        })?;
        let Some(mp) = found else {
            return Ok(None);
        };
        let rel = source_path
            .as_str()
            .strip_prefix(mp.source.path.as_str())
            .map(|s| s.trim_start_matches('/'))
            .unwrap_or("");
        let display = if rel.is_empty() { mp.display_path() } else { mp.display_path().join(rel) };
        Ok(Some((mp, display)))
    }

    /// Batched [`MountResolver::reverse_path`], one lookup per item.
    pub async fn reverse_path_batch(
        &self,
        items: &[(String, Path)],
        target_ns: &str,
    ) -> CoreResult<Vec<Option<(MountPoint, Path)>>> {
        let mut out = Vec::with_capacity(items.len());
        for (ns, path) in items {
            out.push(self.reverse_path(ns, path, target_ns).await?);
        }
        Ok(out)
    }

    /// A free display name for a new mount under `folder`, following the
    /// same `"{name} (N)"` free-name rule as `FileCore::get_available_path`,
    /// applied to display names rather than file paths.
    pub async fn get_available_name(&self, ns: &str, folder: &Path, name: &str) -> CoreResult<String> {
        let ns_owned = ns.to_string();
        let folder_owned = folder.clone();
        let exists = self
            .db
            .atomic(self.config.db_retry_attempts, |tx| repository::mount::get_closest(tx, &ns_owned, &folder_owned.join(name)))?;
        let taken = exists.map(|mp| mp.display_path() == folder.join(name)).unwrap_or(false);
        if !taken {
            return Ok(name.to_string());
        }
        let pattern_src = format!("^{} \\([0-9]+\\)$", regex::escape(name));
        let pattern = RegexBuilder::new(&pattern_src)
            .case_insensitive(true)
            .build()
            .map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
        let ns_owned = ns.to_string();
        let folder_owned = folder.clone();
        let count = self
            .db
            .atomic(self.config.db_retry_attempts, |tx| repository::mount::count_by_name_pattern(tx, &ns_owned, &folder_owned, &pattern))?;
        Ok(format!("{name} ({})", count + 1))
    }
}
