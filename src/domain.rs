//! Core persisted entity types. Repositories own CRUD against these;
//! services compose them. See `DESIGN.md` for which repository owns which
//! table.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mediatype;
use crate::path::Path;

/// A rooted per-user tree of files, addressed by a stable string key
/// (conventionally the owner's username at creation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub id: Uuid,
    pub path: String,
    pub owner_id: Uuid,
}

pub const TRASH_FOLDER: &str = "Trash";

/// A single row of the file tree: a regular file or a folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub id: Uuid,
    pub ns_path: String,
    pub name: String,
    pub path: Path,
    pub size: i64,
    /// Dropbox-style content hash; empty string for folders and empty files.
    pub content_hash: String,
    pub media_type: String,
    pub modified_at: Timestamp,
}

impl File {
    pub fn is_folder(&self) -> bool {
        self.media_type == mediatype::FOLDER
    }

    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }
}

/// The kind of file view a caller sees: a plain row, or one projected
/// through a mount point with its reported path rewritten to the display
/// path. Modeled as a tagged variant rather than inheritance, per the
/// shared read contract between `File` and a mounted view.
#[derive(Debug, Clone, PartialEq)]
pub enum FileView {
    Regular(File),
    Mounted { file: File, mount_point: MountPoint },
}

impl FileView {
    pub fn inner(&self) -> &File {
        match self {
            FileView::Regular(f) => f,
            FileView::Mounted { file, .. } => file,
        }
    }

    /// The path as the caller should see it: the real path for a regular
    /// file, the display path (with the real suffix appended) for a
    /// mounted one.
    pub fn display_path(&self) -> Path {
        match self {
            FileView::Regular(f) => f.path.clone(),
            FileView::Mounted { file, mount_point } => {
                let rel = mount_resolved_suffix(file, mount_point);
                mount_point.display_path().join(&rel)
            }
        }
    }
}

fn mount_resolved_suffix(file: &File, mp: &MountPoint) -> String {
    let real = file.path.as_str();
    let source = mp.source.path.as_str();
    if source == "." {
        return real.to_string();
    }
    real.strip_prefix(source)
        .map(|s| s.trim_start_matches('/').to_string())
        .unwrap_or_default()
}

/// Permission bits shared by [`FileMember`] and [`MountPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actions {
    pub view: bool,
    pub download: bool,
    pub upload: bool,
    pub r#move: bool,
    pub delete: bool,
    pub reshare: bool,
}

impl Actions {
    pub fn owner() -> Self {
        Actions {
            view: true,
            download: true,
            upload: true,
            r#move: true,
            delete: true,
            reshare: true,
        }
    }

    pub fn viewer() -> Self {
        Actions {
            view: true,
            download: true,
            upload: false,
            r#move: false,
            delete: false,
            reshare: false,
        }
    }

    pub fn editor() -> Self {
        Actions {
            view: true,
            download: true,
            upload: true,
            r#move: true,
            delete: true,
            reshare: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSource {
    pub ns_path: String,
    pub path: Path,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountFolder {
    pub ns_path: String,
    pub path: Path,
}

/// "The subtree at `source.ns_path:source.path` is exposed inside
/// `folder.ns_path` as a child of `folder.path` named `display_name`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPoint {
    pub id: Uuid,
    pub source: MountSource,
    pub folder: MountFolder,
    pub display_name: String,
    pub actions: Actions,
}

impl MountPoint {
    pub fn display_path(&self) -> Path {
        self.folder.path.join(&self.display_name)
    }

    pub fn can_download(&self) -> bool {
        self.actions.download
    }

    pub fn can_reshare(&self) -> bool {
        self.actions.reshare
    }

    pub fn can_view(&self) -> bool {
        self.actions.view
    }
}

/// `{file_id, user_id, permissions}`. Owners are implicit members with all
/// permissions and are not necessarily materialized as a row until the
/// file is first shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMember {
    pub file_id: Uuid,
    pub user_id: Uuid,
    pub actions: Actions,
}

/// A single live share token per file; creating one when it already
/// exists returns the existing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedLink {
    pub id: Uuid,
    pub file_id: Uuid,
    pub token: String,
    pub created_at: Timestamp,
}

/// A 64-bit perceptual hash, persisted split into four 16-bit columns so
/// near-duplicate search can equality-join on any one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub file_id: Uuid,
    pub value: u64,
}

impl Fingerprint {
    pub fn parts(&self) -> [u16; 4] {
        [
            (self.value >> 48) as u16,
            (self.value >> 32) as u16,
            (self.value >> 16) as u16,
            self.value as u16,
        ]
    }

    pub fn from_parts(file_id: Uuid, parts: [u16; 4]) -> Self {
        let value = (parts[0] as u64) << 48
            | (parts[1] as u64) << 32
            | (parts[2] as u64) << 16
            | (parts[3] as u64);
        Fingerprint { file_id, value }
    }

    pub fn hamming_distance(&self, other: &Fingerprint) -> u32 {
        (self.value ^ other.value).count_ones()
    }
}

/// EXIF-style structured fields (make, model, focal length, ISO,
/// timestamps, width/height, ...), stored as an opaque JSON blob per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub file_id: Uuid,
    pub data: serde_json::Value,
}

/// A durable record handed off to the background worker: when consumed,
/// its blobs (and any orphan thumbnails keyed on `content_hash`) are
/// physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePendingDeletion {
    pub id: Uuid,
    pub ns_path: String,
    pub path: Path,
    pub content_hash: String,
    pub media_type: String,
    pub created_at: Timestamp,
}

/// `null` quota means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: Uuid,
    pub storage_quota: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Create,
    Delete,
    Move,
    Share,
    Unshare,
}

/// Ambient observability: who did what to which path, and when. Not read
/// back by anything in this crate -- a durable trail for an outward
/// surface to query, the way the original source's usecases record one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub ns_path: String,
    pub action: AuditAction,
    pub path: Path,
    pub at: Timestamp,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fingerprint_roundtrips_through_parts() {
        let fp = Fingerprint {
            file_id: Uuid::nil(),
            value: 0xE6C0_1272_F884_CDF8,
        };
        let parts = fp.parts();
        let back = Fingerprint::from_parts(fp.file_id, parts);
        assert_eq!(fp, back);
    }

    #[test]
    fn hamming_distance_of_adjacent_values() {
        let a = Fingerprint { file_id: Uuid::nil(), value: 0xE6C0_1272_F884_CDF8 };
        let b = Fingerprint { file_id: Uuid::nil(), value: 0xE6C0_1272_F884_CDF9 };
        assert_eq!(a.hamming_distance(&b), 1);
    }

    #[test]
    fn mounted_view_rewrites_display_path() {
        let mp = MountPoint {
            id: Uuid::nil(),
            source: MountSource { ns_path: "u".into(), path: Path::new("Shared") },
            folder: MountFolder { ns_path: "a".into(), path: Path::new("Inbox") },
            display_name: "Public".into(),
            actions: Actions::viewer(),
        };
        let file = File {
            id: Uuid::nil(),
            ns_path: "u".into(),
            name: "doc.txt".into(),
            path: Path::new("Shared/doc.txt"),
            size: 1,
            content_hash: "x".into(),
            media_type: "text/plain".into(),
            modified_at: Timestamp::UNIX_EPOCH,
        };
        let view = FileView::Mounted { file, mount_point: mp };
        assert_eq!(view.display_path(), Path::new("Inbox/Public/doc.txt"));
    }
}
