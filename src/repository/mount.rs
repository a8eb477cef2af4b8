//! Mount point persistence and nearest-ancestor lookup.

use regex::Regex;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::domain::{Actions, MountFolder, MountPoint, MountSource};
use crate::error::CoreError;
use crate::path::Path;

fn row_to_mount(row: &rusqlite::Row) -> rusqlite::Result<MountPoint> {
    Ok(MountPoint {
        id: Uuid::parse_str(&row.get::<_, String>("id")?).unwrap(),
        source: MountSource {
            ns_path: row.get("source_ns_path")?,
            path: Path::new(row.get::<_, String>("source_path")?),
        },
        folder: MountFolder {
            ns_path: row.get("folder_ns_path")?,
            path: Path::new(row.get::<_, String>("folder_path")?),
        },
        display_name: row.get("display_name")?,
        actions: Actions {
            view: row.get("can_view")?,
            download: row.get("can_download")?,
            upload: row.get("can_upload")?,
            r#move: row.get("can_move")?,
            delete: row.get("can_delete")?,
            reshare: row.get("can_reshare")?,
        },
    })
}

pub fn save(tx: &rusqlite::Transaction, mp: &MountPoint) -> Result<MountPoint, CoreError> {
    let result = tx.execute(
        "INSERT INTO mount_points
            (id, source_ns_path, source_path, source_path_cf,
             folder_ns_path, folder_path, folder_path_cf,
             display_name, display_name_cf,
             can_view, can_download, can_upload, can_move, can_delete, can_reshare)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
        params![
            mp.id.to_string(),
            mp.source.ns_path,
            mp.source.path.as_str(),
            mp.source.path.as_str().to_lowercase(),
            mp.folder.ns_path,
            mp.folder.path.as_str(),
            mp.folder.path.as_str().to_lowercase(),
            mp.display_name,
            mp.display_name.to_lowercase(),
            mp.actions.view,
            mp.actions.download,
            mp.actions.upload,
            mp.actions.r#move,
            mp.actions.delete,
            mp.actions.reshare,
        ],
    );
    match result {
        Ok(_) => Ok(mp.clone()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Err(CoreError::already_exists(mp.display_path().as_str()))
        }
        Err(e) => Err(CoreError::from(e)),
    }
}

pub struct MountUpdate {
    pub folder: Option<MountFolder>,
    pub display_name: Option<String>,
}

pub fn update(tx: &rusqlite::Transaction, id: Uuid, patch: &MountUpdate) -> Result<MountPoint, CoreError> {
    let mut mp = get_by_id(tx, id)?.ok_or(CoreError::MountNotFound)?;
    if let Some(folder) = &patch.folder {
        mp.folder = folder.clone();
    }
    if let Some(name) = &patch.display_name {
        mp.display_name = name.clone();
    }
    tx.execute(
        "UPDATE mount_points SET folder_ns_path=?1, folder_path=?2, folder_path_cf=?3,
            display_name=?4, display_name_cf=?5 WHERE id=?6",
        params![
            mp.folder.ns_path,
            mp.folder.path.as_str(),
            mp.folder.path.as_str().to_lowercase(),
            mp.display_name,
            mp.display_name.to_lowercase(),
            id.to_string(),
        ],
    )
    .map_err(CoreError::from)?;
    Ok(mp)
}

pub fn get_by_id(tx: &rusqlite::Transaction, id: Uuid) -> Result<Option<MountPoint>, CoreError> {
    tx.query_row("SELECT * FROM mount_points WHERE id = ?1", params![id.to_string()], row_to_mount)
        .optional()
        .map_err(CoreError::from)
}

pub fn list_all(tx: &rusqlite::Transaction, ns: &str) -> Result<Vec<MountPoint>, CoreError> {
    let mut stmt = tx
        .prepare("SELECT * FROM mount_points WHERE folder_ns_path = ?1 OR source_ns_path = ?1")
        .map_err(CoreError::from)?;
    let rows = stmt.query_map(params![ns], row_to_mount).map_err(CoreError::from)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(CoreError::from)
}

/// The deepest mount whose display path is a prefix of (or equal to)
/// `path`, in namespace `ns`. Candidates are every mount anchored in `ns`
/// whose `folder.path` is an ancestor of `path` and whose `display_name`
/// matches the corresponding path segment; the single deepest match is
/// validated against `is_relative_to` to rule out a same-named-but-
/// unrelated mount (e.g. a mount `Inbox/Public` shouldn't match
/// `Inbox/Public2`).
pub fn get_closest(tx: &rusqlite::Transaction, ns: &str, path: &Path) -> Result<Option<MountPoint>, CoreError> {
    let mut stmt = tx
        .prepare("SELECT * FROM mount_points WHERE folder_ns_path = ?1 ORDER BY LENGTH(folder_path_cf) DESC")
        .map_err(CoreError::from)?;
    let rows = stmt.query_map(params![ns], row_to_mount).map_err(CoreError::from)?;
    for row in rows {
        let mp = row.map_err(CoreError::from)?;
        let display_path = mp.display_path();
        if path.is_relative_to(&display_path) {
            return Ok(Some(mp));
        }
    }
    Ok(None)
}

/// Reverse direction: the mount (if any) exposing `source_path` (or an
/// ancestor of it) from `source_ns` into `target_ns`.
pub fn get_closest_by_source(
    tx: &rusqlite::Transaction,
    source_ns: &str,
    source_path: &Path,
    target_ns: &str,
) -> Result<Option<MountPoint>, CoreError> {
    let mut stmt = tx
        .prepare(
            "SELECT * FROM mount_points WHERE source_ns_path = ?1 AND folder_ns_path = ?2
             ORDER BY LENGTH(source_path_cf) DESC",
        )
        .map_err(CoreError::from)?;
    let rows = stmt.query_map(params![source_ns, target_ns], row_to_mount).map_err(CoreError::from)?;
    for row in rows {
        let mp = row.map_err(CoreError::from)?;
        if source_path.is_relative_to(&mp.source.path) {
            return Ok(Some(mp));
        }
    }
    Ok(None)
}

pub fn count_by_name_pattern(
    tx: &rusqlite::Transaction,
    ns: &str,
    folder: &Path,
    pattern: &Regex,
) -> Result<usize, CoreError> {
    let mut stmt = tx
        .prepare("SELECT display_name FROM mount_points WHERE folder_ns_path = ?1 AND folder_path_cf = ?2")
        .map_err(CoreError::from)?;
    let rows = stmt
        .query_map(params![ns, folder.as_str().to_lowercase()], |r| r.get::<_, String>(0))
        .map_err(CoreError::from)?;
    let mut count = 0;
    for row in rows {
        if pattern.is_match(&row.map_err(CoreError::from)?) {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::Handle;
    use crate::repository;

    fn setup() -> Handle {
        let db = Handle::open_in_memory().unwrap();
        repository::init_schema(&db).unwrap();
        db
    }

    #[test]
    fn get_closest_validates_relative_to() {
        let db = setup();
        db.atomic(1, |tx| {
            let mp = MountPoint {
                id: Uuid::new_v4(),
                source: MountSource { ns_path: "u".into(), path: Path::new("Shared") },
                folder: MountFolder { ns_path: "a".into(), path: Path::new("Inbox") },
                display_name: "Public".into(),
                actions: Actions::viewer(),
            };
            save(tx, &mp)?;
            Ok(())
        })
        .unwrap();

        db.atomic(1, |tx| {
            let found = get_closest(tx, "a", &Path::new("Inbox/Public/doc.txt"))?;
            assert!(found.is_some());
            let missed = get_closest(tx, "a", &Path::new("Inbox/Public2/doc.txt"))?;
            assert!(missed.is_none());
            Ok(())
        })
        .unwrap();
    }
}
