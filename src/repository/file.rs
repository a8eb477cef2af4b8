//! `File` row CRUD, aggregate size updates, and prefix operations.
//!
//! Every function here takes a `&rusqlite::Transaction` rather than
//! opening its own: `core::FileCore` composes several of these calls
//! inside one `db::Handle::atomic` block so their effects commit (or
//! retry) together.

use camino::Utf8PathBuf;
use jiff::Timestamp;
use regex::Regex;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::domain::File;
use crate::error::CoreError;
use crate::path::Path;

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<File> {
    let path: String = row.get("path")?;
    let modified_at: String = row.get("modified_at")?;
    Ok(File {
        id: Uuid::parse_str(&row.get::<_, String>("id")?).unwrap(),
        ns_path: row.get("ns_path")?,
        name: row.get("name")?,
        path: Path::new(path),
        size: row.get("size")?,
        content_hash: row.get("content_hash")?,
        media_type: row.get("media_type")?,
        modified_at: modified_at.parse().unwrap_or(Timestamp::UNIX_EPOCH),
    })
}

/// Insert one file row. `AlreadyExists` on a (ns_path, casefold(path))
/// collision.
pub fn save(tx: &rusqlite::Transaction, file: &File) -> Result<File, CoreError> {
    let path_cf = file.path.as_str().to_lowercase();
    let result = tx.execute(
        "INSERT INTO files (id, ns_path, name, path, path_cf, size, content_hash, media_type, modified_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            file.id.to_string(),
            file.ns_path,
            file.name,
            file.path.as_str(),
            path_cf,
            file.size,
            file.content_hash,
            file.media_type,
            file.modified_at.to_string(),
        ],
    );
    match result {
        Ok(_) => Ok(file.clone()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Err(CoreError::already_exists(file.path.as_str()))
        }
        Err(e) => Err(CoreError::from(e)),
    }
}

/// Upsert-or-skip: used by reindex, which tolerates re-creating rows that
/// already exist (e.g. a concurrently created sibling).
pub fn save_batch(tx: &rusqlite::Transaction, files: &[File]) -> Result<(), CoreError> {
    for file in files {
        let path_cf = file.path.as_str().to_lowercase();
        tx.execute(
            "INSERT INTO files (id, ns_path, name, path, path_cf, size, content_hash, media_type, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(ns_path, path_cf) DO NOTHING",
            params![
                file.id.to_string(),
                file.ns_path,
                file.name,
                file.path.as_str(),
                path_cf,
                file.size,
                file.content_hash,
                file.media_type,
                file.modified_at.to_string(),
            ],
        )
        .map_err(CoreError::from)?;
    }
    Ok(())
}

pub fn get_by_path(tx: &rusqlite::Transaction, ns: &str, path: &Path) -> Result<Option<File>, CoreError> {
    tx.query_row(
        "SELECT * FROM files WHERE ns_path = ?1 AND path_cf = ?2",
        params![ns, path.as_str().to_lowercase()],
        row_to_file,
    )
    .optional()
    .map_err(CoreError::from)
}

pub fn get_by_id(tx: &rusqlite::Transaction, id: Uuid) -> Result<Option<File>, CoreError> {
    tx.query_row("SELECT * FROM files WHERE id = ?1", params![id.to_string()], row_to_file)
        .optional()
        .map_err(CoreError::from)
}

pub fn get_by_id_batch(tx: &rusqlite::Transaction, ids: &[Uuid]) -> Result<Vec<File>, CoreError> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(f) = get_by_id(tx, *id)? {
            out.push(f);
        }
    }
    Ok(out)
}

pub fn get_by_chash_batch(tx: &rusqlite::Transaction, ns: &str, chash: &str) -> Result<Vec<File>, CoreError> {
    let mut stmt = tx
        .prepare("SELECT * FROM files WHERE ns_path = ?1 AND content_hash = ?2")
        .map_err(CoreError::from)?;
    let rows = stmt
        .query_map(params![ns, chash], row_to_file)
        .map_err(CoreError::from)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(CoreError::from)
}

pub fn exists_at_path(tx: &rusqlite::Transaction, ns: &str, path: &Path) -> Result<bool, CoreError> {
    Ok(get_by_path(tx, ns, path)?.is_some())
}

pub fn exists_with_id(tx: &rusqlite::Transaction, id: Uuid) -> Result<bool, CoreError> {
    Ok(get_by_id(tx, id)?.is_some())
}

/// Add signed `delta` to each named file's `size`. Skips the zero delta
/// (early return) and any path with no row (a no-op contribution).
pub fn incr_size(tx: &rusqlite::Transaction, ns: &str, updates: &[(Path, i64)]) -> Result<(), CoreError> {
    for (path, delta) in updates {
        if *delta == 0 {
            continue;
        }
        tx.execute(
            "UPDATE files SET size = size + ?1 WHERE ns_path = ?2 AND path_cf = ?3",
            params![delta, ns, path.as_str().to_lowercase()],
        )
        .map_err(CoreError::from)?;
    }
    Ok(())
}

/// Apply the same `delta` to every path in `paths` (typically a file's
/// ancestor chain after a create/delete).
pub fn incr_size_batch(tx: &rusqlite::Transaction, ns: &str, paths: &[Path], delta: i64) -> Result<(), CoreError> {
    if delta == 0 {
        return Ok(());
    }
    let updates: Vec<(Path, i64)> = paths.iter().cloned().map(|p| (p, delta)).collect();
    incr_size(tx, ns, &updates)
}

/// Count files whose path matches `pattern`, used to pick a free
/// `stem (N).suffix` name.
pub fn count_by_path_pattern(tx: &rusqlite::Transaction, ns: &str, pattern: &Regex) -> Result<usize, CoreError> {
    let mut stmt = tx
        .prepare("SELECT path FROM files WHERE ns_path = ?1")
        .map_err(CoreError::from)?;
    let rows = stmt
        .query_map(params![ns], |r| r.get::<_, String>(0))
        .map_err(CoreError::from)?;
    let mut count = 0;
    for row in rows {
        let path = row.map_err(CoreError::from)?;
        if pattern.is_match(&path) {
            count += 1;
        }
    }
    Ok(count)
}

pub fn delete(tx: &rusqlite::Transaction, ns: &str, path: &Path) -> Result<Option<File>, CoreError> {
    let existing = get_by_path(tx, ns, path)?;
    if existing.is_some() {
        tx.execute(
            "DELETE FROM files WHERE ns_path = ?1 AND path_cf = ?2",
            params![ns, path.as_str().to_lowercase()],
        )
        .map_err(CoreError::from)?;
    }
    Ok(existing)
}

pub fn delete_batch(tx: &rusqlite::Transaction, ns: &str, paths: &[Path]) -> Result<Vec<File>, CoreError> {
    let mut out = Vec::new();
    for path in paths {
        if let Some(f) = delete(tx, ns, path)? {
            out.push(f);
        }
    }
    Ok(out)
}

/// Delete every row whose path is strictly under `prefix` (i.e. descendants,
/// not `prefix` itself). Returns the deleted rows so callers can compute
/// size deltas or drive blob cleanup.
pub fn delete_all_with_prefix(tx: &rusqlite::Transaction, ns: &str, prefix: &Path) -> Result<Vec<File>, CoreError> {
    let descendants = list_with_prefix_recursive(tx, ns, prefix)?;
    for f in &descendants {
        tx.execute(
            "DELETE FROM files WHERE ns_path = ?1 AND path_cf = ?2",
            params![ns, f.path.as_str().to_lowercase()],
        )
        .map_err(CoreError::from)?;
    }
    Ok(descendants)
}

pub fn delete_all_with_prefix_batch(
    tx: &rusqlite::Transaction,
    targets: &[(String, Path)],
) -> Result<Vec<File>, CoreError> {
    let mut out = Vec::new();
    for (ns, prefix) in targets {
        out.extend(delete_all_with_prefix(tx, ns, prefix)?);
    }
    Ok(out)
}

/// Rename every descendant of `from` (inclusive) from namespace `from_ns`
/// to live under `to` in `to_ns`.
pub fn replace_path_prefix(
    tx: &rusqlite::Transaction,
    from_ns: &str,
    from: &Path,
    to_ns: &str,
    to: &Path,
) -> Result<(), CoreError> {
    let from_str = from.as_str();
    let mut stmt = tx
        .prepare("SELECT id, path FROM files WHERE ns_path = ?1 AND (path_cf = ?2 OR path_cf LIKE ?3)")
        .map_err(CoreError::from)?;
    let like_prefix = format!("{}/%", from_str.to_lowercase());
    let rows: Vec<(String, String)> = stmt
        .query_map(params![from_ns, from_str.to_lowercase(), like_prefix], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .map_err(CoreError::from)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(CoreError::from)?;

    for (id, old_path) in rows {
        let old = Path::new(old_path);
        let suffix = &old.as_str()[from_str.len()..];
        let new_path = Path::new(format!("{to}{suffix}"));
        let name = new_path.name().to_string();
        tx.execute(
            "UPDATE files SET ns_path = ?1, name = ?2, path = ?3, path_cf = ?4 WHERE id = ?5",
            params![to_ns, name, new_path.as_str(), new_path.as_str().to_lowercase(), id],
        )
        .map_err(CoreError::from)?;
    }
    Ok(())
}

pub struct FileUpdate {
    pub ns_path: Option<String>,
    pub name: Option<String>,
    pub path: Option<Path>,
    pub content_hash: Option<String>,
    pub size: Option<i64>,
}

pub fn update(tx: &rusqlite::Transaction, id: Uuid, patch: &FileUpdate) -> Result<File, CoreError> {
    let mut current = get_by_id(tx, id)?.ok_or_else(|| CoreError::NotFound { path: Utf8PathBuf::from(id.to_string()) })?;
    if let Some(ns) = &patch.ns_path {
        current.ns_path = ns.clone();
    }
    if let Some(p) = &patch.path {
        current.path = p.clone();
        current.name = p.name().to_string();
    }
    if let Some(name) = &patch.name {
        current.name = name.clone();
    }
    if let Some(c) = &patch.content_hash {
        current.content_hash = c.clone();
    }
    if let Some(s) = patch.size {
        current.size = s;
    }
    tx.execute(
        "UPDATE files SET ns_path=?1, name=?2, path=?3, path_cf=?4, content_hash=?5, size=?6 WHERE id=?7",
        params![
            current.ns_path,
            current.name,
            current.path.as_str(),
            current.path.as_str().to_lowercase(),
            current.content_hash,
            current.size,
            id.to_string(),
        ],
    )
    .map_err(CoreError::from)?;
    Ok(current)
}

pub fn set_chash_batch(tx: &rusqlite::Transaction, updates: &[(Uuid, String)]) -> Result<(), CoreError> {
    for (id, chash) in updates {
        tx.execute(
            "UPDATE files SET content_hash = ?1 WHERE id = ?2",
            params![chash, id.to_string()],
        )
        .map_err(CoreError::from)?;
    }
    Ok(())
}

/// Direct children of `prefix`, folders first then name ascending
/// case-insensitively. Does not include mount-point entries anchored at
/// this folder -- `FileService::list_folder` merges those in, since that
/// requires the mount repository too.
pub fn list_with_prefix(tx: &rusqlite::Transaction, ns: &str, prefix: &Path) -> Result<Vec<File>, CoreError> {
    let all = list_with_prefix_recursive(tx, ns, prefix)?;
    let depth = if prefix.is_root() { 0 } else { prefix.as_str().matches('/').count() + 1 };
    let mut direct: Vec<File> = all
        .into_iter()
        .filter(|f| {
            let d = f.path.as_str().matches('/').count() + if prefix.is_root() { 1 } else { 0 };
            d == depth
        })
        .collect();
    direct.sort_by(|a, b| {
        b.is_folder()
            .cmp(&a.is_folder())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    Ok(direct)
}

/// Every strict descendant of `prefix` (not `prefix` itself), unsorted.
/// Used where a caller needs the whole subtree rather than just direct
/// children -- [`list_with_prefix`]'s depth filter, and content reindexing
/// which walks every file regardless of depth.
pub fn list_with_prefix_recursive(tx: &rusqlite::Transaction, ns: &str, prefix: &Path) -> Result<Vec<File>, CoreError> {
    let like = if prefix.is_root() {
        "%".to_string()
    } else {
        format!("{}/%", prefix.as_str().to_lowercase())
    };
    let mut stmt = tx
        .prepare("SELECT * FROM files WHERE ns_path = ?1 AND path_cf LIKE ?2")
        .map_err(CoreError::from)?;
    let rows = stmt.query_map(params![ns, like], row_to_file).map_err(CoreError::from)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(CoreError::from)
}

/// Paginated listing of an entire namespace (used by admin/reporting
/// surfaces outside this crate), optionally filtered to an included or
/// excluded set of media types.
pub fn list_files(
    tx: &rusqlite::Transaction,
    ns: &str,
    included: Option<&[String]>,
    excluded: Option<&[String]>,
    offset: i64,
    limit: i64,
) -> Result<Vec<File>, CoreError> {
    let mut stmt = tx.prepare("SELECT * FROM files WHERE ns_path = ?1 ORDER BY path_cf").map_err(CoreError::from)?;
    let rows = stmt.query_map(params![ns], row_to_file).map_err(CoreError::from)?;
    let mut all: Vec<File> = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(CoreError::from)?;
    if let Some(inc) = included {
        all.retain(|f| inc.iter().any(|m| m == &f.media_type));
    }
    if let Some(exc) = excluded {
        all.retain(|f| !exc.iter().any(|m| m == &f.media_type));
    }
    Ok(all.into_iter().skip(offset.max(0) as usize).take(limit.max(0) as usize).collect())
}
