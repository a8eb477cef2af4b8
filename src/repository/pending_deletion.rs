//! Durable handoff records consumed by the background worker to purge
//! blobs after a metadata delete has already committed.

use jiff::Timestamp;
use rusqlite::params;
use uuid::Uuid;

use crate::domain::FilePendingDeletion;
use crate::error::CoreError;
use crate::path::Path;

pub fn enqueue(tx: &rusqlite::Transaction, entry: &FilePendingDeletion) -> Result<(), CoreError> {
    tx.execute(
        "INSERT INTO file_pending_deletions (id, ns_path, path, content_hash, media_type, created_at)
         VALUES (?1,?2,?3,?4,?5,?6)",
        params![
            entry.id.to_string(),
            entry.ns_path,
            entry.path.as_str(),
            entry.content_hash,
            entry.media_type,
            entry.created_at.to_string(),
        ],
    )
    .map_err(CoreError::from)?;
    Ok(())
}

pub fn list_pending(tx: &rusqlite::Transaction, limit: i64) -> Result<Vec<FilePendingDeletion>, CoreError> {
    let mut stmt = tx
        .prepare("SELECT id, ns_path, path, content_hash, media_type, created_at FROM file_pending_deletions ORDER BY created_at LIMIT ?1")
        .map_err(CoreError::from)?;
    let rows = stmt
        .query_map(params![limit], |r| {
            let created_at: String = r.get(5)?;
            Ok(FilePendingDeletion {
                id: Uuid::parse_str(&r.get::<_, String>(0)?).unwrap(),
                ns_path: r.get(1)?,
                path: Path::new(r.get::<_, String>(2)?),
                content_hash: r.get(3)?,
                media_type: r.get(4)?,
                created_at: created_at.parse().unwrap_or(Timestamp::UNIX_EPOCH),
            })
        })
        .map_err(CoreError::from)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(CoreError::from)
}

pub fn remove(tx: &rusqlite::Transaction, id: Uuid) -> Result<(), CoreError> {
    tx.execute("DELETE FROM file_pending_deletions WHERE id = ?1", params![id.to_string()])
        .map_err(CoreError::from)?;
    Ok(())
}
