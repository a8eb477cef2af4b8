//! Shared-link tokens: at most one live link per file.

use jiff::Timestamp;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::domain::SharedLink;
use crate::error::CoreError;

pub fn get_by_file(tx: &rusqlite::Transaction, file_id: Uuid) -> Result<Option<SharedLink>, CoreError> {
    tx.query_row(
        "SELECT id, file_id, token, created_at FROM shared_links WHERE file_id = ?1",
        params![file_id.to_string()],
        row_to_link,
    )
    .optional()
    .map_err(CoreError::from)
}

pub fn get_by_token(tx: &rusqlite::Transaction, token: &str) -> Result<Option<SharedLink>, CoreError> {
    tx.query_row(
        "SELECT id, file_id, token, created_at FROM shared_links WHERE token = ?1",
        params![token],
        row_to_link,
    )
    .optional()
    .map_err(CoreError::from)
}

pub fn save(tx: &rusqlite::Transaction, link: &SharedLink) -> Result<SharedLink, CoreError> {
    tx.execute(
        "INSERT INTO shared_links (id, file_id, token, created_at) VALUES (?1,?2,?3,?4)",
        params![link.id.to_string(), link.file_id.to_string(), link.token, link.created_at.to_string()],
    )
    .map_err(CoreError::from)?;
    Ok(link.clone())
}

pub fn revoke(tx: &rusqlite::Transaction, token: &str) -> Result<(), CoreError> {
    let changed = tx
        .execute("DELETE FROM shared_links WHERE token = ?1", params![token])
        .map_err(CoreError::from)?;
    if changed == 0 {
        return Err(CoreError::SharedLinkNotFound);
    }
    Ok(())
}

fn row_to_link(row: &rusqlite::Row) -> rusqlite::Result<SharedLink> {
    let created_at: String = row.get(3)?;
    Ok(SharedLink {
        id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
        file_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap(),
        token: row.get(2)?,
        created_at: created_at.parse().unwrap_or(Timestamp::UNIX_EPOCH),
    })
}
