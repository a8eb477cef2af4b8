//! `{file_id, user_id, permissions}` rows backing per-file sharing.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::domain::{Actions, FileMember};
use crate::error::CoreError;

pub fn save(tx: &rusqlite::Transaction, member: &FileMember) -> Result<FileMember, CoreError> {
    tx.execute(
        "INSERT INTO file_members (file_id, user_id, can_view, can_download, can_upload, can_move, can_delete, can_reshare)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
         ON CONFLICT(file_id, user_id) DO UPDATE SET
            can_view=excluded.can_view, can_download=excluded.can_download,
            can_upload=excluded.can_upload, can_move=excluded.can_move,
            can_delete=excluded.can_delete, can_reshare=excluded.can_reshare",
        params![
            member.file_id.to_string(),
            member.user_id.to_string(),
            member.actions.view,
            member.actions.download,
            member.actions.upload,
            member.actions.r#move,
            member.actions.delete,
            member.actions.reshare,
        ],
    )
    .map_err(CoreError::from)?;
    Ok(member.clone())
}

pub fn get(tx: &rusqlite::Transaction, file_id: Uuid, user_id: Uuid) -> Result<Option<FileMember>, CoreError> {
    tx.query_row(
        "SELECT file_id, user_id, can_view, can_download, can_upload, can_move, can_delete, can_reshare
         FROM file_members WHERE file_id = ?1 AND user_id = ?2",
        params![file_id.to_string(), user_id.to_string()],
        row_to_member,
    )
    .optional()
    .map_err(CoreError::from)
}

pub fn list_for_file(tx: &rusqlite::Transaction, file_id: Uuid) -> Result<Vec<FileMember>, CoreError> {
    let mut stmt = tx
        .prepare(
            "SELECT file_id, user_id, can_view, can_download, can_upload, can_move, can_delete, can_reshare
             FROM file_members WHERE file_id = ?1",
        )
        .map_err(CoreError::from)?;
    let rows = stmt.query_map(params![file_id.to_string()], row_to_member).map_err(CoreError::from)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(CoreError::from)
}

pub fn remove(tx: &rusqlite::Transaction, file_id: Uuid, user_id: Uuid) -> Result<(), CoreError> {
    tx.execute(
        "DELETE FROM file_members WHERE file_id = ?1 AND user_id = ?2",
        params![file_id.to_string(), user_id.to_string()],
    )
    .map_err(CoreError::from)?;
    Ok(())
}

fn row_to_member(row: &rusqlite::Row) -> rusqlite::Result<FileMember> {
    Ok(FileMember {
        file_id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
        user_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap(),
        actions: Actions {
            view: row.get(2)?,
            download: row.get(3)?,
            upload: row.get(4)?,
            r#move: row.get(5)?,
            delete: row.get(6)?,
            reshare: row.get(7)?,
        },
    })
}
