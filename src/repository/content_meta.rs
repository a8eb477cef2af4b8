//! JSON per-file EXIF / content descriptors.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::domain::ContentMetadata;
use crate::error::CoreError;

pub fn save(tx: &rusqlite::Transaction, meta: &ContentMetadata) -> Result<ContentMetadata, CoreError> {
    let data = serde_json::to_string(&meta.data).map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
    tx.execute(
        "INSERT INTO content_metadata (file_id, data) VALUES (?1, ?2)
         ON CONFLICT(file_id) DO UPDATE SET data = excluded.data",
        params![meta.file_id.to_string(), data],
    )
    .map_err(CoreError::from)?;
    Ok(meta.clone())
}

pub fn get_by_file(tx: &rusqlite::Transaction, file_id: Uuid) -> Result<ContentMetadata, CoreError> {
    tx.query_row(
        "SELECT file_id, data FROM content_metadata WHERE file_id = ?1",
        params![file_id.to_string()],
        |r| {
            let data: String = r.get(1)?;
            Ok((r.get::<_, String>(0)?, data))
        },
    )
    .optional()
    .map_err(CoreError::from)?
    .map(|(id, data)| {
        Ok(ContentMetadata {
            file_id: Uuid::parse_str(&id).unwrap(),
            data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
        })
    })
    .unwrap_or(Err(CoreError::ContentMetadataNotFound { file_id }))
}

pub fn delete_by_file(tx: &rusqlite::Transaction, file_id: Uuid) -> Result<(), CoreError> {
    tx.execute("DELETE FROM content_metadata WHERE file_id = ?1", params![file_id.to_string()])
        .map_err(CoreError::from)?;
    Ok(())
}
