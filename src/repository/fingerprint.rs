//! 64-bit perceptual hashes, stored as four 16-bit columns so near-dup
//! search can equality-join on any one part.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::domain::Fingerprint;
use crate::error::CoreError;
use crate::path::Path;

pub fn save(tx: &rusqlite::Transaction, ns: &str, path: &Path, fp: &Fingerprint) -> Result<Fingerprint, CoreError> {
    let [p0, p1, p2, p3] = fp.parts();
    let result = tx.execute(
        "INSERT INTO fingerprints (file_id, ns_path, path_cf, p0, p1, p2, p3) VALUES (?1,?2,?3,?4,?5,?6,?7)",
        params![fp.file_id.to_string(), ns, path.as_str().to_lowercase(), p0, p1, p2, p3],
    );
    match result {
        Ok(_) => Ok(*fp),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Err(CoreError::FingerprintAlreadyExists { file_id: fp.file_id })
        }
        Err(e) => Err(CoreError::from(e)),
    }
}

pub fn get_by_file(tx: &rusqlite::Transaction, file_id: Uuid) -> Result<Option<Fingerprint>, CoreError> {
    tx.query_row(
        "SELECT file_id, p0, p1, p2, p3 FROM fingerprints WHERE file_id = ?1",
        params![file_id.to_string()],
        |r| {
            Ok(Fingerprint::from_parts(
                Uuid::parse_str(&r.get::<_, String>(0)?).unwrap(),
                [r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?],
            ))
        },
    )
    .optional()
    .map_err(CoreError::from)
}

/// Adjacency list: every pair of fingerprints under `prefix` sharing at
/// least one 16-bit part. The caller (`dedup`) filters this down to real
/// Hamming-distance neighbors.
pub fn intersect_all_with_prefix(
    tx: &rusqlite::Transaction,
    ns: &str,
    prefix: &Path,
) -> Result<Vec<Fingerprint>, CoreError> {
    let like = if prefix.is_root() { "%".to_string() } else { format!("{}/%", prefix.as_str().to_lowercase()) };
    let mut stmt = tx
        .prepare(
            "SELECT file_id, p0, p1, p2, p3 FROM fingerprints
             WHERE ns_path = ?1 AND (path_cf LIKE ?2 OR path_cf = ?3)",
        )
        .map_err(CoreError::from)?;
    let rows = stmt
        .query_map(params![ns, like, prefix.as_str().to_lowercase()], |r| {
            Ok(Fingerprint::from_parts(
                Uuid::parse_str(&r.get::<_, String>(0)?).unwrap(),
                [r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?],
            ))
        })
        .map_err(CoreError::from)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(CoreError::from)
}

pub fn delete_by_file(tx: &rusqlite::Transaction, file_id: Uuid) -> Result<(), CoreError> {
    tx.execute("DELETE FROM fingerprints WHERE file_id = ?1", params![file_id.to_string()])
        .map_err(CoreError::from)?;
    Ok(())
}
