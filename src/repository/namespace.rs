//! Namespace rows: the stable `ns_path` key that addresses a user's tree
//! from outside, plus its owner.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::domain::Namespace;
use crate::error::CoreError;

fn row_to_ns(row: &rusqlite::Row) -> rusqlite::Result<Namespace> {
    Ok(Namespace {
        id: Uuid::parse_str(&row.get::<_, String>("id")?).unwrap(),
        path: row.get("path")?,
        owner_id: Uuid::parse_str(&row.get::<_, String>("owner_id")?).unwrap(),
    })
}

pub fn save(tx: &rusqlite::Transaction, ns: &Namespace) -> Result<Namespace, CoreError> {
    let result = tx.execute(
        "INSERT INTO namespaces (id, path, owner_id) VALUES (?1, ?2, ?3)",
        params![ns.id.to_string(), ns.path, ns.owner_id.to_string()],
    );
    match result {
        Ok(_) => Ok(ns.clone()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Err(CoreError::already_exists(ns.path.clone()))
        }
        Err(e) => Err(CoreError::from(e)),
    }
}

pub fn get_by_path(tx: &rusqlite::Transaction, path: &str) -> Result<Option<Namespace>, CoreError> {
    tx.query_row("SELECT * FROM namespaces WHERE path = ?1", params![path], row_to_ns)
        .optional()
        .map_err(CoreError::from)
}

pub fn get_by_owner_id(tx: &rusqlite::Transaction, owner_id: Uuid) -> Result<Option<Namespace>, CoreError> {
    tx.query_row(
        "SELECT * FROM namespaces WHERE owner_id = ?1",
        params![owner_id.to_string()],
        row_to_ns,
    )
    .optional()
    .map_err(CoreError::from)
}
