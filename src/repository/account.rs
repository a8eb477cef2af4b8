//! Per-user storage quota. `storage_used` is derived from the namespace
//! root folder's size (see `SPEC_FULL.md` §3), not stored here.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::domain::Account;
use crate::error::CoreError;

pub fn save(tx: &rusqlite::Transaction, account: &Account) -> Result<Account, CoreError> {
    tx.execute(
        "INSERT INTO accounts (user_id, storage_quota) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO UPDATE SET storage_quota = excluded.storage_quota",
        params![account.user_id.to_string(), account.storage_quota],
    )
    .map_err(CoreError::from)?;
    Ok(account.clone())
}

pub fn get(tx: &rusqlite::Transaction, user_id: Uuid) -> Result<Option<Account>, CoreError> {
    tx.query_row(
        "SELECT user_id, storage_quota FROM accounts WHERE user_id = ?1",
        params![user_id.to_string()],
        |r| {
            Ok(Account {
                user_id: Uuid::parse_str(&r.get::<_, String>(0)?).unwrap(),
                storage_quota: r.get(1)?,
            })
        },
    )
    .optional()
    .map_err(CoreError::from)
}
