//! Insert-only audit trail: who did what to which path, and when. Not
//! read back by anything in this crate; a durable record for an outward
//! surface to query.

use jiff::Timestamp;
use rusqlite::params;
use uuid::Uuid;

use crate::domain::{AuditAction, AuditEvent};
use crate::error::CoreError;
use crate::path::Path;

fn action_str(action: AuditAction) -> &'static str {
    match action {
        AuditAction::Create => "create",
        AuditAction::Delete => "delete",
        AuditAction::Move => "move",
        AuditAction::Share => "share",
        AuditAction::Unshare => "unshare",
    }
}

fn action_from_str(s: &str) -> AuditAction {
    match s {
        "create" => AuditAction::Create,
        "delete" => AuditAction::Delete,
        "move" => AuditAction::Move,
        "share" => AuditAction::Share,
        "unshare" => AuditAction::Unshare,
        _ => AuditAction::Create,
    }
}

pub fn record(tx: &rusqlite::Transaction, event: &AuditEvent) -> Result<(), CoreError> {
    tx.execute(
        "INSERT INTO audit_events (id, ns_path, action, path, at) VALUES (?1,?2,?3,?4,?5)",
        params![
            event.id.to_string(),
            event.ns_path,
            action_str(event.action),
            event.path.as_str(),
            event.at.to_string(),
        ],
    )
    .map_err(CoreError::from)?;
    Ok(())
}

pub fn list_for_ns(tx: &rusqlite::Transaction, ns: &str, limit: i64) -> Result<Vec<AuditEvent>, CoreError> {
    let mut stmt = tx
        .prepare("SELECT id, ns_path, action, path, at FROM audit_events WHERE ns_path = ?1 ORDER BY at DESC LIMIT ?2")
        .map_err(CoreError::from)?;
    let rows = stmt
        .query_map(params![ns, limit], |r| {
            let at: String = r.get(4)?;
            Ok(AuditEvent {
                id: Uuid::parse_str(&r.get::<_, String>(0)?).unwrap(),
                ns_path: r.get(1)?,
                action: action_from_str(&r.get::<_, String>(2)?),
                path: Path::new(r.get::<_, String>(3)?),
                at: at.parse().unwrap_or(Timestamp::UNIX_EPOCH),
            })
        })
        .map_err(CoreError::from)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(CoreError::from)
}
