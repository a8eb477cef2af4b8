//! Metadata repositories: one table (or few) per entity in `domain`, all
//! built on the shared [`crate::db::Handle`].

pub mod account;
pub mod audit;
pub mod content_meta;
pub mod file;
pub mod file_member;
pub mod fingerprint;
pub mod mount;
pub mod namespace;
pub mod pending_deletion;
pub mod shared_link;

use crate::db::Handle;

/// Create every table this crate's repositories need. Idempotent
/// (`CREATE TABLE IF NOT EXISTS`); safe to call at startup against an
/// existing database.
pub fn init_schema(db: &Handle) -> rusqlite::Result<()> {
    db.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id            TEXT PRIMARY KEY,
            ns_path       TEXT NOT NULL,
            name          TEXT NOT NULL,
            path          TEXT NOT NULL,
            path_cf       TEXT NOT NULL,
            size          INTEGER NOT NULL,
            content_hash  TEXT NOT NULL,
            media_type    TEXT NOT NULL,
            modified_at   TEXT NOT NULL,
            UNIQUE(ns_path, path_cf)
        );
        CREATE INDEX IF NOT EXISTS files_by_chash ON files(content_hash);
        CREATE INDEX IF NOT EXISTS files_by_ns_prefix ON files(ns_path, path_cf);

        CREATE TABLE IF NOT EXISTS mount_points (
            id              TEXT PRIMARY KEY,
            source_ns_path  TEXT NOT NULL,
            source_path     TEXT NOT NULL,
            source_path_cf  TEXT NOT NULL,
            folder_ns_path  TEXT NOT NULL,
            folder_path     TEXT NOT NULL,
            folder_path_cf  TEXT NOT NULL,
            display_name    TEXT NOT NULL,
            display_name_cf TEXT NOT NULL,
            can_view        INTEGER NOT NULL,
            can_download    INTEGER NOT NULL,
            can_upload      INTEGER NOT NULL,
            can_move        INTEGER NOT NULL,
            can_delete      INTEGER NOT NULL,
            can_reshare     INTEGER NOT NULL,
            UNIQUE(folder_ns_path, folder_path_cf, display_name_cf)
        );
        CREATE INDEX IF NOT EXISTS mounts_by_source ON mount_points(source_ns_path, source_path_cf);

        CREATE TABLE IF NOT EXISTS fingerprints (
            file_id  TEXT PRIMARY KEY,
            ns_path  TEXT NOT NULL,
            path_cf  TEXT NOT NULL,
            p0       INTEGER NOT NULL,
            p1       INTEGER NOT NULL,
            p2       INTEGER NOT NULL,
            p3       INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS fingerprints_p0 ON fingerprints(ns_path, p0);
        CREATE INDEX IF NOT EXISTS fingerprints_p1 ON fingerprints(ns_path, p1);
        CREATE INDEX IF NOT EXISTS fingerprints_p2 ON fingerprints(ns_path, p2);
        CREATE INDEX IF NOT EXISTS fingerprints_p3 ON fingerprints(ns_path, p3);

        CREATE TABLE IF NOT EXISTS content_metadata (
            file_id TEXT PRIMARY KEY,
            data    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS file_pending_deletions (
            id           TEXT PRIMARY KEY,
            ns_path      TEXT NOT NULL,
            path         TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            media_type   TEXT NOT NULL,
            created_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS accounts (
            user_id        TEXT PRIMARY KEY,
            storage_quota  INTEGER
        );

        CREATE TABLE IF NOT EXISTS file_members (
            file_id      TEXT NOT NULL,
            user_id      TEXT NOT NULL,
            can_view     INTEGER NOT NULL,
            can_download INTEGER NOT NULL,
            can_upload   INTEGER NOT NULL,
            can_move     INTEGER NOT NULL,
            can_delete   INTEGER NOT NULL,
            can_reshare  INTEGER NOT NULL,
            PRIMARY KEY (file_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS shared_links (
            id         TEXT PRIMARY KEY,
            file_id    TEXT NOT NULL UNIQUE,
            token      TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_events (
            id      TEXT PRIMARY KEY,
            ns_path TEXT NOT NULL,
            action  TEXT NOT NULL,
            path    TEXT NOT NULL,
            at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS namespaces (
            id       TEXT PRIMARY KEY,
            path     TEXT NOT NULL UNIQUE,
            owner_id TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS namespaces_by_owner ON namespaces(owner_id);
        "#,
    )
}
