//! Per-file sharing: a single live share-link token, plus a per-user
//! member list with fine-grained actions (distinct from mount points,
//! which share a whole subtree into another namespace's tree rather than
//! granting access to individuals on a single file).

use std::sync::Arc;

use jiff::Timestamp;
use uuid::Uuid;

use crate::config::Configuration;
use crate::core::FileCore;
use crate::db::Handle;
use crate::domain::{Actions, AuditAction, AuditEvent, FileMember, MountPoint, SharedLink};
use crate::error::{CoreError, CoreResult};
use crate::file_service::FileService;
use crate::repository;

pub struct SharingService {
    db: Arc<Handle>,
    core: Arc<FileCore>,
    files: Arc<FileService>,
    config: Configuration,
}

impl SharingService {
    pub fn new(db: Arc<Handle>, core: Arc<FileCore>, files: Arc<FileService>, config: Configuration) -> Self {
        SharingService { db, core, files, config }
    }

    /// The effective actions an already-resolved member row grants, or
    /// `None` if `user_id` has no standing on `file_id` at all (the file's
    /// owner is an implicit member with every action and never has a row).
    async fn actions_for(&self, file_id: Uuid, user_id: Uuid, owner_id: Uuid) -> CoreResult<Option<Actions>> {
        if user_id == owner_id {
            return Ok(Some(Actions::owner()));
        }
        Ok(self
            .db
            .atomic(self.config.db_retry_attempts, |tx| repository::file_member::get(tx, file_id, user_id))?
            .map(|m| m.actions))
    }

    /// Create a share link for `file_id`, or hand back the existing one --
    /// `shared_links` allows at most one live token per file and `save` has
    /// no upsert, so the existence check happens here rather than relying
    /// on a constraint-violation fallback.
    pub async fn create_link(&self, ns: &str, file_id: Uuid) -> CoreResult<SharedLink> {
        self.db.atomic(self.config.db_retry_attempts, |tx| {
            if let Some(existing) = repository::shared_link::get_by_file(tx, file_id)? {
                return Ok(existing);
            }
            let link = SharedLink {
                id: Uuid::new_v4(),
                file_id,
                token: generate_token(),
                created_at: Timestamp::now(),
            };
            let saved = repository::shared_link::save(tx, &link)?;
            repository::audit::record(
                tx,
                &AuditEvent {
                    id: Uuid::new_v4(),
                    ns_path: ns.to_string(),
                    action: AuditAction::Share,
                    path: crate::path::Path::root(),
                    at: saved.created_at,
                },
            )?;
            Ok(saved)
        })
    }

    pub async fn get_link_by_file(&self, file_id: Uuid) -> CoreResult<SharedLink> {
        self.db
            .atomic(self.config.db_retry_attempts, |tx| repository::shared_link::get_by_file(tx, file_id))?
            .ok_or(CoreError::SharedLinkNotFound)
    }

    pub async fn get_link_by_token(&self, token: &str) -> CoreResult<SharedLink> {
        let token = token.to_string();
        self.db
            .atomic(self.config.db_retry_attempts, |tx| repository::shared_link::get_by_token(tx, &token))?
            .ok_or(CoreError::SharedLinkNotFound)
    }

    pub async fn revoke_link(&self, ns: &str, token: &str) -> CoreResult<()> {
        let token = token.to_string();
        self.db.atomic(self.config.db_retry_attempts, |tx| {
            repository::shared_link::revoke(tx, &token)?;
            repository::audit::record(
                tx,
                &AuditEvent {
                    id: Uuid::new_v4(),
                    ns_path: ns.to_string(),
                    action: AuditAction::Unshare,
                    path: crate::path::Path::root(),
                    at: Timestamp::now(),
                },
            )
        })
    }

    /// Share `file_id` with `member_user_id`: `acting_user_id` needs
    /// `reshare` on the file (owners always have it). If the actor is the
    /// owner, backfill their own (otherwise-implicit) owner `FileMember`
    /// row so the membership list is complete, then add the new member at
    /// editor level and mount the shared subtree under the member's own
    /// namespace root, picking a free display name near the file's name.
    pub async fn add_member(
        &self,
        file_id: Uuid,
        acting_user_id: Uuid,
        member_user_id: Uuid,
    ) -> CoreResult<(FileMember, MountPoint)> {
        let file = self.core.get_by_id(file_id).await?;
        let owner_id = self.owner_of(&file.ns_path).await?;

        let actor_actions = self
            .actions_for(file_id, acting_user_id, owner_id)
            .await?
            .ok_or_else(|| CoreError::ActionNotAllowed { reason: "no standing on this file".into() })?;
        if !actor_actions.reshare {
            return Err(CoreError::ActionNotAllowed { reason: "reshare permission required".into() });
        }

        if acting_user_id == owner_id {
            self.db.atomic(self.config.db_retry_attempts, |tx| {
                repository::file_member::save(tx, &FileMember { file_id, user_id: owner_id, actions: Actions::owner() })
            })?;
        }

        let member = self.db.atomic(self.config.db_retry_attempts, |tx| {
            repository::file_member::save(tx, &FileMember { file_id, user_id: member_user_id, actions: Actions::editor() })
        })?;

        let member_ns = self
            .db
            .atomic(self.config.db_retry_attempts, |tx| repository::namespace::get_by_owner_id(tx, member_user_id))?
            .ok_or_else(|| CoreError::UserNotFound)?;

        let mount = self
            .files
            .create_mount(&file.ns_path, &file.path, &member_ns.path, &crate::path::Path::root(), &file.name, Actions::editor())
            .await?;

        self.db.atomic(self.config.db_retry_attempts, |tx| {
            repository::audit::record(
                tx,
                &AuditEvent {
                    id: Uuid::new_v4(),
                    ns_path: file.ns_path.clone(),
                    action: AuditAction::Share,
                    path: file.path.clone(),
                    at: Timestamp::now(),
                },
            )
        })?;

        Ok((member, mount))
    }

    /// Unshare: the owner may remove any non-owner member; anyone else
    /// needs `reshare`. Also tears down the mount it created, if any.
    pub async fn remove_member(&self, file_id: Uuid, acting_user_id: Uuid, member_user_id: Uuid) -> CoreResult<()> {
        let file = self.core.get_by_id(file_id).await?;
        let owner_id = self.owner_of(&file.ns_path).await?;

        if member_user_id == owner_id {
            return Err(CoreError::ActionNotAllowed { reason: "can't remove the owner".into() });
        }
        if acting_user_id != owner_id {
            let actor_actions = self
                .actions_for(file_id, acting_user_id, owner_id)
                .await?
                .ok_or_else(|| CoreError::ActionNotAllowed { reason: "no standing on this file".into() })?;
            if !actor_actions.reshare {
                return Err(CoreError::ActionNotAllowed { reason: "reshare permission required".into() });
            }
        }

        if let Some(member_ns) = self
            .db
            .atomic(self.config.db_retry_attempts, |tx| repository::namespace::get_by_owner_id(tx, member_user_id))?
        {
            if let Some(mp) = self
                .db
                .atomic(self.config.db_retry_attempts, |tx| {
                    repository::mount::get_closest_by_source(tx, &file.ns_path, &file.path, &member_ns.path)
                })?
            {
                if mp.source.path == file.path {
                    self.files.remove_mount(mp.id).await?;
                }
            }
        }

        self.db.atomic(self.config.db_retry_attempts, |tx| repository::file_member::remove(tx, file_id, member_user_id))
    }

    async fn owner_of(&self, ns_path: &str) -> CoreResult<Uuid> {
        let ns_path = ns_path.to_string();
        self.db
            .atomic(self.config.db_retry_attempts, |tx| repository::namespace::get_by_path(tx, &ns_path))?
            .map(|ns| ns.owner_id)
            .ok_or_else(|| CoreError::not_found(ns_path))
    }

    pub async fn list_members(&self, file_id: Uuid) -> CoreResult<Vec<FileMember>> {
        self.db.atomic(self.config.db_retry_attempts, |tx| repository::file_member::list_for_file(tx, file_id))
    }

    pub async fn get_member(&self, file_id: Uuid, user_id: Uuid) -> CoreResult<Option<FileMember>> {
        self.db.atomic(self.config.db_retry_attempts, |tx| repository::file_member::get(tx, file_id, user_id))
    }
}

/// URL-safe, unguessable: 256 bits from the OS RNG, base32-encoded without
/// padding (shorter and case-insensitive-friendly compared to base64url).
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    data_encoding::BASE32_NOPAD.encode(&bytes)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::domain::Namespace;
    use crate::mount_resolver::MountResolver;
    use crate::object_store::MemoryStore;
    use crate::path::Path;
    use crate::repository;

    struct Harness {
        db: Arc<Handle>,
        core: Arc<FileCore>,
        sharing: SharingService,
    }

    fn setup() -> Harness {
        let db = Handle::open_in_memory().unwrap();
        repository::init_schema(&db).unwrap();
        let db = Arc::new(db);
        let config = Configuration::default();
        let store = Arc::new(MemoryStore::new());
        let core = Arc::new(FileCore::new(db.clone(), store, config.clone()));
        let mounts = Arc::new(MountResolver::new(db.clone(), config.clone()));
        let files = Arc::new(FileService::new(core.clone(), mounts, db.clone(), config.clone()));
        let sharing = SharingService::new(db.clone(), core.clone(), files, config);
        Harness { db, core, sharing }
    }

    fn make_namespace(h: &Harness, ns_path: &str, owner_id: Uuid) {
        h.db
            .atomic(3, |tx| repository::namespace::save(tx, &Namespace { id: Uuid::new_v4(), path: ns_path.to_string(), owner_id }))
            .unwrap();
    }

    #[tokio::test]
    async fn create_link_is_idempotent_per_file() {
        let h = setup();
        let file_id = Uuid::new_v4();
        let a = h.sharing.create_link("ns", file_id).await.unwrap();
        let b = h.sharing.create_link("ns", file_id).await.unwrap();
        assert_eq!(a.token, b.token);
    }

    #[tokio::test]
    async fn revoke_then_create_issues_a_fresh_token() {
        let h = setup();
        let file_id = Uuid::new_v4();
        let a = h.sharing.create_link("ns", file_id).await.unwrap();
        h.sharing.revoke_link("ns", &a.token).await.unwrap();
        let b = h.sharing.create_link("ns", file_id).await.unwrap();
        assert_ne!(a.token, b.token);
    }

    #[tokio::test]
    async fn add_member_mounts_the_shared_file_under_the_members_root() {
        let h = setup();
        let owner = Uuid::new_v4();
        let member = Uuid::new_v4();
        make_namespace(&h, "owner", owner);
        make_namespace(&h, "member", member);

        let file = h.core.create_file("owner", &Path::new("shared.txt"), b"hi".to_vec()).await.unwrap();

        let (row, mount) = h.sharing.add_member(file.id, owner, member).await.unwrap();
        assert_eq!(row.user_id, member);
        assert!(row.actions.view && row.actions.download);
        assert_eq!(mount.folder.ns_path, "member");
        assert_eq!(mount.source.ns_path, "owner");
        assert_eq!(mount.display_name, "shared.txt");

        let owner_row = h.sharing.get_member(file.id, owner).await.unwrap();
        assert!(owner_row.is_some());

        h.sharing.remove_member(file.id, owner, member).await.unwrap();
        assert!(h.sharing.get_member(file.id, member).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_member_requires_reshare_permission() {
        let h = setup();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let member = Uuid::new_v4();
        make_namespace(&h, "owner", owner);
        make_namespace(&h, "member", member);

        let file = h.core.create_file("owner", &Path::new("shared.txt"), b"hi".to_vec()).await.unwrap();

        let err = h.sharing.add_member(file.id, stranger, member).await.unwrap_err();
        assert!(matches!(err, CoreError::ActionNotAllowed { .. }));
    }
}
