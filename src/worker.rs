//! Background job dispatch: the slow or deferrable half of a request --
//! content processing, blob purges, bulk moves -- runs here instead of on
//! a caller's request path. `InProcessWorker` runs jobs as ordinary tokio
//! tasks and keeps their status/result in memory; a multi-process
//! deployment would swap this for a durable queue without changing the
//! `Worker` trait or any call site.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::content::ContentService;
use crate::core::FileCore;
use crate::error::CoreError;
use crate::file_service::FileService;
use crate::namespace_usecase::NamespaceUseCase;
use crate::path::Path;

#[derive(Debug, Clone)]
pub enum Job {
    ProcessFileContent { ns: String, path: Path },
    GenerateFileThumbnails { content: Vec<u8>, media_type: String, content_hash: String },
    ProcessFilePendingDeletion { limit: i64 },
    DeleteImmediatelyBatch { ns: String, paths: Vec<Path> },
    EmptyTrash { ns: String },
    MoveBatch { moves: Vec<(String, Path, String, Path)> },
    MoveToTrashBatch { ns: String, paths: Vec<Path> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// The outcome of a completed job. Batch jobs (move, delete, trash) report
/// one result per input item rather than failing the whole batch on the
/// first error, since a caller that asked to move ten files wants to know
/// which nine succeeded.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Unit,
    Count(usize),
    ItemResults(Vec<ItemResult>),
}

#[derive(Debug, Clone)]
pub struct ItemResult {
    pub index: usize,
    pub error: Option<String>,
}

#[async_trait]
pub trait Worker: Send + Sync {
    async fn enqueue(&self, job: Job) -> Uuid;

    async fn get_status(&self, id: Uuid) -> Option<JobStatus>;

    /// `None` if the job hasn't been enqueued, is still running, or its
    /// result has been reaped; `Some(Err(_))` if the job itself failed
    /// outright (as opposed to individual items within a batch failing,
    /// which surfaces through `JobOutcome::ItemResults`).
    async fn get_result(&self, id: Uuid) -> Option<Result<JobOutcome, String>>;
}

struct JobRecord {
    status: JobStatus,
    result: Option<Result<JobOutcome, String>>,
}

/// Runs jobs as ordinary tokio tasks sharing this process; status lives in
/// a plain `Mutex<HashMap>` rather than anything durable, so a process
/// restart loses in-flight and completed-but-unreaped job records. Durable
/// work (pending deletions, for one) re-derives its queue from the
/// database on the next `ProcessFilePendingDeletion` run regardless.
pub struct InProcessWorker {
    core: Arc<FileCore>,
    files: Arc<FileService>,
    content: Arc<ContentService>,
    namespaces: Arc<NamespaceUseCase>,
    jobs: Arc<Mutex<HashMap<Uuid, JobRecord>>>,
}

impl InProcessWorker {
    pub fn new(core: Arc<FileCore>, files: Arc<FileService>, content: Arc<ContentService>, namespaces: Arc<NamespaceUseCase>) -> Self {
        InProcessWorker { core, files, content, namespaces, jobs: Arc::new(Mutex::new(HashMap::new())) }
    }

    async fn run(
        core: Arc<FileCore>,
        files: Arc<FileService>,
        content: Arc<ContentService>,
        namespaces: Arc<NamespaceUseCase>,
        job: Job,
    ) -> Result<JobOutcome, String> {
        match job {
            Job::ProcessFileContent { ns, path } => content.process(&ns, &path).await.map(|_| JobOutcome::Unit).map_err(|e| e.to_string()),

            Job::GenerateFileThumbnails { content: bytes, media_type, content_hash } => content
                .thumbnails_for(bytes, &media_type, &content_hash)
                .await
                .map(|_| JobOutcome::Unit)
                .map_err(|e| e.to_string()),

            Job::ProcessFilePendingDeletion { limit } => {
                core.process_pending_deletions(limit).await.map(|v| JobOutcome::Count(v.len())).map_err(|e| e.to_string())
            }

            Job::DeleteImmediatelyBatch { ns, paths } => {
                files.delete_batch(&ns, &paths).await.map(|v| JobOutcome::Count(v.len())).map_err(|e| e.to_string())
            }

            Job::EmptyTrash { ns } => namespaces.empty_trash(&ns).await.map(|_| JobOutcome::Unit).map_err(|e| e.to_string()),

            Job::MoveBatch { moves } => {
                let mut results = Vec::with_capacity(moves.len());
                for (index, (at_ns, at_path, to_ns, to_path)) in moves.into_iter().enumerate() {
                    let error = match files.r#move(&at_ns, &at_path, &to_ns, &to_path).await {
                        Ok(_) => None,
                        Err(e) => Some(e.to_string()),
                    };
                    results.push(ItemResult { index, error });
                }
                Ok(JobOutcome::ItemResults(results))
            }

            Job::MoveToTrashBatch { ns, paths } => {
                let mut results = Vec::with_capacity(paths.len());
                for (index, path) in paths.into_iter().enumerate() {
                    let error = match namespaces.move_item_to_trash(&ns, &path).await {
                        Ok(_) => None,
                        Err(CoreError::NotFound { .. }) => None,
                        Err(e) => Some(e.to_string()),
                    };
                    results.push(ItemResult { index, error });
                }
                Ok(JobOutcome::ItemResults(results))
            }
        }
    }
}

#[async_trait]
impl Worker for InProcessWorker {
    async fn enqueue(&self, job: Job) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.lock().unwrap().insert(id, JobRecord { status: JobStatus::Queued, result: None });

        let core = Arc::clone(&self.core);
        let files = Arc::clone(&self.files);
        let content = Arc::clone(&self.content);
        let namespaces = Arc::clone(&self.namespaces);
        let jobs = Arc::clone(&self.jobs);
        tokio::spawn(async move {
            if let Some(rec) = jobs.lock().unwrap().get_mut(&id) {
                rec.status = JobStatus::Running;
            }
            let result = Self::run(core, files, content, namespaces, job).await;
            let mut jobs = jobs.lock().unwrap();
            if let Some(rec) = jobs.get_mut(&id) {
                rec.status = if result.is_ok() { JobStatus::Completed } else { JobStatus::Failed };
                rec.result = Some(result);
            }
        });

        id
    }

    async fn get_status(&self, id: Uuid) -> Option<JobStatus> {
        self.jobs.lock().unwrap().get(&id).map(|r| r.status.clone())
    }

    async fn get_result(&self, id: Uuid) -> Option<Result<JobOutcome, String>> {
        self.jobs.lock().unwrap().get(&id).and_then(|r| r.result.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::MokaCache;
    use crate::config::Configuration;
    use crate::content::thumbnail::ThumbnailService;
    use crate::db::Handle;
    use crate::dedup::DuplicateFinderService;
    use crate::object_store::MemoryStore;
    use crate::repository;

    fn harness() -> InProcessWorker {
        let db = Arc::new(Handle::open_in_memory().unwrap());
        repository::init_schema(&db).unwrap();
        let config = Configuration::default();
        let store: Arc<dyn crate::object_store::ObjectStore> = Arc::new(MemoryStore::new());
        let cache: Arc<dyn crate::cache::Cache> = Arc::new(MokaCache::new(100));
        let core = Arc::new(FileCore::new(Arc::clone(&db), Arc::clone(&store), config.clone()));
        let mounts = Arc::new(crate::mount_resolver::MountResolver::new(Arc::clone(&db), config.clone()));
        let files = Arc::new(FileService::new(Arc::clone(&core), mounts, Arc::clone(&db), config.clone()));
        let thumbnails = Arc::new(ThumbnailService::new(Arc::clone(&store), cache, config.clone()));
        let content = Arc::new(ContentService::new(Arc::clone(&core), Arc::clone(&store), Arc::clone(&db), thumbnails, config.clone()));
        let dedup = Arc::new(DuplicateFinderService::new(Arc::clone(&db), config.clone()));
        let namespaces = Arc::new(NamespaceUseCase::new(Arc::clone(&files), Arc::clone(&core), Arc::clone(&content), dedup, Arc::clone(&db), config));
        InProcessWorker::new(core, files, content, namespaces)
    }

    #[tokio::test]
    async fn unknown_job_status_is_none() {
        let worker = harness();
        assert!(worker.get_status(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn pending_deletion_job_runs_to_completion() {
        let worker = harness();
        let id = worker.enqueue(Job::ProcessFilePendingDeletion { limit: 10 }).await;
        for _ in 0..50 {
            if worker.get_status(id).await == Some(JobStatus::Completed) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(worker.get_status(id).await, Some(JobStatus::Completed));
        match worker.get_result(id).await {
            Some(Ok(JobOutcome::Count(0))) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
