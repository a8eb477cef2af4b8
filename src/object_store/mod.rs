//! Blob I/O: the contract every object store backend (local filesystem,
//! S3-style, in-memory test double) implements.
//!
//! Namespace+path addressing mirrors the metadata tree verbatim, with
//! original casing preserved; `thumbs` is a separate, flat namespace (see
//! `content::thumbnail`).

mod local;
mod memory;
mod s3;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use s3::S3Store;

use async_trait::async_trait;
use camino::Utf8Path;
use jiff::Timestamp;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::CoreError;

/// The size and whatever else the store wants to report back after a
/// successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub modified_at: Option<Timestamp>,
    pub is_dir: bool,
}

pub type BoxedReader = std::pin::Pin<Box<dyn AsyncRead + Send + Unpin>>;
pub type BoxedWriter = std::pin::Pin<Box<dyn AsyncWrite + Send + Unpin>>;

/// Blob storage for one logical tree. `ns` is the namespace's stable path
/// key; `path` is always namespace-relative and uses `/` separators
/// regardless of host OS.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn save(&self, ns: &str, path: &Utf8Path, content: BoxedReader) -> Result<SaveOutcome, CoreError>;

    async fn download(&self, ns: &str, path: &Utf8Path) -> Result<BoxedReader, CoreError>;

    /// Stream a zip archive of everything under `path`.
    async fn download_dir(&self, ns: &str, path: &Utf8Path) -> Result<BoxedReader, CoreError>;

    async fn r#move(&self, from_ns: &str, from: &Utf8Path, to_ns: &str, to: &Utf8Path) -> Result<(), CoreError>;

    /// Not guaranteed atomic with a concurrent writer to `from` on
    /// prefix-based backends (S3-style); see `DESIGN.md`.
    async fn move_dir(&self, from_ns: &str, from: &Utf8Path, to_ns: &str, to: &Utf8Path) -> Result<(), CoreError>;

    async fn delete(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError>;

    async fn delete_dir(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError>;

    /// Remove every child of `path` without removing `path` itself.
    async fn empty_dir(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError>;

    async fn make_dirs(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError>;

    async fn exists(&self, ns: &str, path: &Utf8Path) -> Result<bool, CoreError>;

    /// Direct (non-recursive) children of `path`.
    async fn iter_dir(&self, ns: &str, path: &Utf8Path) -> Result<Vec<DirEntry>, CoreError>;
}
