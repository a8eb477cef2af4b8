//! In-memory object store, used as a test double for services that don't
//! want to touch the filesystem.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use camino::Utf8Path;
use tokio::io::AsyncReadExt;

use crate::error::CoreError;

use super::{BoxedReader, DirEntry, ObjectStore, SaveOutcome};

#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(ns: &str, path: &Utf8Path) -> (String, String) {
        (ns.to_string(), path.as_str().to_lowercase())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn save(&self, ns: &str, path: &Utf8Path, mut content: BoxedReader) -> Result<SaveOutcome, CoreError> {
        let mut buf = Vec::new();
        content.read_to_end(&mut buf).await.map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
        let size = buf.len() as u64;
        self.blobs.lock().unwrap().insert(Self::key(ns, path), buf);
        Ok(SaveOutcome { size })
    }

    async fn download(&self, ns: &str, path: &Utf8Path) -> Result<BoxedReader, CoreError> {
        let blobs = self.blobs.lock().unwrap();
        let bytes = blobs
            .get(&Self::key(ns, path))
            .cloned()
            .ok_or_else(|| CoreError::NotFound { path: path.to_owned() })?;
        Ok(Box::pin(std::io::Cursor::new(bytes)))
    }

    async fn download_dir(&self, ns: &str, path: &Utf8Path) -> Result<BoxedReader, CoreError> {
        let prefix = format!("{}/", path.as_str().to_lowercase());
        let blobs = self.blobs.lock().unwrap();
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let opts: zip::write::FileOptions<'_, ()> =
                zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
            for ((entry_ns, entry_path), data) in blobs.iter() {
                if entry_ns == ns && (entry_path.starts_with(&prefix) || path.as_str() == ".") {
                    use std::io::Write;
                    zip.start_file(entry_path.clone(), opts).map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
                    zip.write_all(data).map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
                }
            }
            zip.finish().map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
        }
        Ok(Box::pin(std::io::Cursor::new(buf.into_inner())))
    }

    async fn r#move(&self, from_ns: &str, from: &Utf8Path, to_ns: &str, to: &Utf8Path) -> Result<(), CoreError> {
        let mut blobs = self.blobs.lock().unwrap();
        let data = blobs
            .remove(&Self::key(from_ns, from))
            .ok_or_else(|| CoreError::NotFound { path: from.to_owned() })?;
        blobs.insert(Self::key(to_ns, to), data);
        Ok(())
    }

    async fn move_dir(&self, from_ns: &str, from: &Utf8Path, to_ns: &str, to: &Utf8Path) -> Result<(), CoreError> {
        let from_prefix = format!("{}/", from.as_str().to_lowercase());
        let mut blobs = self.blobs.lock().unwrap();
        let matching: Vec<(String, String)> = blobs
            .keys()
            .filter(|(n, p)| n == from_ns && (p == &from.as_str().to_lowercase() || p.starts_with(&from_prefix)))
            .cloned()
            .collect();
        for key @ (_, p) in matching {
            let data = blobs.remove(&key).unwrap();
            let rel = p.strip_prefix(&from.as_str().to_lowercase()).unwrap_or("");
            let new_path = format!("{}{}", to.as_str(), rel);
            blobs.insert((to_ns.to_string(), new_path.to_lowercase()), data);
        }
        Ok(())
    }

    async fn delete(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError> {
        self.blobs
            .lock()
            .unwrap()
            .remove(&Self::key(ns, path))
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound { path: path.to_owned() })
    }

    async fn delete_dir(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError> {
        let prefix = format!("{}/", path.as_str().to_lowercase());
        self.blobs.lock().unwrap().retain(|(n, p), _| !(n == ns && (p == &path.as_str().to_lowercase() || p.starts_with(&prefix))));
        Ok(())
    }

    async fn empty_dir(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError> {
        self.delete_dir(ns, path).await
    }

    async fn make_dirs(&self, _ns: &str, _path: &Utf8Path) -> Result<(), CoreError> {
        Ok(()) // directories are implicit in a flat key-value store
    }

    async fn exists(&self, ns: &str, path: &Utf8Path) -> Result<bool, CoreError> {
        Ok(self.blobs.lock().unwrap().contains_key(&Self::key(ns, path)))
    }

    async fn iter_dir(&self, ns: &str, path: &Utf8Path) -> Result<Vec<DirEntry>, CoreError> {
        let prefix = if path.as_str() == "." { String::new() } else { format!("{}/", path.as_str().to_lowercase()) };
        let blobs = self.blobs.lock().unwrap();
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for ((entry_ns, entry_path), data) in blobs.iter() {
            if entry_ns != ns || !entry_path.starts_with(&prefix) {
                continue;
            }
            let rest = &entry_path[prefix.len()..];
            let name = rest.split('/').next().unwrap_or(rest);
            if name.is_empty() || !seen.insert(name.to_string()) {
                continue;
            }
            let is_dir = rest.contains('/');
            out.push(DirEntry {
                name: name.to_string(),
                path: format!("{prefix}{name}"),
                size: if is_dir { 0 } else { data.len() as u64 },
                modified_at: None,
                is_dir,
            });
        }
        Ok(out)
    }
}
