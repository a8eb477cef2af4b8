//! Local filesystem object store backend: `<root>/<ns>/<path>`.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use jiff::Timestamp;
use tokio::io::AsyncWriteExt;

use crate::error::CoreError;
use crate::file_util;

use super::{BoxedReader, DirEntry, ObjectStore, SaveOutcome};

pub struct LocalStore {
    root: Utf8PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        LocalStore { root: root.into() }
    }

    fn full_path(&self, ns: &str, path: &Utf8Path) -> Utf8PathBuf {
        let mut p = self.root.join(ns);
        if path.as_str() != "." {
            p.push(path);
        }
        p
    }

    fn not_found(&self, path: &Utf8Path) -> CoreError {
        CoreError::NotFound { path: path.to_owned() }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn save(&self, ns: &str, path: &Utf8Path, mut content: BoxedReader) -> Result<SaveOutcome, CoreError> {
        let dest = self.full_path(ns, path);
        let dest_owned = dest.clone();
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
        }
        let part_path = Utf8PathBuf::from(format!("{dest}.part"));
        let mut part = tokio::fs::File::create(&part_path)
            .await
            .map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
        let written = tokio::io::copy(&mut content, &mut part)
            .await
            .map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
        part.flush().await.map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
        part.sync_all().await.map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
        drop(part);
        tokio::fs::rename(&part_path, &dest_owned)
            .await
            .map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
        Ok(SaveOutcome { size: written })
    }

    async fn download(&self, ns: &str, path: &Utf8Path) -> Result<BoxedReader, CoreError> {
        let full = self.full_path(ns, path);
        let fh = tokio::fs::File::open(&full)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    self.not_found(path)
                } else {
                    CoreError::Internal(anyhow::Error::new(e))
                }
            })?;
        Ok(Box::pin(fh))
    }

    async fn download_dir(&self, ns: &str, path: &Utf8Path) -> Result<BoxedReader, CoreError> {
        let full = self.full_path(ns, path);
        if !full.is_dir() {
            return Err(CoreError::NotADirectory { path: path.to_owned() });
        }
        let full = full.clone();
        let bytes = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
            let mut buf = std::io::Cursor::new(Vec::new());
            {
                let mut zip = zip::ZipWriter::new(&mut buf);
                let opts: zip::write::FileOptions<'_, ()> = zip::write::FileOptions::default()
                    .compression_method(zip::CompressionMethod::Deflated);
                for entry in walk(&full)? {
                    let rel = entry.strip_prefix(&full)?.to_string_lossy().replace('\\', "/");
                    if entry.is_dir() {
                        zip.add_directory(format!("{rel}/"), opts)?;
                    } else {
                        zip.start_file(rel, opts)?;
                        let data = std::fs::read(&entry)?;
                        use std::io::Write;
                        zip.write_all(&data)?;
                    }
                }
                zip.finish()?;
            }
            Ok(buf.into_inner())
        })
        .await
        .map_err(|e| CoreError::Internal(anyhow::anyhow!(e)))?
        .map_err(CoreError::Internal)?;
        Ok(Box::pin(std::io::Cursor::new(bytes)))
    }

    async fn r#move(&self, from_ns: &str, from: &Utf8Path, to_ns: &str, to: &Utf8Path) -> Result<(), CoreError> {
        let from_full = self.full_path(from_ns, from);
        let to_full = self.full_path(to_ns, to);
        if let Some(parent) = to_full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
        }
        match tokio::fs::rename(&from_full, &to_full).await {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(18) => {
                // Cross-device: fall back to copy + remove.
                let from_full2 = from_full.clone();
                let to_full2 = to_full.clone();
                tokio::task::spawn_blocking(move || {
                    let fh = std::fs::File::open(&from_full2)?;
                    file_util::move_opened(&from_full2, fh, &to_full2)
                })
                .await
                .map_err(|e| CoreError::Internal(anyhow::anyhow!(e)))?
                .map_err(CoreError::Internal)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(self.not_found(from)),
            Err(e) => Err(CoreError::Internal(anyhow::Error::new(e))),
        }
    }

    async fn move_dir(&self, from_ns: &str, from: &Utf8Path, to_ns: &str, to: &Utf8Path) -> Result<(), CoreError> {
        // Local filesystem rename of a directory is atomic on one
        // filesystem; the non-atomicity caveat in the spec applies to the
        // S3-style backend, not this one.
        self.r#move(from_ns, from, to_ns, to).await
    }

    async fn delete(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError> {
        let full = self.full_path(ns, path);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(self.not_found(path)),
            Err(e) => Err(CoreError::Internal(anyhow::Error::new(e))),
        }
    }

    async fn delete_dir(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError> {
        let full = self.full_path(ns, path);
        match tokio::fs::remove_dir_all(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(self.not_found(path)),
            Err(e) => Err(CoreError::Internal(anyhow::Error::new(e))),
        }
    }

    async fn empty_dir(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError> {
        let full = self.full_path(ns, path);
        let mut entries = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    self.not_found(path)
                } else {
                    CoreError::Internal(anyhow::Error::new(e))
                }
            })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| CoreError::Internal(anyhow::Error::new(e)))? {
            let ft = entry.file_type().await.map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
            if ft.is_dir() {
                tokio::fs::remove_dir_all(entry.path()).await
            } else {
                tokio::fs::remove_file(entry.path()).await
            }
            .map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
        }
        Ok(())
    }

    async fn make_dirs(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError> {
        let full = self.full_path(ns, path);
        tokio::fs::create_dir_all(&full).await.map_err(|e| CoreError::Internal(anyhow::Error::new(e)))
    }

    async fn exists(&self, ns: &str, path: &Utf8Path) -> Result<bool, CoreError> {
        let full = self.full_path(ns, path);
        Ok(tokio::fs::metadata(&full).await.is_ok())
    }

    async fn iter_dir(&self, ns: &str, path: &Utf8Path) -> Result<Vec<DirEntry>, CoreError> {
        let full = self.full_path(ns, path);
        let mut reader = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    self.not_found(path)
                } else {
                    CoreError::Internal(anyhow::Error::new(e))
                }
            })?;
        let mut out = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| CoreError::Internal(anyhow::Error::new(e)))? {
            let meta = entry.metadata().await.map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
            let name = entry.file_name().to_string_lossy().to_string();
            out.push(DirEntry {
                path: if path.as_str() == "." { name.clone() } else { format!("{path}/{name}") },
                name,
                size: meta.len(),
                modified_at: meta.modified().ok().and_then(|t| Timestamp::try_from(t).ok()),
                is_dir: meta.is_dir(),
            });
        }
        Ok(out)
    }
}

fn walk(root: &Utf8Path) -> anyhow::Result<Vec<Utf8PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_owned()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let p = Utf8PathBuf::try_from(entry.path())?;
            if entry.file_type()?.is_dir() {
                stack.push(p.clone());
            }
            out.push(p);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    fn reader_of(bytes: &'static [u8]) -> BoxedReader {
        Box::pin(std::io::Cursor::new(bytes))
    }

    #[tokio::test]
    async fn save_then_download_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(Utf8PathBuf::try_from(dir.path().to_owned()).unwrap());
        let path = Utf8Path::new("a/b/f.txt");
        let outcome = store.save("u", path, reader_of(b"hello")).await.unwrap();
        assert_eq!(outcome.size, 5);

        let mut reader = store.download("u", path).await.unwrap();
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buf).await.unwrap();
        assert_eq!(buf, b"hello");
    }

    #[tokio::test]
    async fn download_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(Utf8PathBuf::try_from(dir.path().to_owned()).unwrap());
        let err = store.download("u", Utf8Path::new("nope.txt")).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn iter_dir_lists_children() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(Utf8PathBuf::try_from(dir.path().to_owned()).unwrap());
        store.save("u", Utf8Path::new("a/one.txt"), reader_of(b"1")).await.unwrap();
        store.save("u", Utf8Path::new("a/two.txt"), reader_of(b"22")).await.unwrap();
        let mut entries = store.iter_dir("u", Utf8Path::new("a")).await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "one.txt");
        assert_eq!(entries[0].size, 1);
    }
}
