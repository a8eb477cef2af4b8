//! Adapts `nimbus-objectstore-s3`'s flat key-value client to the
//! [`ObjectStore`] contract: keys are `<ns>/<path>`, directories are
//! prefixes, `IterDir` reports `CommonPrefixes` as dir-entries.

use async_trait::async_trait;
use camino::Utf8Path;
use nimbus_objectstore_s3::S3Client;
use tokio::io::AsyncReadExt;

use crate::error::CoreError;

use super::{BoxedReader, DirEntry, ObjectStore, SaveOutcome};

pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    pub fn new(client: S3Client) -> Self {
        S3Store { client }
    }

    fn key(ns: &str, path: &Utf8Path) -> String {
        if path.as_str() == "." {
            format!("{ns}/")
        } else {
            format!("{ns}/{path}")
        }
    }

    fn internal(e: anyhow::Error) -> CoreError {
        CoreError::Internal(e)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn save(&self, ns: &str, path: &Utf8Path, mut content: BoxedReader) -> Result<SaveOutcome, CoreError> {
        let mut buf = Vec::new();
        content.read_to_end(&mut buf).await.map_err(|e| Self::internal(anyhow::Error::new(e)))?;
        let size = buf.len() as u64;
        self.client.put(&Self::key(ns, path), buf).await.map_err(Self::internal)?;
        Ok(SaveOutcome { size })
    }

    async fn download(&self, ns: &str, path: &Utf8Path) -> Result<BoxedReader, CoreError> {
        let bytes = self.client.get(&Self::key(ns, path)).await.map_err(|e| {
            // rust-s3 doesn't give us a typed not-found; treat any GET
            // failure on a path we haven't otherwise validated as a miss.
            if !format!("{e:#}").contains("404") {
                return Self::internal(e);
            }
            CoreError::NotFound { path: path.to_owned() }
        })?;
        Ok(Box::pin(std::io::Cursor::new(bytes)))
    }

    async fn download_dir(&self, ns: &str, path: &Utf8Path) -> Result<BoxedReader, CoreError> {
        let prefix = Self::key(ns, path);
        let objects = self.client.list_recursive(&prefix).await.map_err(Self::internal)?;
        if objects.is_empty() {
            return Err(CoreError::NotADirectory { path: path.to_owned() });
        }
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let opts: zip::write::FileOptions<'_, ()> =
                zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
            for obj in &objects {
                let rel = obj.key.strip_prefix(&prefix).unwrap_or(&obj.key);
                if rel.is_empty() {
                    continue;
                }
                let data = self.client.get(&obj.key).await.map_err(Self::internal)?;
                use std::io::Write;
                zip.start_file(rel, opts).map_err(|e| Self::internal(anyhow::Error::new(e)))?;
                zip.write_all(&data).map_err(|e| Self::internal(anyhow::Error::new(e)))?;
            }
            zip.finish().map_err(|e| Self::internal(anyhow::Error::new(e)))?;
        }
        Ok(Box::pin(std::io::Cursor::new(buf.into_inner())))
    }

    async fn r#move(&self, from_ns: &str, from: &Utf8Path, to_ns: &str, to: &Utf8Path) -> Result<(), CoreError> {
        let from_key = Self::key(from_ns, from);
        let to_key = Self::key(to_ns, to);
        self.client.copy(&from_key, &to_key).await.map_err(Self::internal)?;
        self.client.delete(&from_key).await.map_err(Self::internal)?;
        Ok(())
    }

    async fn move_dir(&self, from_ns: &str, from: &Utf8Path, to_ns: &str, to: &Utf8Path) -> Result<(), CoreError> {
        let from_prefix = format!("{}/", Self::key(from_ns, from).trim_end_matches('/'));
        let to_prefix = format!("{}/", Self::key(to_ns, to).trim_end_matches('/'));
        // Not atomic: see the crate-level doc comment in nimbus-objectstore-s3.
        self.client.move_prefix(&from_prefix, &to_prefix).await.map_err(Self::internal)
    }

    async fn delete(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError> {
        self.client.delete(&Self::key(ns, path)).await.map_err(Self::internal)
    }

    async fn delete_dir(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError> {
        let prefix = format!("{}/", Self::key(ns, path).trim_end_matches('/'));
        let objects = self.client.list_recursive(&prefix).await.map_err(Self::internal)?;
        for obj in objects {
            self.client.delete(&obj.key).await.map_err(Self::internal)?;
        }
        Ok(())
    }

    async fn empty_dir(&self, ns: &str, path: &Utf8Path) -> Result<(), CoreError> {
        self.delete_dir(ns, path).await
    }

    async fn make_dirs(&self, _ns: &str, _path: &Utf8Path) -> Result<(), CoreError> {
        Ok(()) // prefixes need no explicit creation in an object store
    }

    async fn exists(&self, ns: &str, path: &Utf8Path) -> Result<bool, CoreError> {
        self.client.exists(&Self::key(ns, path)).await.map_err(Self::internal)
    }

    async fn iter_dir(&self, ns: &str, path: &Utf8Path) -> Result<Vec<DirEntry>, CoreError> {
        let prefix = Self::key(ns, path);
        let listing = self.client.list_dir(&prefix).await.map_err(Self::internal)?;
        let mut out = Vec::new();
        for cp in listing.common_prefixes {
            let name = cp.trim_end_matches('/').rsplit('/').next().unwrap_or(&cp).to_string();
            out.push(DirEntry {
                name,
                path: cp.trim_end_matches('/').to_string(),
                size: 0,
                modified_at: None,
                is_dir: true,
            });
        }
        for obj in listing.objects {
            let name = obj.key.rsplit('/').next().unwrap_or(&obj.key).to_string();
            out.push(DirEntry {
                name,
                path: obj.key,
                size: obj.size,
                modified_at: None,
                is_dir: false,
            });
        }
        Ok(out)
    }
}
