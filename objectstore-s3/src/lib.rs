//! S3-style backend for the object store: treats key prefixes as
//! directories. `IterDir` surfaces `CommonPrefixes` from `ListObjectsV2` as
//! directory entries; `DownloadDir` is left to the caller (`nimbus-core`
//! builds the zip stream itself from this crate's listing + get calls, to
//! keep the zip-writing dependency out of this crate).
//!
//! `MoveDir` here is a listing-then-copy-then-delete loop: not atomic with
//! a concurrent writer to the source prefix. Document this at the call
//! site, don't paper over it.

use anyhow::{Context, Result};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;

pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub objects: Vec<ObjectEntry>,
    /// Directory-like prefixes one level under the queried prefix.
    pub common_prefixes: Vec<String>,
}

/// Thin wrapper around an S3 bucket handle, namespaced by key prefix.
pub struct S3Client {
    bucket: Box<Bucket>,
}

impl S3Client {
    pub fn new(cfg: S3Config) -> Result<Self> {
        let region = match cfg.endpoint {
            Some(endpoint) => Region::Custom { region: cfg.region, endpoint },
            None => cfg.region.parse().context("invalid S3 region")?,
        };
        let credentials = Credentials::new(
            cfg.access_key.as_deref(),
            cfg.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .context("couldn't build S3 credentials")?;
        let mut bucket = Bucket::new(&cfg.bucket, region, credentials)
            .context("couldn't construct S3 bucket handle")?;
        if cfg.path_style {
            bucket = bucket.with_path_style();
        }
        Ok(S3Client { bucket })
    }

    pub async fn put(&self, key: &str, content: Vec<u8>) -> Result<()> {
        self.bucket
            .put_object(key, &content)
            .await
            .with_context(|| format!("couldn't PUT {key}"))?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .bucket
            .get_object(key)
            .await
            .with_context(|| format!("couldn't GET {key}"))?;
        Ok(resp.bytes().to_vec())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.bucket
            .delete_object(key)
            .await
            .with_context(|| format!("couldn't DELETE {key}"))?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self.bucket.head_object(key).await {
            Ok(_) => Ok(true),
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("couldn't HEAD {key}")),
        }
    }

    /// `ListObjectsV2` with `/` as delimiter: one page of direct children
    /// under `prefix`, objects and sub-prefixes separated, the way S3
    /// reports `CommonPrefixes` for a prefix-as-directory tree.
    pub async fn list_dir(&self, prefix: &str) -> Result<ListResult> {
        let normalized = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };
        let pages = self
            .bucket
            .list(normalized.clone(), Some("/".to_string()))
            .await
            .with_context(|| format!("couldn't LIST {normalized}"))?;

        let mut out = ListResult::default();
        for page in pages {
            for obj in page.contents {
                if obj.key == normalized {
                    continue; // the "directory marker" object itself
                }
                out.objects.push(ObjectEntry {
                    key: obj.key,
                    size: obj.size,
                    last_modified: obj.last_modified,
                });
            }
            for cp in page.common_prefixes.unwrap_or_default() {
                out.common_prefixes.push(cp.prefix);
            }
        }
        Ok(out)
    }

    /// Recursively list every object under `prefix` (no delimiter), for
    /// move/delete/reindex walks that need the whole subtree at once.
    pub async fn list_recursive(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let pages = self
            .bucket
            .list(prefix.to_string(), None)
            .await
            .with_context(|| format!("couldn't LIST {prefix}"))?;
        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|obj| ObjectEntry {
                key: obj.key,
                size: obj.size,
                last_modified: obj.last_modified,
            })
            .collect())
    }

    /// Server-side copy, the building block `Move`/`MoveDir` use instead
    /// of a download/upload round trip.
    pub async fn copy(&self, from_key: &str, to_key: &str) -> Result<()> {
        self.bucket
            .copy_object_internal(from_key, to_key)
            .await
            .with_context(|| format!("couldn't COPY {from_key} to {to_key}"))?;
        Ok(())
    }

    /// Copy-then-delete rename of every object under `from_prefix` to
    /// `to_prefix`. Not atomic: a concurrent writer to `from_prefix`
    /// during this call can leave the source and destination
    /// inconsistent with each other. Callers that need strong
    /// consistency here should rely on `ReindexContents` afterward.
    pub async fn move_prefix(&self, from_prefix: &str, to_prefix: &str) -> Result<()> {
        let objects = self.list_recursive(from_prefix).await?;
        for obj in &objects {
            let suffix = obj.key.strip_prefix(from_prefix).unwrap_or(&obj.key);
            let dest = format!("{to_prefix}{suffix}");
            self.copy(&obj.key, &dest).await?;
        }
        for obj in &objects {
            self.delete(&obj.key).await?;
        }
        Ok(())
    }
}
