//! Service configuration, loaded from `~/.config/nimbus.toml`.

use std::{fs, io};

use anyhow::{anyhow, Context, Result};
use byte_unit::Byte;
use camino::Utf8PathBuf;
use serde::Deserialize;

#[inline]
fn default_upload_size_limit() -> Byte {
    Byte::from_u64(100 * 1024 * 1024) // 100 MiB
}

#[inline]
fn default_max_thumbnailable_size() -> Byte {
    Byte::from_u64(50 * 1024 * 1024) // 50 MiB
}

#[inline]
fn default_thumbnail_sizes() -> Vec<u32> {
    vec![64, 128, 256, 512, 1024, 1920]
}

#[inline]
fn default_dedup_max_distance() -> u32 {
    5
}

#[inline]
fn default_db_retry_attempts() -> u32 {
    3
}

#[inline]
fn default_create_file_retry_attempts() -> u32 {
    10
}

#[inline]
fn default_thumbnail_lock_expire_secs() -> u64 {
    30
}

/// Tunables for the core. Anything not set in the TOML file falls back to
/// the same defaults as [`Configuration::default`].
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_upload_size_limit")]
    pub upload_size_limit: Byte,

    #[serde(default = "default_max_thumbnailable_size")]
    pub max_thumbnailable_size: Byte,

    #[serde(default = "default_thumbnail_sizes")]
    pub thumbnail_sizes: Vec<u32>,

    #[serde(default = "default_dedup_max_distance")]
    pub dedup_max_distance: u32,

    #[serde(default = "default_db_retry_attempts")]
    pub db_retry_attempts: u32,

    #[serde(default = "default_create_file_retry_attempts")]
    pub create_file_retry_attempts: u32,

    #[serde(default = "default_thumbnail_lock_expire_secs")]
    pub thumbnail_lock_expire_secs: u64,

    /// Root for the local filesystem object store backend, when used.
    #[serde(default)]
    pub object_store_root: Option<Utf8PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            upload_size_limit: default_upload_size_limit(),
            max_thumbnailable_size: default_max_thumbnailable_size(),
            thumbnail_sizes: default_thumbnail_sizes(),
            dedup_max_distance: default_dedup_max_distance(),
            db_retry_attempts: default_db_retry_attempts(),
            create_file_retry_attempts: default_create_file_retry_attempts(),
            thumbnail_lock_expire_secs: default_thumbnail_lock_expire_secs(),
            object_store_root: None,
        }
    }
}

/// Load configuration from `~/.config/nimbus.toml`, falling back to
/// [`Configuration::default`] if the file doesn't exist.
pub fn load() -> Result<Configuration> {
    let mut confpath: Utf8PathBuf = home::home_dir()
        .ok_or_else(|| anyhow!("Can't find home directory"))?
        .try_into()
        .context("Home directory isn't UTF-8")?;
    confpath.extend([".config", "nimbus.toml"]);
    let s = match fs::read_to_string(&confpath) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Configuration::default()),
        found => found,
    }
    .with_context(|| format!("Couldn't open {confpath}"))?;
    let conf = toml::from_str(&s).with_context(|| format!("Couldn't parse {confpath}"))?;
    Ok(conf)
}
