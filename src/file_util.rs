//! Filesystem helpers shared by the local object store backend: reading
//! files into buffers or memory maps, and atomic write/move primitives.

use std::fs::File;
use std::io::prelude::*;
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8Path;

/// A loaded file, either as a buffer (if it's small) or as a memory map.
#[derive(Debug)]
pub enum LoadedFile {
    Buffered(Vec<u8>),
    Mapped(memmap2::Mmap),
}

impl LoadedFile {
    pub fn bytes(&self) -> &[u8] {
        match self {
            LoadedFile::Buffered(vec) => vec,
            LoadedFile::Mapped(map) => map,
        }
    }
}

/// Reads an entire file if it's small enough, memory maps it otherwise.
pub fn read_file(path: &Utf8Path) -> Result<Arc<LoadedFile>> {
    const MEGA: u64 = 1024 * 1024;

    let mut fh = File::open(path).with_context(|| format!("Couldn't open {path}"))?;
    let file_length = fh.metadata()?.len();

    let file = if file_length < 10 * MEGA {
        tracing::trace!("{path} is < 10MB, reading to buffer");
        let mut buffer = Vec::with_capacity(file_length as usize);
        fh.read_to_end(&mut buffer)?;
        LoadedFile::Buffered(buffer)
    } else {
        tracing::trace!("{path} is > 10MB, memory mapping");
        // SAFETY: the file is opened read-only for the lifetime of this
        // mapping and not concurrently truncated by anything this process
        // controls; the object store treats blobs as immutable once
        // written (writes land at a `.part` path and are renamed in).
        let mapping = unsafe { memmap2::Mmap::map(&fh)? };
        LoadedFile::Mapped(mapping)
    };

    Ok(Arc::new(file))
}

#[cfg(unix)]
pub fn move_opened(from: &Utf8Path, from_fh: File, to: &Utf8Path) -> Result<()> {
    // POSIX lets us rename opened files. Neat!
    match std::fs::rename(from, to) {
        Ok(()) => {
            tracing::debug!("Renamed {from} to {to}");
            Ok(())
        }
        Err(e) if e.raw_os_error() == Some(18) /* EXDEV */ => move_by_copy(from, from_fh, to),
        Err(e) => Err(e).with_context(|| format!("Couldn't rename {from} to {to}")),
    }
}

#[cfg(windows)]
pub fn move_opened(from: &Utf8Path, from_fh: File, to: &Utf8Path) -> Result<()> {
    // On Windows, we can't move an open file. Boo, Windows.
    move_by_copy(from, from_fh, to)
}

fn move_by_copy(from: &Utf8Path, mut from_fh: File, to: &Utf8Path) -> Result<()> {
    from_fh.seek(std::io::SeekFrom::Start(0))?;
    safe_copy_to_file(from_fh, to)?;

    std::fs::remove_file(from).with_context(|| format!("Couldn't remove {from}"))?;
    tracing::debug!("Moved {from} to {to}");
    Ok(())
}

/// Copies the reader to a new file at `to + ".part"`, then renames to `to`.
///
/// Guarantees `to` never contains a partial file, even if the process
/// dies mid-copy.
pub fn safe_copy_to_file<R: Read>(mut from: R, to: &Utf8Path) -> Result<()> {
    let to_part = camino::Utf8PathBuf::from(format!("{to}.part"));

    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Couldn't create {parent}"))?;
    }

    let mut to_fh = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&to_part)
        .with_context(|| format!("Couldn't open {to_part}"))?;

    std::io::copy(&mut from, &mut to_fh).with_context(|| format!("Couldn't write {to_part}"))?;
    drop(from);

    to_fh
        .sync_all()
        .with_context(|| format!("Couldn't sync {to_part}"))?;
    drop(to_fh);

    std::fs::rename(&to_part, to)
        .with_context(|| format!("Couldn't rename {to_part} to {to}"))
}
