//! Content hashing: the Dropbox-style content hash used to key dedup and
//! the content pipeline, plus a streaming wrapper to compute it without
//! buffering the blob twice.

use std::io;
use std::io::prelude::*;

use sha2::{Digest, Sha256};

/// Chunk size used when hashing content: SHA-256 of the concatenation of
/// the SHA-256 digests of successive chunks this size.
pub const CHASH_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Dropbox-style content hash: SHA-256 over the concatenation of the
/// SHA-256 digests of each successive 4 MiB chunk. Empty content hashes
/// to the empty string, not the hash of zero bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    let mut overall = Sha256::new();
    for chunk in bytes.chunks(CHASH_CHUNK_SIZE) {
        overall.update(Sha256::digest(chunk));
    }
    hex::encode(overall.finalize())
}

/// Streaming equivalent of [`content_hash`], for blobs too big to hold in
/// memory twice over; wraps a reader and accumulates chunk digests as it
/// is consumed.
pub struct ContentHasher<R> {
    inner: R,
    chunk: Sha256,
    chunk_len: usize,
    overall: Sha256,
    any_bytes: bool,
}

impl<R: Read> ContentHasher<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            chunk: Sha256::new(),
            chunk_len: 0,
            overall: Sha256::new(),
            any_bytes: false,
        }
    }

    /// Finalize and return the content hash, consuming the wrapped reader.
    pub fn finalize(mut self) -> (String, R) {
        if self.chunk_len > 0 {
            self.overall.update(self.chunk.finalize_reset());
        }
        let hash = if self.any_bytes {
            hex::encode(self.overall.finalize())
        } else {
            String::new()
        };
        (hash, self.inner)
    }
}

impl<R: Read> Read for ContentHasher<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        if count > 0 {
            self.any_bytes = true;
        }
        let mut remaining = &buf[..count];
        while !remaining.is_empty() {
            let take = remaining.len().min(CHASH_CHUNK_SIZE - self.chunk_len);
            self.chunk.update(&remaining[..take]);
            self.chunk_len += take;
            remaining = &remaining[take..];
            if self.chunk_len == CHASH_CHUNK_SIZE {
                self.overall.update(self.chunk.finalize_reset());
                self.chunk_len = 0;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_content_hashes_to_empty_string() {
        assert_eq!(content_hash(b""), "");
    }

    #[test]
    fn single_chunk_matches_manual_double_sha256() {
        let data = b"hello world";
        let mut overall = Sha256::new();
        overall.update(Sha256::digest(data));
        let expected = hex::encode(overall.finalize());
        assert_eq!(content_hash(data), expected);
    }

    #[test]
    fn streaming_matches_buffered() {
        let data = vec![7u8; CHASH_CHUNK_SIZE + 123];
        let buffered = content_hash(&data);
        let mut hasher = ContentHasher::new(io::Cursor::new(data));
        io::copy(&mut hasher, &mut io::sink()).unwrap();
        let (streamed, _) = hasher.finalize();
        assert_eq!(buffered, streamed);
    }

    #[test]
    fn two_full_chunks() {
        let mut data = vec![1u8; CHASH_CHUNK_SIZE];
        data.extend(vec![2u8; CHASH_CHUNK_SIZE]);
        let mut overall = Sha256::new();
        overall.update(Sha256::digest(&data[..CHASH_CHUNK_SIZE]));
        overall.update(Sha256::digest(&data[CHASH_CHUNK_SIZE..]));
        let expected = hex::encode(overall.finalize());
        assert_eq!(content_hash(&data), expected);
    }
}
