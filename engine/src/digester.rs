//! Streaming digest of a single file.
//!
//! The file is read in fixed-size chunks and each chunk is fed to the
//! accumulator before the next read, so memory use is bounded by the chunk
//! size no matter how large the file is. The cancel token is polled before
//! every read; cancellation latency is at most one chunk of I/O.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::cancel::CancelToken;
use crate::checksums::{create_hasher, ChecksumAlgorithm, DigestValue};
use crate::error::DigestError;
use crate::model::{DigestRecord, FileReference};

/// Default read size per chunk (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Reads one file at a time and produces its digest.
///
/// A `FileDigester` holds no per-file state, so one instance can be shared by
/// every worker; each call owns its own file handle and accumulator.
#[derive(Debug, Clone, Copy)]
pub struct FileDigester {
    algorithm: ChecksumAlgorithm,
    chunk_size: usize,
}

impl FileDigester {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        FileDigester {
            algorithm,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the chunk size. Zero is treated as one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Digest the file behind `file`.
    ///
    /// The handle is dropped on every exit path. No partial record is ever
    /// returned: the result is either a complete digest, an I/O error, or
    /// `DigestError::Cancelled`.
    pub fn digest(
        &self,
        file: &FileReference,
        cancel: &CancelToken,
    ) -> Result<DigestRecord, DigestError> {
        if cancel.is_cancelled() {
            return Err(DigestError::Cancelled {
                path: file.path.clone(),
            });
        }

        let handle = File::open(&file.path).map_err(|e| DigestError::Io {
            path: file.path.clone(),
            source: e,
        })?;

        let (digest, bytes_read) = self.digest_reader(&file.path, handle, cancel)?;

        tracing::trace!(key = %file.key, bytes_read, "digest finished");

        Ok(DigestRecord {
            file: file.clone(),
            digest,
            bytes_read,
        })
    }

    /// The chunk loop over any reader. `path` only labels errors.
    pub fn digest_reader<R: Read>(
        &self,
        path: &Path,
        mut reader: R,
        cancel: &CancelToken,
    ) -> Result<(DigestValue, u64), DigestError> {
        let mut hasher = create_hasher(self.algorithm);
        let mut buffer = vec![0u8; self.chunk_size];
        let mut bytes_read: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(DigestError::Cancelled {
                    path: path.to_path_buf(),
                });
            }

            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(DigestError::Io {
                        path: path.to_path_buf(),
                        source: e,
                    })
                }
            };

            hasher.update(&buffer[..n]);
            bytes_read += n as u64;
        }

        Ok((hasher.finalize(), bytes_read))
    }
}
