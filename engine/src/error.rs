//! Error types for the digest engine.
//!
//! `EngineError` covers run-level problems that prevent a run from starting
//! (invalid input, an unreadable root directory). Per-file problems are never
//! returned as `EngineError`; they become `FailureRecord`s in the run report.
//! `DigestError` is what a single file digest can fail with, and
//! `ManifestError` covers reading and writing manifest files.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::checksums::{ChecksumAlgorithm, DigestParseError};

/// Errors that prevent a run (or its preparation) from happening at all.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The batch contained no files
    #[error("no files to process")]
    EmptyBatch,

    /// Concurrency limit of zero would never admit a file
    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,

    /// The same logical key appears twice in one batch
    #[error("file '{key}' appears more than once in the batch")]
    DuplicateFile { key: String },

    /// VERIFY mode needs a non-empty expected index
    #[error("verify mode requires a non-empty expected digest index")]
    MissingExpectedIndex,

    /// Expected digests were produced with another algorithm than the run's
    #[error("expected digests use {expected}, but the engine is configured for {configured}")]
    AlgorithmMismatch {
        expected: ChecksumAlgorithm,
        configured: ChecksumAlgorithm,
    },

    /// Root directory does not exist
    #[error("directory not found: {}", path.display())]
    RootNotFound { path: PathBuf },

    /// Failed to enumerate a directory
    #[error("failed to enumerate directory: {}", path.display())]
    EnumerationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The coordinator thread could not be spawned
    #[error("failed to start digest run")]
    Spawn(#[source] io::Error),

    /// A worker or callback panicked; the run's results are lost
    #[error("digest run {run_id} panicked")]
    RunPanicked { run_id: Uuid },
}

impl EngineError {
    /// True for errors caused by the caller's arguments rather than the environment.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::EmptyBatch
                | Self::ZeroConcurrency
                | Self::DuplicateFile { .. }
                | Self::MissingExpectedIndex
                | Self::AlgorithmMismatch { .. }
        )
    }
}

/// Errors from digesting a single file.
#[derive(Debug, Error)]
pub enum DigestError {
    /// Open, read, or permission failure, or the file vanished mid-read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Cancellation was observed between chunks
    #[error("digest of {} cancelled", path.display())]
    Cancelled { path: PathBuf },
}

impl DigestError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } => source.raw_os_error(),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Errors from reading, parsing, or writing a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write manifest {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("manifest line {line}: {reason}")]
    Syntax { line: usize, reason: String },

    #[error("manifest line {line}: {source}")]
    Digest {
        line: usize,
        #[source]
        source: DigestParseError,
    },

    #[error("manifest line {line}: duplicate entry for '{key}'")]
    DuplicateKey { line: usize, key: String },

    #[error("manifest already has an entry for '{key}'")]
    DuplicateEntry { key: String },

    #[error("path '{key}' cannot be stored in a manifest (empty or contains a line break)")]
    UnrepresentablePath { key: String },

    #[error("manifest entry '{key}' uses {found}, expected {expected}")]
    MixedAlgorithms {
        key: String,
        expected: ChecksumAlgorithm,
        found: ChecksumAlgorithm,
    },
}
