//! Core data model for digest runs.
//!
//! This module defines the main data structures:
//! - FileReference: one file submitted to a run
//! - DigestRecord / FailureRecord: the per-file terminal results
//! - ExpectedDigestIndex: the ground truth for VERIFY runs
//! - RunReport: everything a finished run hands back to the caller
//! - Mode, FileState, FailureReason: enums controlling and describing behavior

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::checksums::{ChecksumAlgorithm, DigestValue};
use crate::error::EngineError;

/// A regular file submitted to a run.
///
/// `path` is where the bytes are read from; `key` is the logical name used in
/// manifests and expected-digest lookups (normally the path relative to the
/// enumerated root, with `/` separators).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileReference {
    pub path: PathBuf,
    pub key: String,
}

impl FileReference {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        FileReference {
            path: path.into(),
            key: key.into(),
        }
    }

    /// Use the path text itself as the logical key.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        FileReference {
            path: path.to_path_buf(),
            key: path.to_string_lossy().into_owned(),
        }
    }
}

impl fmt::Display for FileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// What a run does with each digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Produce a digest record per file
    Generate,
    /// Compare each digest with the expected index
    Verify,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Generate => write!(f, "generate"),
            Mode::Verify => write!(f, "verify"),
        }
    }
}

/// Lifecycle of a single file within a run.
///
/// PENDING -> ADMITTED -> IN_PROGRESS -> one terminal state. Pending files may
/// also go straight to `Cancelled` when cancellation is observed before
/// admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Pending,
    Admitted,
    InProgress,
    CompletedOk,
    CompletedMismatch,
    CompletedMissingExpected,
    FailedIo,
    Cancelled,
}

impl FileState {
    /// Returns true if this state is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            FileState::Pending | FileState::Admitted | FileState::InProgress
        )
    }

    /// Failure category of a terminal state, if it is a failure.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            FileState::CompletedMismatch => Some(FailureReason::DigestMismatch),
            FileState::CompletedMissingExpected => Some(FailureReason::MissingExpectedDigest),
            FileState::FailedIo => Some(FailureReason::IoError),
            FileState::Cancelled => Some(FailureReason::Cancelled),
            _ => None,
        }
    }
}

/// Digest of one successfully read file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestRecord {
    pub file: FileReference,
    pub digest: DigestValue,
    pub bytes_read: u64,
}

/// Why a file did not end in success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    IoError,
    DigestMismatch,
    Cancelled,
    MissingExpectedDigest,
}

impl FailureReason {
    /// The terminal lifecycle state this failure leaves a file in.
    pub fn state(&self) -> FileState {
        match self {
            FailureReason::IoError => FileState::FailedIo,
            FailureReason::DigestMismatch => FileState::CompletedMismatch,
            FailureReason::Cancelled => FileState::Cancelled,
            FailureReason::MissingExpectedDigest => FileState::CompletedMissingExpected,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::IoError => write!(f, "I/O error"),
            FailureReason::DigestMismatch => write!(f, "digest mismatch"),
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::MissingExpectedDigest => write!(f, "no expected digest"),
        }
    }
}

/// A file that ended in one of the failure states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub file: FileReference,
    pub reason: FailureReason,

    /// OS error code for IO_ERROR failures
    pub error_code: Option<i32>,

    /// Human-readable detail
    pub error_message: Option<String>,
}

impl FailureRecord {
    pub fn new(file: FileReference, reason: FailureReason) -> Self {
        FailureRecord {
            file,
            reason,
            error_code: None,
            error_message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Expected digests keyed by logical file key.
///
/// Built before a VERIFY run (usually from a manifest) and only read while
/// the run is in progress. Every digest in the index uses the same algorithm.
#[derive(Debug, Clone)]
pub struct ExpectedDigestIndex {
    algorithm: ChecksumAlgorithm,
    entries: HashMap<String, DigestValue>,
}

impl ExpectedDigestIndex {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        ExpectedDigestIndex {
            algorithm,
            entries: HashMap::new(),
        }
    }

    /// Add or replace an expectation. Returns the previous digest for `key`.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        digest: DigestValue,
    ) -> Result<Option<DigestValue>, EngineError> {
        if digest.algorithm() != self.algorithm {
            return Err(EngineError::AlgorithmMismatch {
                expected: digest.algorithm(),
                configured: self.algorithm,
            });
        }
        Ok(self.entries.insert(key.into(), digest))
    }

    pub fn get(&self, key: &str) -> Option<&DigestValue> {
        self.entries.get(key)
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Result of a finished (or fully cancelled) run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: Mode,
    pub algorithm: ChecksumAlgorithm,
    pub total_files: usize,

    /// Files that reached a terminal state; equals `total_files` once complete
    pub processed: usize,

    /// VERIFY files whose digest matched the expectation
    pub verified: usize,

    /// Bytes read across every fully digested file
    pub bytes_read: u64,

    /// Digest records, sorted by key (GENERATE only)
    pub records: Vec<DigestRecord>,

    /// Failures, sorted by key
    pub failures: Vec<FailureRecord>,

    /// True if cancellation was requested during the run
    pub cancelled: bool,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// True when every file ended in success.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.processed == self.total_files
    }

    /// Number of failures with the given reason.
    pub fn count_failures(&self, reason: FailureReason) -> usize {
        self.failures.iter().filter(|f| f.reason == reason).count()
    }
}
