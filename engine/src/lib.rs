//! # Sumcheck Engine - Concurrent File Digests
//!
//! A headless engine that computes and verifies cryptographic digests for
//! large sets of files. Designed as the foundation for any front end (CLI,
//! GUI, automation); front ends only submit batches and render callbacks.
//!
//! ## Overview
//!
//! - Streaming, chunked digest of each file (bounded memory per file)
//! - A fixed-size worker pool so at most `concurrency_limit` files are open
//! - GENERATE mode (produce a manifest) and VERIFY mode (check one)
//! - Per-file failure isolation: one bad file never stops a run
//! - Cooperative cancellation, checked between chunks and between admissions
//! - Progress via callbacks, decoupled from UI technology
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use sumcheck_engine::{
//!     enumerate_files, DigestEngine, EngineConfig, EnumerateOptions, Manifest, NoopCallbacks,
//!     RunRequest,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let files = enumerate_files("/data/photos".as_ref(), &EnumerateOptions::default())?;
//!
//! let engine = DigestEngine::new(EngineConfig::default());
//! let report = engine.run(RunRequest::generate(files), Arc::new(NoopCallbacks))?;
//!
//! let manifest = Manifest::from_records(report.algorithm, &report.records)?;
//! manifest.save("/data/photos/SUMS.manifest".as_ref())?;
//!
//! for failure in &report.failures {
//!     println!("{}: {}", failure.file, failure.reason);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (FileReference, DigestRecord, FailureRecord, RunReport)
//! - **error**: Error types and handling
//! - **checksums**: Digest algorithms and values
//! - **digester**: Streaming digest of a single file
//! - **run**: The worker-pool engine (start, cancel, wait)
//! - **progress**: Progress callback trait
//! - **cancel**: Cooperative cancellation token
//! - **manifest**: Manifest file format
//! - **fs_ops**: Directory enumeration

pub mod cancel;
pub mod checksums;
pub mod digester;
pub mod error;
pub mod fs_ops;
pub mod manifest;
pub mod model;
pub mod progress;
pub mod run;

// Re-export main types and functions
pub use cancel::CancelToken;
pub use checksums::{create_hasher, ChecksumAlgorithm, ChecksumHasher, DigestValue};
pub use digester::{FileDigester, DEFAULT_CHUNK_SIZE};
pub use error::{DigestError, EngineError, ManifestError};
pub use fs_ops::{enumerate_files, EnumerateOptions};
pub use manifest::Manifest;
pub use model::{
    DigestRecord, ExpectedDigestIndex, FailureReason, FailureRecord, FileReference, FileState,
    Mode, RunReport,
};
pub use progress::{NoopCallbacks, RunCallbacks};
pub use run::{DigestEngine, EngineConfig, RunHandle, RunRequest};
