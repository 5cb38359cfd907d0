//! Progress reporting trait.
//!
//! This module defines the RunCallbacks trait, which decouples the digest
//! engine from whatever presents its progress (CLI, GUI, tests).
//!
//! All methods are invoked from worker threads, concurrently for different
//! files. Implementations that drive a UI must marshal to their own thread.

use crate::model::{FailureRecord, FileReference, FileState};

/// Receives progress updates from a digest run.
///
/// Every method has a no-op default, so implementors only override the
/// notifications they care about.
pub trait RunCallbacks: Send + Sync {
    /// Called once when a file is admitted to a worker.
    fn on_file_started(&self, _file: &FileReference) {}

    /// Called once when a file reaches a terminal state.
    ///
    /// For admitted files this always follows `on_file_started`. Files that
    /// were still pending when the run was cancelled get only this call, with
    /// `FileState::Cancelled`.
    fn on_file_completed(&self, _file: &FileReference, _state: FileState) {}

    /// Called exactly once per run, after every file is terminal.
    ///
    /// `failures` is in completion order.
    fn on_run_completed(&self, _failures: &[FailureRecord]) {}
}

/// Callbacks that ignore every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl RunCallbacks for NoopCallbacks {}
