//! Run orchestration.
//!
//! A run takes a batch of files through a fixed-size worker pool:
//! - `DigestEngine::start` validates the request and launches a coordinator thread
//! - the coordinator spawns `min(concurrency_limit, files)` workers
//! - each worker pulls the next pending file from a shared queue, checks the
//!   cancel flag (admission), digests it, and records the terminal outcome
//! - once the queue is drained and every worker has exited, the coordinator
//!   fires `on_run_completed` and hands back a `RunReport`
//!
//! Per-file failures never abort a run; only invalid input is reported as an
//! `EngineError`, and it is reported before any work is scheduled.

use chrono::Utc;
use crossbeam_channel::Receiver;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::checksums::ChecksumAlgorithm;
use crate::digester::{FileDigester, DEFAULT_CHUNK_SIZE};
use crate::error::{DigestError, EngineError};
use crate::model::{
    DigestRecord, ExpectedDigestIndex, FailureReason, FailureRecord, FileReference, FileState,
    Mode, RunReport,
};
use crate::progress::RunCallbacks;

/// Runtime settings for a `DigestEngine`. Nothing here is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of files digested at the same time
    pub concurrency_limit: usize,

    /// Bytes read per chunk
    pub chunk_size: usize,

    /// Digest algorithm for every file in a run
    pub algorithm: ChecksumAlgorithm,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            concurrency_limit: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            chunk_size: DEFAULT_CHUNK_SIZE,
            algorithm: ChecksumAlgorithm::default(),
        }
    }
}

/// One batch of work for the engine.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub files: Vec<FileReference>,
    pub mode: Mode,

    /// Required (and non-empty) in VERIFY mode, ignored in GENERATE mode
    pub expected: Option<Arc<ExpectedDigestIndex>>,

    /// Caller-owned token; a fresh one is created when absent
    pub cancel_token: Option<CancelToken>,
}

impl RunRequest {
    pub fn generate(files: Vec<FileReference>) -> Self {
        RunRequest {
            files,
            mode: Mode::Generate,
            expected: None,
            cancel_token: None,
        }
    }

    pub fn verify(files: Vec<FileReference>, expected: impl Into<Arc<ExpectedDigestIndex>>) -> Self {
        RunRequest {
            files,
            mode: Mode::Verify,
            expected: Some(expected.into()),
            cancel_token: None,
        }
    }

    /// Let the caller cancel through a token it already holds.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// Digests batches of files across a bounded worker pool.
#[derive(Debug, Clone)]
pub struct DigestEngine {
    config: EngineConfig,
    digester: FileDigester,
}

impl DigestEngine {
    pub fn new(config: EngineConfig) -> Self {
        let digester = FileDigester::new(config.algorithm).with_chunk_size(config.chunk_size);
        DigestEngine { config, digester }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate `request` and start it in the background.
    ///
    /// Returns immediately; use the handle to cancel or wait. Invalid input is
    /// rejected here, before any file is touched.
    pub fn start(
        &self,
        request: RunRequest,
        callbacks: Arc<dyn RunCallbacks>,
    ) -> Result<RunHandle, EngineError> {
        self.validate(&request)?;

        let RunRequest {
            files,
            mode,
            expected,
            cancel_token,
        } = request;

        let state = Arc::new(RunState {
            run_id: Uuid::new_v4(),
            mode,
            total_files: files.len(),
            processed: AtomicUsize::new(0),
            verified: AtomicUsize::new(0),
            bytes_read: AtomicU64::new(0),
            cancel: cancel_token.unwrap_or_default(),
            failures: Mutex::new(Vec::new()),
            records: Mutex::new(Vec::new()),
        });

        let workers = self.config.concurrency_limit.min(files.len());
        let context = RunContext {
            state: Arc::clone(&state),
            digester: self.digester,
            expected: match mode {
                Mode::Generate => None,
                Mode::Verify => expected,
            },
            callbacks,
        };

        let coordinator = thread::Builder::new()
            .name(format!("digest-run-{}", state.run_id.simple()))
            .spawn(move || context.execute(files, workers))
            .map_err(EngineError::Spawn)?;

        Ok(RunHandle {
            state,
            coordinator,
        })
    }

    /// Run `request` to completion on the calling thread's behalf.
    pub fn run(
        &self,
        request: RunRequest,
        callbacks: Arc<dyn RunCallbacks>,
    ) -> Result<RunReport, EngineError> {
        self.start(request, callbacks)?.wait()
    }

    fn validate(&self, request: &RunRequest) -> Result<(), EngineError> {
        if request.files.is_empty() {
            return Err(EngineError::EmptyBatch);
        }
        if self.config.concurrency_limit == 0 {
            return Err(EngineError::ZeroConcurrency);
        }

        let mut seen = HashSet::with_capacity(request.files.len());
        for file in &request.files {
            if !seen.insert(file.key.as_str()) {
                return Err(EngineError::DuplicateFile {
                    key: file.key.clone(),
                });
            }
        }

        if request.mode == Mode::Verify {
            let expected = match &request.expected {
                Some(index) if !index.is_empty() => index,
                _ => return Err(EngineError::MissingExpectedIndex),
            };
            if expected.algorithm() != self.config.algorithm {
                return Err(EngineError::AlgorithmMismatch {
                    expected: expected.algorithm(),
                    configured: self.config.algorithm,
                });
            }
        }

        Ok(())
    }
}

/// Handle to a run in progress.
#[derive(Debug)]
pub struct RunHandle {
    state: Arc<RunState>,
    coordinator: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.state.run_id
    }

    /// Request cancellation. Never blocks; in-flight files stop at their next
    /// chunk boundary and pending files are resolved as cancelled.
    pub fn cancel(&self) {
        if self.state.cancel.cancel() {
            info!(run_id = %self.state.run_id, "cancellation requested");
        }
    }

    /// A clone of the run's token, for cancelling from elsewhere.
    pub fn cancel_token(&self) -> CancelToken {
        self.state.cancel.clone()
    }

    pub fn processed(&self) -> usize {
        self.state.processed.load(Ordering::Acquire)
    }

    pub fn total_files(&self) -> usize {
        self.state.total_files
    }

    pub fn is_finished(&self) -> bool {
        self.coordinator.is_finished()
    }

    /// Block until the run completes and return its report.
    pub fn wait(self) -> Result<RunReport, EngineError> {
        let run_id = self.state.run_id;
        self.coordinator
            .join()
            .map_err(|_| EngineError::RunPanicked { run_id })
    }
}

/// State shared by every worker of one run.
#[derive(Debug)]
struct RunState {
    run_id: Uuid,
    mode: Mode,
    total_files: usize,
    processed: AtomicUsize,
    verified: AtomicUsize,
    bytes_read: AtomicU64,
    cancel: CancelToken,
    failures: Mutex<Vec<FailureRecord>>,
    records: Mutex<Vec<DigestRecord>>,
}

/// Terminal result of one file.
enum Outcome {
    Digested(DigestRecord),
    Verified,
    Failed(FailureRecord),
}

impl Outcome {
    fn state(&self) -> FileState {
        match self {
            Outcome::Digested(_) | Outcome::Verified => FileState::CompletedOk,
            Outcome::Failed(failure) => failure.reason.state(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything the coordinator and workers need, moved onto the coordinator thread.
struct RunContext {
    state: Arc<RunState>,
    digester: FileDigester,
    expected: Option<Arc<ExpectedDigestIndex>>,
    callbacks: Arc<dyn RunCallbacks>,
}

impl RunContext {
    fn execute(self, files: Vec<FileReference>, workers: usize) -> RunReport {
        let state = &self.state;
        let started_at = Utc::now();

        info!(
            run_id = %state.run_id,
            mode = %state.mode,
            algorithm = %self.digester.algorithm(),
            files = state.total_files,
            workers,
            "digest run started"
        );

        let (sender, queue) = crossbeam_channel::unbounded();
        for file in files {
            // The receiver is alive in this scope, so sending cannot fail.
            let _ = sender.send(file);
        }
        drop(sender);

        thread::scope(|scope| {
            let mut spawned = 0;
            for lane in 0..workers {
                let queue = queue.clone();
                let this = &self;
                let spawn = thread::Builder::new()
                    .name(format!("digest-worker-{}", lane))
                    .spawn_scoped(scope, move || this.worker_loop(&queue));
                match spawn {
                    Ok(_) => spawned += 1,
                    Err(e) => warn!(lane, error = %e, "failed to spawn digest worker"),
                }
            }
            if spawned == 0 {
                // Degrade to a single lane on the coordinator itself.
                self.worker_loop(&queue);
            }
        });

        let failures = std::mem::take(&mut *lock(&state.failures));
        let mut records = std::mem::take(&mut *lock(&state.records));
        let processed = state.processed.load(Ordering::Acquire);
        debug_assert_eq!(processed, state.total_files);

        self.notify("on_run_completed", |cb| cb.on_run_completed(&failures));

        let mut failures = failures;
        failures.sort_by(|a, b| a.file.key.cmp(&b.file.key));
        records.sort_by(|a, b| a.file.key.cmp(&b.file.key));

        let report = RunReport {
            run_id: state.run_id,
            mode: state.mode,
            algorithm: self.digester.algorithm(),
            total_files: state.total_files,
            processed,
            verified: state.verified.load(Ordering::Acquire),
            bytes_read: state.bytes_read.load(Ordering::Acquire),
            records,
            failures,
            cancelled: state.cancel.is_cancelled(),
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            run_id = %state.run_id,
            processed = report.processed,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "digest run finished"
        );

        report
    }

    /// One worker lane: admit, digest, record, repeat until the queue is empty.
    fn worker_loop(&self, queue: &Receiver<FileReference>) {
        while let Ok(file) = queue.recv() {
            if self.state.cancel.is_cancelled() {
                let failure = FailureRecord::new(file.clone(), FailureReason::Cancelled)
                    .with_message("cancelled before processing started");
                self.complete(&file, Outcome::Failed(failure));
                continue;
            }

            self.notify("on_file_started", |cb| cb.on_file_started(&file));
            debug!(key = %file.key, "file admitted");

            let outcome = match self.digester.digest(&file, &self.state.cancel) {
                Ok(record) => {
                    self.state
                        .bytes_read
                        .fetch_add(record.bytes_read, Ordering::AcqRel);
                    self.judge(record)
                }
                Err(DigestError::Cancelled { .. }) => Outcome::Failed(
                    FailureRecord::new(file.clone(), FailureReason::Cancelled)
                        .with_message("cancelled while reading"),
                ),
                Err(err) => {
                    let mut failure = FailureRecord::new(file.clone(), FailureReason::IoError)
                        .with_message(err.to_string());
                    failure.error_code = err.raw_os_error();
                    Outcome::Failed(failure)
                }
            };

            self.complete(&file, outcome);
        }
    }

    /// Apply the run mode to a successful digest.
    fn judge(&self, record: DigestRecord) -> Outcome {
        let Some(expected) = &self.expected else {
            return Outcome::Digested(record);
        };

        match expected.get(&record.file.key) {
            None => Outcome::Failed(FailureRecord::new(
                record.file,
                FailureReason::MissingExpectedDigest,
            )),
            Some(digest) if *digest == record.digest => Outcome::Verified,
            Some(digest) => {
                let message = format!("expected {}, computed {}", digest, record.digest);
                Outcome::Failed(
                    FailureRecord::new(record.file, FailureReason::DigestMismatch)
                        .with_message(message),
                )
            }
        }
    }

    /// Record a terminal outcome, bump the processed count, notify.
    fn complete(&self, file: &FileReference, outcome: Outcome) {
        let state = outcome.state();

        match outcome {
            Outcome::Digested(record) => lock(&self.state.records).push(record),
            Outcome::Verified => {
                self.state.verified.fetch_add(1, Ordering::AcqRel);
            }
            Outcome::Failed(failure) => {
                warn!(
                    key = %failure.file.key,
                    reason = %failure.reason,
                    detail = failure.error_message.as_deref().unwrap_or(""),
                    "file failed"
                );
                lock(&self.state.failures).push(failure);
            }
        }

        let processed = self.state.processed.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(processed <= self.state.total_files);
        debug!(key = %file.key, ?state, processed, total = self.state.total_files, "file completed");

        self.notify("on_file_completed", |cb| cb.on_file_completed(file, state));
    }

    /// Invoke a callback; a panic inside it is logged and the run carries on.
    fn notify(&self, callback: &'static str, call: impl FnOnce(&dyn RunCallbacks)) {
        let callbacks = &*self.callbacks;
        if panic::catch_unwind(AssertUnwindSafe(|| call(callbacks))).is_err() {
            warn!(run_id = %self.state.run_id, callback, "progress callback panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksums::{digest_bytes, DigestValue};
    use crate::progress::NoopCallbacks;
    use std::fs;
    use std::path::Path;

    // Test helper: records every callback invocation
    #[derive(Default)]
    struct Recorder {
        started: Mutex<Vec<String>>,
        completed: Mutex<Vec<(String, FileState)>>,
        run_completed: Mutex<Vec<usize>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        cancel_on_first_completion: Option<CancelToken>,
        cancel_on_first_start: Option<CancelToken>,
    }

    impl RunCallbacks for Recorder {
        fn on_file_started(&self, file: &FileReference) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            self.started.lock().unwrap().push(file.key.clone());
            if let Some(token) = &self.cancel_on_first_start {
                token.cancel();
            }
        }

        fn on_file_completed(&self, file: &FileReference, state: FileState) {
            if state != FileState::Cancelled || self.started.lock().unwrap().contains(&file.key) {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            self.completed.lock().unwrap().push((file.key.clone(), state));
            if let Some(token) = &self.cancel_on_first_completion {
                token.cancel();
            }
        }

        fn on_run_completed(&self, failures: &[FailureRecord]) {
            self.run_completed.lock().unwrap().push(failures.len());
        }
    }

    fn write_files(dir: &Path, count: usize, size: usize) -> Vec<FileReference> {
        (0..count)
            .map(|i| {
                let name = format!("file{:03}.bin", i);
                let path = dir.join(&name);
                let content: Vec<u8> = (0..size).map(|b| ((b + i) % 256) as u8).collect();
                fs::write(&path, content).expect("Failed to write test file");
                FileReference::new(path, name)
            })
            .collect()
    }

    fn engine(concurrency_limit: usize) -> DigestEngine {
        DigestEngine::new(EngineConfig {
            concurrency_limit,
            chunk_size: 1024,
            algorithm: ChecksumAlgorithm::Sha256,
        })
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let result = engine(2).run(RunRequest::generate(Vec::new()), Arc::new(NoopCallbacks));
        assert!(matches!(result, Err(EngineError::EmptyBatch)));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let files = vec![FileReference::new("/tmp/a", "a")];
        let result = engine(0).run(RunRequest::generate(files), Arc::new(NoopCallbacks));
        assert!(matches!(result, Err(EngineError::ZeroConcurrency)));
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let files = vec![
            FileReference::new("/tmp/a", "a"),
            FileReference::new("/tmp/other/a", "a"),
        ];
        let result = engine(2).run(RunRequest::generate(files), Arc::new(NoopCallbacks));
        assert!(matches!(result, Err(EngineError::DuplicateFile { key }) if key == "a"));
    }

    #[test]
    fn test_verify_without_index_is_rejected() {
        let files = vec![FileReference::new("/tmp/a", "a")];

        let mut request = RunRequest::generate(files.clone());
        request.mode = Mode::Verify;
        let result = engine(2).run(request, Arc::new(NoopCallbacks));
        assert!(matches!(result, Err(EngineError::MissingExpectedIndex)));

        let empty = ExpectedDigestIndex::new(ChecksumAlgorithm::Sha256);
        let result = engine(2).run(RunRequest::verify(files, empty), Arc::new(NoopCallbacks));
        assert!(matches!(result, Err(EngineError::MissingExpectedIndex)));
    }

    #[test]
    fn test_verify_with_other_algorithm_is_rejected() {
        let files = vec![FileReference::new("/tmp/a", "a")];
        let mut index = ExpectedDigestIndex::new(ChecksumAlgorithm::Md5);
        index
            .insert("a", DigestValue::new(ChecksumAlgorithm::Md5, vec![0; 16]))
            .expect("insert");

        let result = engine(2).run(RunRequest::verify(files, index), Arc::new(NoopCallbacks));
        assert!(matches!(result, Err(EngineError::AlgorithmMismatch { .. })));
    }

    #[test]
    fn test_generate_mixed_batch() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let a = temp_dir.path().join("a.txt");
        let b = temp_dir.path().join("b.txt");
        fs::write(&a, b"0123456789").expect("write a");
        fs::write(&b, b"").expect("write b");
        let files = vec![
            FileReference::new(&a, "a.txt"),
            FileReference::new(&b, "b.txt"),
            FileReference::new(temp_dir.path().join("c.txt"), "c.txt"),
        ];

        let recorder = Arc::new(Recorder::default());
        let report = engine(2)
            .run(RunRequest::generate(files), recorder.clone())
            .expect("run should start");

        assert_eq!(report.total_files, 3);
        assert_eq!(report.processed, 3);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].file.key, "a.txt");
        assert_eq!(report.records[0].bytes_read, 10);
        assert_eq!(report.records[0].digest, digest_bytes(ChecksumAlgorithm::Sha256, b"0123456789"));
        assert_eq!(report.records[1].file.key, "b.txt");
        assert_eq!(report.records[1].digest, digest_bytes(ChecksumAlgorithm::Sha256, b""));
        assert_eq!(report.bytes_read, 10);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].file.key, "c.txt");
        assert_eq!(report.failures[0].reason, FailureReason::IoError);
        assert!(report.failures[0].error_message.is_some());

        assert_eq!(*recorder.run_completed.lock().unwrap(), vec![1]);
        assert_eq!(recorder.started.lock().unwrap().len(), 3);
        assert_eq!(recorder.completed.lock().unwrap().len(), 3);
        assert!(!report.cancelled);
        assert!(!report.is_success());
    }

    #[test]
    fn test_concurrency_limit_is_respected() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let files = write_files(temp_dir.path(), 24, 32 * 1024);

        let recorder = Arc::new(Recorder::default());
        let report = engine(3)
            .run(RunRequest::generate(files), recorder.clone())
            .expect("run should start");

        assert_eq!(report.records.len(), 24);
        let peak = recorder.peak_in_flight.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak in flight was {}", peak);
        assert_eq!(recorder.in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_started_precedes_completed_for_each_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let files = write_files(temp_dir.path(), 10, 100);

        let recorder = Arc::new(Recorder::default());
        engine(4)
            .run(RunRequest::generate(files), recorder.clone())
            .expect("run should start");

        // Each worker brackets a file with started/completed, so every
        // completed file must already be in the started list.
        let started = recorder.started.lock().unwrap().clone();
        let completed = recorder.completed.lock().unwrap().clone();
        assert_eq!(completed.len(), 10);
        for (key, state) in completed {
            assert!(started.contains(&key));
            assert_eq!(state, FileState::CompletedOk);
        }
    }

    #[test]
    fn test_cancel_stops_admission() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let files = write_files(temp_dir.path(), 5, 256);

        let token = CancelToken::new();
        let recorder = Arc::new(Recorder {
            cancel_on_first_completion: Some(token.clone()),
            ..Recorder::default()
        });

        let report = engine(1)
            .run(
                RunRequest::generate(files).with_cancel_token(token),
                recorder.clone(),
            )
            .expect("run should start");

        assert!(report.cancelled);
        assert_eq!(report.processed, 5);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.count_failures(FailureReason::Cancelled), 4);
        assert_eq!(recorder.started.lock().unwrap().len(), 1);
        assert_eq!(recorder.completed.lock().unwrap().len(), 5);
        assert_eq!(*recorder.run_completed.lock().unwrap(), vec![4]);
    }

    #[test]
    fn test_cancel_during_read_marks_in_flight_file_cancelled() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let big = temp_dir.path().join("big.bin");
        fs::write(&big, vec![0x42; 4 * 1024 * 1024]).expect("write big file");
        let small = temp_dir.path().join("small.bin");
        fs::write(&small, b"small").expect("write small file");
        let files = vec![
            FileReference::new(&big, "big.bin"),
            FileReference::new(&small, "small.bin"),
        ];

        let token = CancelToken::new();
        let recorder = Arc::new(Recorder {
            cancel_on_first_start: Some(token.clone()),
            ..Recorder::default()
        });

        let report = engine(1)
            .run(
                RunRequest::generate(files).with_cancel_token(token),
                recorder.clone(),
            )
            .expect("run should start");

        assert!(report.cancelled);
        assert!(report.records.is_empty());
        assert_eq!(report.bytes_read, 0);
        assert_eq!(report.processed, 2);
        assert_eq!(report.count_failures(FailureReason::Cancelled), 2);

        assert_eq!(*recorder.started.lock().unwrap(), vec!["big.bin".to_string()]);
        assert_eq!(
            *recorder.completed.lock().unwrap(),
            vec![
                ("big.bin".to_string(), FileState::Cancelled),
                ("small.bin".to_string(), FileState::Cancelled),
            ]
        );
        assert_eq!(*recorder.run_completed.lock().unwrap(), vec![2]);
        assert_eq!(recorder.in_flight.load(Ordering::SeqCst), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_io_failure() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let files = write_files(temp_dir.path(), 3, 64);
        let locked = &files[1].path;
        fs::set_permissions(locked, fs::Permissions::from_mode(0o000)).expect("chmod 000");
        if fs::File::open(locked).is_ok() {
            // Running as root: permission bits are not enforced.
            return;
        }

        let report = engine(2)
            .run(RunRequest::generate(files.clone()), Arc::new(NoopCallbacks))
            .expect("run should start");
        fs::set_permissions(locked, fs::Permissions::from_mode(0o644)).expect("restore mode");

        assert_eq!(report.processed, 3);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.file.key, files[1].key);
        assert_eq!(failure.reason, FailureReason::IoError);
        assert_eq!(failure.error_code, Some(13));
        assert!(!report.cancelled);
    }

    /// Panics on every per-file notification.
    #[derive(Default)]
    struct Panicky {
        run_completed: AtomicUsize,
    }

    impl RunCallbacks for Panicky {
        fn on_file_started(&self, file: &FileReference) {
            panic!("started {}", file.key);
        }

        fn on_file_completed(&self, file: &FileReference, _state: FileState) {
            panic!("completed {}", file.key);
        }

        fn on_run_completed(&self, _failures: &[FailureRecord]) {
            self.run_completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_panicking_callback_does_not_lose_run() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let files = write_files(temp_dir.path(), 5, 100);

        let callbacks = Arc::new(Panicky::default());
        let report = engine(2)
            .run(RunRequest::generate(files), callbacks.clone())
            .expect("run should survive callback panics");

        assert!(report.is_success());
        assert_eq!(report.records.len(), 5);
        assert_eq!(callbacks.run_completed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pre_cancelled_token_admits_nothing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let files = write_files(temp_dir.path(), 6, 16);
        let token = CancelToken::new();
        token.cancel();

        let recorder = Arc::new(Recorder::default());
        let report = engine(3)
            .run(RunRequest::generate(files).with_cancel_token(token), recorder.clone())
            .expect("run should start");

        assert_eq!(report.processed, 6);
        assert_eq!(report.count_failures(FailureReason::Cancelled), 6);
        assert!(recorder.started.lock().unwrap().is_empty());
        assert_eq!(*recorder.run_completed.lock().unwrap(), vec![6]);
    }

    #[test]
    fn test_cancel_while_running_resolves_every_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let files = write_files(temp_dir.path(), 40, 64 * 1024);

        let recorder = Arc::new(Recorder::default());
        let handle = engine(2)
            .start(RunRequest::generate(files), recorder.clone())
            .expect("run should start");
        handle.cancel();
        handle.cancel();
        let report = handle.wait().expect("run should finish");

        assert!(report.cancelled);
        assert_eq!(report.processed, 40);
        assert_eq!(report.records.len() + report.failures.len(), 40);
        assert!(report
            .failures
            .iter()
            .all(|f| f.reason == FailureReason::Cancelled));
        assert_eq!(recorder.run_completed.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_verify_outcomes() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let files = write_files(temp_dir.path(), 3, 50);

        let generated = engine(2)
            .run(RunRequest::generate(files.clone()), Arc::new(NoopCallbacks))
            .expect("generate run");

        // file000 matches, file001 is wrong, file002 is absent
        let mut index = ExpectedDigestIndex::new(ChecksumAlgorithm::Sha256);
        index
            .insert("file000.bin", generated.records[0].digest.clone())
            .expect("insert");
        index
            .insert("file001.bin", digest_bytes(ChecksumAlgorithm::Sha256, b"something else"))
            .expect("insert");

        let report = engine(2)
            .run(RunRequest::verify(files, index), Arc::new(NoopCallbacks))
            .expect("verify run");

        assert_eq!(report.verified, 1);
        assert!(report.records.is_empty());
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].file.key, "file001.bin");
        assert_eq!(report.failures[0].reason, FailureReason::DigestMismatch);
        assert_eq!(report.failures[1].file.key, "file002.bin");
        assert_eq!(report.failures[1].reason, FailureReason::MissingExpectedDigest);
    }

    #[test]
    fn test_engine_is_reusable_across_runs() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let files = write_files(temp_dir.path(), 4, 10);
        let engine = engine(2);

        let first = engine
            .start(RunRequest::generate(files.clone()), Arc::new(NoopCallbacks))
            .expect("first run");
        first.cancel();
        first.wait().expect("first run finishes");

        // A cancelled run must not leak its flag into the next one.
        let second = engine
            .run(RunRequest::generate(files), Arc::new(NoopCallbacks))
            .expect("second run");
        assert!(!second.cancelled);
        assert!(second.is_success());
        assert_eq!(second.records.len(), 4);
    }
}
