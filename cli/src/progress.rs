//! Terminal rendering of engine callbacks.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sumcheck_engine::{FailureRecord, FileReference, FileState, RunCallbacks};

/// Minimum time between two redraws of the progress bar.
const REDRAW_INTERVAL: Duration = Duration::from_millis(200);

/// CLI implementation of RunCallbacks: a throttled progress bar on stderr.
pub struct CliProgress {
    verbose: bool,
    total_files: usize,
    processed: AtomicUsize,
    last_redraw: Mutex<Option<Instant>>,
}

impl CliProgress {
    pub fn new(total_files: usize, verbose: bool) -> Self {
        CliProgress {
            verbose,
            total_files,
            processed: AtomicUsize::new(0),
            last_redraw: Mutex::new(None),
        }
    }

    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    pub fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else if elapsed.as_millis() < 1000 {
            format!("{}ms", elapsed.as_millis())
        } else {
            format!("{}s", secs)
        }
    }

    fn progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {:3}%", "=".repeat(filled), " ".repeat(empty), percent)
    }

    fn redraw(&self, processed: usize, force: bool) {
        {
            let mut last = self.last_redraw.lock().unwrap_or_else(|e| e.into_inner());
            let due = last.map_or(true, |at| at.elapsed() >= REDRAW_INTERVAL);
            if !force && !due {
                return;
            }
            *last = Some(Instant::now());
        }

        let percent = if self.total_files == 0 {
            100
        } else {
            (processed as f64 / self.total_files as f64 * 100.0) as u32
        };
        let mut stderr = std::io::stderr().lock();
        let _ = write!(
            stderr,
            "\rProgress: {} | {}/{} files",
            Self::progress_bar(percent),
            processed,
            self.total_files
        );
        let _ = stderr.flush();
    }
}

impl RunCallbacks for CliProgress {
    fn on_file_started(&self, file: &FileReference) {
        if self.verbose {
            eprintln!("\rStarting: {}", file.key);
        }
    }

    fn on_file_completed(&self, file: &FileReference, state: FileState) {
        let processed = self.processed.fetch_add(1, Ordering::AcqRel) + 1;

        if self.verbose {
            let status = match state {
                FileState::CompletedOk => "OK",
                FileState::CompletedMismatch => "MISMATCH",
                FileState::CompletedMissingExpected => "NOT IN MANIFEST",
                FileState::FailedIo => "FAILED",
                FileState::Cancelled => "CANCELLED",
                _ => "?",
            };
            eprintln!("\r{:>15}: {}", status, file.key);
        }

        self.redraw(processed, processed == self.total_files);
    }

    fn on_run_completed(&self, failures: &[FailureRecord]) {
        eprintln!();
        if failures.is_empty() {
            eprintln!("All {} files processed without failures.", self.total_files);
        } else {
            eprintln!(
                "Processed {} files, {} failed.",
                self.processed.load(Ordering::Acquire),
                failures.len()
            );
        }
    }
}
