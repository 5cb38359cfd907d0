//! sumcheck - Command-line front end for the digest engine.
//!
//! Generates a manifest of digests for a directory tree, or verifies a tree
//! against a previously written manifest. Progress goes to stderr; digests
//! and JSON reports go to stdout.

mod interrupt;
mod logging;
mod progress;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sumcheck_engine::{
    enumerate_files, CancelToken, ChecksumAlgorithm, DigestEngine, EngineConfig,
    EnumerateOptions, FailureReason, FileReference, Manifest, Mode, RunReport, RunRequest,
};
use tracing::{debug, info, warn};

use crate::progress::CliProgress;

/// Manifest file name used when `--manifest` is not given
const DEFAULT_MANIFEST: &str = "SUMS.manifest";

/// sumcheck - Concurrent file digests
#[derive(Parser, Debug)]
#[command(name = "sumcheck")]
#[command(version)]
#[command(about = "Generate and verify digest manifests for directory trees")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output (per-file status and debug logs)
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Digest every file under DIR and write a manifest
    Generate(GenerateArgs),

    /// Check every file under DIR against an existing manifest
    Verify(VerifyArgs),
}

/// Options shared by both subcommands
#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// Directory tree to process
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// Manifest path (default: DIR/SUMS.manifest)
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,

    /// Number of files digested in parallel (default: available cores)
    #[arg(long, short = 'j', value_name = "N")]
    jobs: Option<usize>,

    /// Read size in bytes
    #[arg(long, value_name = "BYTES")]
    chunk_size: Option<usize>,

    /// Only include files with this extension (repeatable)
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Digest algorithm: md5, sha1, sha256, sha512, blake3
    #[arg(long, value_name = "ALGORITHM", default_value_t = ChecksumAlgorithm::Sha256)]
    algorithm: ChecksumAlgorithm,

    /// Also print each digest line on stdout
    #[arg(long, conflicts_with = "json")]
    print: bool,
}

#[derive(clap::Args, Debug)]
struct VerifyArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Algorithm to assume when the manifest has no algorithm header
    #[arg(long, value_name = "ALGORITHM")]
    algorithm: Option<ChecksumAlgorithm>,
}

/// How a command finished, when it did not hit an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Every file succeeded
    Clean,
    /// At least one file failed or mismatched
    Failures,
    /// The run was cancelled before every file was processed
    Interrupted,
}

impl Outcome {
    fn of(report: &RunReport) -> Self {
        if report.cancelled {
            Outcome::Interrupted
        } else if report.is_success() {
            Outcome::Clean
        } else {
            Outcome::Failures
        }
    }

    fn exit_code(self) -> i32 {
        match self {
            Outcome::Clean => 0,
            Outcome::Failures => 1,
            Outcome::Interrupted => interrupt::INTERRUPTED_EXIT_CODE,
        }
    }
}

impl CommonArgs {
    /// The directory to process, checked to exist and be a directory.
    fn root(&self) -> Result<&Path> {
        if !self.dir.exists() {
            bail!("Directory does not exist: {}", self.dir.display());
        }
        if !self.dir.is_dir() {
            bail!("Not a directory: {}", self.dir.display());
        }
        Ok(&self.dir)
    }

    fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| self.dir.join(DEFAULT_MANIFEST))
    }

    fn engine_config(&self, algorithm: ChecksumAlgorithm) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            concurrency_limit: self.jobs.unwrap_or(defaults.concurrency_limit),
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            algorithm,
        }
    }

    /// Extension filter from `--ext`, with the manifest itself excluded.
    fn enumerate_options(&self, manifest_path: &Path) -> EnumerateOptions {
        EnumerateOptions {
            extensions: self.extensions.clone(),
            exclude: vec![manifest_path.to_path_buf()],
        }
    }

    fn enumerate(&self, root: &Path, options: &EnumerateOptions) -> Result<Vec<FileReference>> {
        enumerate_files(root, options)
            .with_context(|| format!("Failed to enumerate {}", root.display()))
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = logging::init_logging(args.verbose) {
        eprintln!("Warning: {:#}", e);
    }

    let cancel = CancelToken::new();
    if let Err(e) = interrupt::cancel_on_ctrl_c(cancel.clone()) {
        warn!("Ctrl-C will not cancel gracefully: {:#}", e);
    }

    let exit_code = match run_cli(&args, &cancel) {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args, cancel: &CancelToken) -> Result<Outcome> {
    match &args.command {
        Command::Generate(cmd) => generate(cmd, args.verbose, cancel),
        Command::Verify(cmd) => verify(cmd, args.verbose, cancel),
    }
}

fn generate(cmd: &GenerateArgs, verbose: bool, cancel: &CancelToken) -> Result<Outcome> {
    let root = cmd.common.root()?;
    let manifest_path = cmd.common.manifest_path();
    let options = cmd.common.enumerate_options(&manifest_path);
    let files = cmd.common.enumerate(root, &options)?;
    if files.is_empty() {
        bail!("No files to digest under {}", root.display());
    }

    let engine = DigestEngine::new(cmd.common.engine_config(cmd.algorithm));
    eprintln!(
        "Digesting {} files in {} with {} ({} workers)",
        files.len(),
        root.display(),
        cmd.algorithm,
        engine.config().concurrency_limit
    );

    let started = Instant::now();
    let progress = Arc::new(CliProgress::new(files.len(), verbose));
    let request = RunRequest::generate(files).with_cancel_token(cancel.clone());
    let handle = engine
        .start(request, progress)
        .context("Failed to start digest run")?;
    debug!(run_id = %handle.run_id(), "generate run started");
    let report = handle.wait().context("Digest run failed")?;

    if cmd.print {
        for record in &report.records {
            println!("{} {}", record.digest, record.file.key);
        }
    }

    if report.cancelled {
        warn!("run was cancelled, manifest not written");
    } else {
        let manifest = Manifest::from_records(cmd.algorithm, &report.records)
            .context("Failed to build manifest")?;
        manifest
            .save(&manifest_path)
            .with_context(|| format!("Failed to write manifest {}", manifest_path.display()))?;
        info!(path = %manifest_path.display(), entries = manifest.len(), "manifest written");
        eprintln!(
            "Manifest written: {} ({} entries)",
            manifest_path.display(),
            manifest.len()
        );
        if !report.failures.is_empty() {
            warn!(
                omitted = report.failures.len(),
                "manifest omits files that could not be digested"
            );
        }
    }

    print_summary(&report, started.elapsed());

    if cmd.common.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(Outcome::of(&report))
}

fn verify(cmd: &VerifyArgs, verbose: bool, cancel: &CancelToken) -> Result<Outcome> {
    let root = cmd.common.root()?;
    let manifest_path = cmd.common.manifest_path();
    let manifest = Manifest::load(&manifest_path, cmd.algorithm.unwrap_or_default())
        .with_context(|| format!("Failed to load manifest {}", manifest_path.display()))?;
    let options = cmd.common.enumerate_options(&manifest_path);
    let files = cmd.common.enumerate(root, &options)?;

    // Entries outside the --ext filter were never looked for on disk.
    let not_on_disk: Vec<String> = {
        let on_disk: HashSet<&str> = files.iter().map(|f| f.key.as_str()).collect();
        manifest
            .entries()
            .map(|(key, _)| key)
            .filter(|key| options.wants(Path::new(key)) && !on_disk.contains(key))
            .map(str::to_string)
            .collect()
    };

    if files.is_empty() {
        eprintln!("No files found under {}", root.display());
        report_not_on_disk(&not_on_disk);
        return Ok(if not_on_disk.is_empty() {
            Outcome::Clean
        } else {
            Outcome::Failures
        });
    }

    let algorithm = manifest.algorithm();
    let engine = DigestEngine::new(cmd.common.engine_config(algorithm));
    eprintln!(
        "Verifying {} files in {} against {} ({}, {} entries)",
        files.len(),
        root.display(),
        manifest_path.display(),
        algorithm,
        manifest.len()
    );

    let started = Instant::now();
    let progress = Arc::new(CliProgress::new(files.len(), verbose));
    let request =
        RunRequest::verify(files, manifest.into_index()).with_cancel_token(cancel.clone());
    let handle = engine
        .start(request, progress)
        .context("Failed to start verify run")?;
    debug!(run_id = %handle.run_id(), "verify run started");
    let report = handle.wait().context("Verify run failed")?;

    print_summary(&report, started.elapsed());
    report_not_on_disk(&not_on_disk);

    if cmd.common.json {
        let mut value = serde_json::to_value(&report)?;
        value["not_on_disk"] = serde_json::json!(not_on_disk);
        println!("{}", serde_json::to_string_pretty(&value)?);
    }

    Ok(match Outcome::of(&report) {
        Outcome::Clean if !not_on_disk.is_empty() => Outcome::Failures,
        outcome => outcome,
    })
}

fn print_summary(report: &RunReport, elapsed: Duration) {
    eprintln!();
    match report.mode {
        Mode::Generate => eprintln!(
            "Summary: {} digested, {} failed",
            report.records.len(),
            report.failures.len()
        ),
        Mode::Verify => eprintln!(
            "Summary: {} verified, {} mismatched, {} not in manifest, {} failed",
            report.verified,
            report.count_failures(FailureReason::DigestMismatch),
            report.count_failures(FailureReason::MissingExpectedDigest),
            report.count_failures(FailureReason::IoError)
        ),
    }
    if report.cancelled {
        eprintln!(
            "Cancelled: {} files were not processed",
            report.count_failures(FailureReason::Cancelled)
        );
    }
    eprintln!("Bytes read: {}", CliProgress::format_bytes(report.bytes_read));
    eprintln!("Elapsed: {}", CliProgress::format_duration(elapsed));

    if !report.failures.is_empty() {
        eprintln!();
        eprintln!("Failed files:");
        for failure in &report.failures {
            match &failure.error_message {
                Some(msg) => eprintln!("  {}: {} ({})", failure.file, failure.reason, msg),
                None => eprintln!("  {}: {}", failure.file, failure.reason),
            }
        }
    }
}

fn report_not_on_disk(keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    eprintln!();
    eprintln!("Listed in manifest but not found on disk:");
    for key in keys {
        eprintln!("  {}", key);
    }
}
