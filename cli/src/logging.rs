//! Logging init: structured logs on stderr, filtered by `RUST_LOG`.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// Without `RUST_LOG` only warnings are shown, so log lines do not break up
/// the progress bar; `--verbose` raises the default to debug.
pub fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose {
        "info,sumcheck=debug,sumcheck_engine=debug"
    } else {
        "warn"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(verbose)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {}", e))
}
