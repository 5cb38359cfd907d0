//! Ctrl-C handling: the first interrupt cancels the run, a second one exits.

use anyhow::{Context, Result};
use std::thread;
use sumcheck_engine::CancelToken;
use tracing::warn;

/// Exit status used when the user aborts.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Cancel `token` on the first Ctrl-C; exit immediately on the second.
///
/// The signal is awaited on a small dedicated runtime so the rest of the
/// CLI stays synchronous.
pub fn cancel_on_ctrl_c(token: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;

    thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                if token.cancel() {
                    warn!("interrupt received, cancelling run");
                    eprintln!("\nInterrupted: finishing in-flight reads (Ctrl-C again to abort)");
                }
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            })
        })
        .context("Failed to spawn signal thread")?;

    Ok(())
}
