//! Diagnostic tracing for sovbatch.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted.
//!
//! - **Run logs (`io/run_log`)**: product artifacts in the reports directory
//!   (`BATCH_RUN_<stamp>.log`). Always written, unaffected by `RUST_LOG`.
//!
//! Stdout is reserved for machine-readable results (e.g. the two path
//! declarations printed by `sovbatch apply`), so nothing here writes to it.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=sovbatch=debug sovbatch batch
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
