//! Logging setup for host shells.
//!
//! Filter comes from `RUST_LOG`, defaulting to `info`. ANSI colors are off on
//! Android, where output ends up in logcat.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!cfg!(target_os = "android"))
        .with_target(false)
        .try_init();
}
