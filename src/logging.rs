//! Tracing subscriber setup for hosts that do not install their own.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"aprsfeed=info"`).
///
/// Returns `false` if a global subscriber was already installed; calling
/// this more than once is harmless.
pub fn init(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init().is_ok()
}
