//! Tracing subscriber setup for binaries embedding the relay.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Installs a fmt subscriber filtered by `RUST_LOG`, or by `default_filter` when
/// `RUST_LOG` is unset. Does nothing if a global subscriber is already set.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
