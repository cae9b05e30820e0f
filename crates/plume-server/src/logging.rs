//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber with the configured level as the default
/// directive. `RUST_LOG` still wins when set. Safe to call more than once;
/// later calls are no-ops.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
