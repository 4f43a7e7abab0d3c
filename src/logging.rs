//! Subscriber setup for the binary.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `fmt` subscriber, writing to stderr. `RUST_LOG`, when
/// set, replaces `level`.
pub fn init_logging(level: &str) -> Result<(), String> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| format!("invalid log level: {e}"))?,
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| "logging already initialized".to_string())
}
