use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};

/// Workspace crates log at debug; third-party crates only surface errors.
pub const DEFAULT_FILTER: &str =
    "error,backbone=debug,configs=debug,common=debug,stores=debug,service=debug,server=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize tracing subscriber with sensible defaults and stdout writer.
/// - Respects `RUST_LOG` if set
/// - Falls back to [`DEFAULT_FILTER`]
pub fn init_logging_default() {
    let _ = fmt()
        .with_env_filter(env_filter())
        .compact()
        .with_writer(io::stdout)
        .try_init();
}

/// Initialize tracing subscriber with JSON structured output on stdout.
pub fn init_logging_json() {
    let _ = fmt()
        .with_env_filter(env_filter())
        .json()
        .with_writer(io::stdout)
        .try_init();
}

/// Append plain-text logs to `path`, creating the file if needed.
pub fn init_logging_file(path: impl AsRef<Path>) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())
        .map_err(|e| anyhow::anyhow!("cannot open log file {}: {e}", path.as_ref().display()))?;
    let _ = fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

/// Log to the file named by `LOGFILE` when present, stdout otherwise.
pub fn init_logging_from_env() -> anyhow::Result<()> {
    match crate::env::first_var(&["LOGFILE", "logfile"]) {
        Some(path) => init_logging_file(path),
        None => {
            init_logging_default();
            Ok(())
        }
    }
}
