//! Tracing setup shared by embedding hosts and the test suite.
//!
//! Output goes to stdout through a compact formatter and, in addition, to a
//! log file behind a non-blocking writer. The file target defaults to
//! `logs/tagmem.log` and can be redirected with the `TAGMEM_LOG_FILE`
//! environment variable. Filtering follows `RUST_LOG` (default `info`).

use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_FILE: &str = "logs/tagmem.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the process-wide tracing subscriber.
///
/// Safe to call from multiple entry points (a host binary, each integration
/// test): only the first call installs a subscriber, later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = fmt::layer().with_target(false).compact();
    let base = tracing_subscriber::registry().with(filter).with(stdout);

    match file_writer() {
        Some(writer) => {
            let file = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .compact();
            let _ = base.with(file).try_init();
        }
        None => {
            let _ = base.try_init();
        }
    }
}

/// Resolve the log-file target and open a non-blocking appender for it.
///
/// The parent directory is created on demand. Returns `None` when the target
/// path has no file name or the directory cannot be created; logging then
/// proceeds on stdout alone.
fn file_writer() -> Option<NonBlocking> {
    let target = std::env::var("TAGMEM_LOG_FILE").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let target = Path::new(&target);
    let file_name = target.file_name()?;
    let directory = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    if let Err(error) = std::fs::create_dir_all(directory) {
        eprintln!(
            "Cannot create log directory {}: {error}",
            directory.display()
        );
        return None;
    }

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);
    Some(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_a_no_op() {
        init_tracing();
        init_tracing();
        tracing::info!("subscriber still installed");
    }
}
