//! Structured logging setup and the process-wide "first error" sentinel.
//!
//! Wires a `tracing` subscriber: a console layer (optionally colored,
//! filtered by an `EnvFilter`) and an optional rotating file layer backed by
//! `tracing-appender`. Every image worker logs through `tracing::info!` /
//! `warn!` / `error!` directly; this module also tracks whether anything
//! failed across the run via a sticky first-error slot used to set the
//! process exit code.

use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

static FIRST_ERROR: OnceLock<String> = OnceLock::new();

/// Records `message` as the run's first error, if none has been recorded
/// yet. Later calls are no-ops — the first failure wins, matching the
/// run's sticky first-error slot.
pub fn set_first_error(message: impl Into<String>) {
    let _ = FIRST_ERROR.set(message.into());
}

/// The first error recorded this run, if any. `main` uses this to choose
/// the process exit code once every worker has finished.
pub fn first_error() -> Option<&'static str> {
    FIRST_ERROR.get().map(String::as_str)
}

/// Verbosity requested on the command line, from quietest to loudest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    Trace,
}

impl Verbosity {
    fn as_filter_directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::Trace => "trace",
        }
    }
}

/// Must be held for the lifetime of the process; dropping it stops the
/// background thread that flushes the file log.
#[must_use]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initializes the global `tracing` subscriber: a console layer plus, when
/// `log_file` is given, a daily-rotating file layer. `color` toggles ANSI
/// escapes on the console layer (auto-disabled for non-terminal output by
/// callers that care, via `colored::control::set_override`).
pub fn init(verbosity: Verbosity, log_file: Option<&Path>, color: bool) -> LoggingGuard {
    colored::control::set_override(color);

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.as_filter_directive()));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(color)
        .with_filter(console_filter);

    let (file_layer, file_guard) = match log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "archive-registry-pusher.log".to_string());
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(console_layer).with(file_layer);

    // Only the first call to `init` in a process should install a global
    // subscriber; a second call (e.g. from tests run in the same binary)
    // would otherwise panic, so the error is swallowed deliberately.
    let _ = registry.try_init();

    LoggingGuard {
        _file_guard: file_guard,
    }
}

/// Formats a byte count the way progress output and summaries want it:
/// `512 B`, `12.3 KB`, `1.2 GB`, etc.
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit_index = 0;
    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }
    if unit_index == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit_index])
    }
}

/// Formats a duration the way a run summary wants it, e.g. `3m12s`.
pub fn format_duration(duration: std::time::Duration) -> String {
    humantime::format_duration(std::time::Duration::from_secs(duration.as_secs())).to_string()
}
