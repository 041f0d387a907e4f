//! `tracing` subscriber setup.
//!
//! The server writes JSON lines to a daily file under `[logging] dir` and
//! mirrors readable output on stderr. One-shot subcommands log to stderr
//! only.

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Keeps the background log writer running; drop it last.
pub struct LoggingGuard {
    _writer: WorkerGuard,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LoggingGuard")
    }
}

/// `RUST_LOG` when set, else `fallback`, else `info`.
fn filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the server subscriber.
///
/// Files are named `feira.YYYY-MM-DD.log`; only the newest
/// `keep_files` are retained.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the appender
/// cannot open its file.
pub fn init_production(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(&config.dir)
        .with_context(|| format!("failed to create logs directory {}", config.dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("feira")
        .filename_suffix("log")
        .max_log_files(config.keep_files.max(1))
        .build(&config.dir)
        .context("failed to open log file")?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter(&config.level))
        .with(fmt::layer().json().with_current_span(false).with_writer(writer))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    Ok(LoggingGuard { _writer: guard })
}

/// Install a stderr-only subscriber.
pub fn init_cli() {
    fmt()
        .with_env_filter(filter("info"))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
