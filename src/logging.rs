use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Keeps the non-blocking log writer flushing until dropped.
pub struct LogGuard {
    _guard: WorkerGuard,
}

fn filter(level: &str) -> EnvFilter {
    let default: Directive = level
        .parse()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    // RUST_LOG wins over the command line.
    EnvFilter::builder()
        .with_default_directive(default)
        .from_env_lossy()
}

/// Logs to `path`. Used by the terminal front end, which owns stdout.
pub fn init_file(level: &str, path: &Path) -> Result<LogGuard> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("create log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(filter(level))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("install log subscriber")?;

    tracing::info!(path = %path.display(), "logging initialized");
    Ok(LogGuard { _guard: guard })
}

/// Logs to stderr, leaving stdout for program output.
pub fn init_stderr(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .context("install log subscriber")
}
