//! Tracing subscriber setup shared by the supervisor and its workers.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use vbmc_common::LogConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.level`. The returned guard flushes the log
/// file and must live as long as the process.
///
/// # Errors
///
/// Fails on an invalid level, an unusable log file path, or when a
/// subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid log level '{}'", config.level))?,
    };

    let stderr = config
        .use_stderr
        .then(|| fmt::layer().with_writer(std::io::stderr));

    let (file, guard) = match &config.logfile {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_appender(path)?);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(guard)
}

fn open_appender(path: &Path) -> Result<RollingFileAppender> {
    let name = path
        .file_name()
        .with_context(|| format!("log file path {} has no file name", path.display()))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .with_context(|| format!("opening log file {}", path.display()))
}
