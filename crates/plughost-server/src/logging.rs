//! Subscriber setup shared by both binaries.
//!
//! The destination comes from `middleware/system/log`: unset or `stdout`
//! writes to stdout, `syslog` to stderr, and anything else names a file under
//! `<root>/logs/`.

use std::path::{Path, PathBuf};

use plughost_runtime::config::SYSTEM_LOG;
use plughost_runtime::{ConfigSource, HostPaths, TomlConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    Stdout,
    Stderr,
    File(PathBuf),
}

impl LogDestination {
    pub fn parse(value: Option<&str>, logs_dir: &Path) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("stdout") => Self::Stdout,
            Some("syslog") => Self::Stderr,
            Some(file) => Self::File(logs_dir.join(file)),
        }
    }

    /// Destination configured for `plugin`. An unreadable configuration
    /// falls back to stdout; loading the host reports the real error.
    pub fn for_plugin(paths: &HostPaths, plugin: &str) -> Self {
        let configured = TomlConfig::load(paths, plugin)
            .ok()
            .and_then(|c| c.get(SYSTEM_LOG));
        Self::parse(configured.as_deref(), &paths.logs_dir())
    }
}

/// Keeps the file writer flushing; hold it for the life of the process.
#[must_use]
pub struct LogGuard(#[allow(dead_code)] Option<WorkerGuard>);

fn filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

pub fn init(destination: &LogDestination, debug: bool) -> anyhow::Result<LogGuard> {
    let registry = tracing_subscriber::registry().with(filter(debug));

    match destination {
        LogDestination::Stdout => {
            registry.with(tracing_subscriber::fmt::layer()).try_init()?;
            Ok(LogGuard(None))
        }
        LogDestination::Stderr => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()?;
            Ok(LogGuard(None))
        }
        LogDestination::File(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)?;
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("invalid log file {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .try_init()?;
            Ok(LogGuard(Some(guard)))
        }
    }
}
