use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_DIR_ENV: &str = "AUTOROUTE_LOG_DIR";

/// `$AUTOROUTE_LOG_DIR`, falling back to `~/.autoroute/logs`.
pub fn log_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".autoroute/logs")
}

pub fn init_logging(component: &str, to_stderr: bool) -> WorkerGuard {
    let log_dir = log_dir();
    let _ = std::fs::create_dir_all(&log_dir);

    // Files like cli.log.2026-01-21
    let file_appender = tracing_appender::rolling::daily(&log_dir, format!("{component}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if to_stderr {
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false);
        // A subscriber may already be installed (tests, embedding hosts).
        let _ = registry.with(stderr_layer).try_init();
    } else {
        let _ = registry.try_init();
    }

    guard
}
