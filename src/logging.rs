use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "northwoods_events=info";
const LOG_FILE: &str = "northwoods-events.log";

/// Where the JSON run log goes: `NWE_LOG_DIR`, else `logs/`.
pub fn log_dir(env_value: Option<&str>) -> PathBuf {
    match env_value.map(str::trim) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from("logs"),
    }
}

/// `RUST_LOG` when it parses, otherwise info for this crate only.
pub fn filter(env_value: Option<&str>) -> EnvFilter {
    env_value
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Console output plus a daily-rotated JSON file. Without a writable log
/// directory the run logs to the console only. Keep the guard alive until exit
/// so buffered lines reach the file.
pub fn init_logging() -> Option<WorkerGuard> {
    let dir = log_dir(std::env::var("NWE_LOG_DIR").ok().as_deref());
    let filter = filter(std::env::var("RUST_LOG").ok().as_deref());

    if let Err(e) = fs::create_dir_all(&dir) {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stdout))
            .init();
        tracing::warn!("Log directory {} unavailable ({}), console only", dir.display(), e);
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(writer))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();
    Some(guard)
}
