use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "tunebar.log";
const DEFAULT_FILTER: &str = "info,tunebar=debug";

pub fn init(dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(dir)?;

    let file_appender = tracing_appender::rolling::never(dir, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = tracing_subscriber::fmt()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}
