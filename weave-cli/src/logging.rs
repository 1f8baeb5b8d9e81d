//! Logging setup
//!
//! Logs go to stderr and to `<communication>/logs/weave.log`. `RUST_LOG`
//! takes precedence over the configured log level.

use anyhow::Result;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use weave_runner::Config;
use weave_runner::repository::FileMailbox;

pub const LOG_FILE: &str = "weave.log";

pub fn init(config: &Config) -> Result<()> {
    let logs_dir = FileMailbox::new(config.communication_path()).logs_dir();

    // Falls back to stderr only when the log file cannot be opened
    let file_layer = std::fs::create_dir_all(&logs_dir)
        .and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(logs_dir.join(LOG_FILE))
        })
        .map(|file| fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .map_err(|e| eprintln!("Log file disabled ({}): {}", logs_dir.display(), e))
        .ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config).into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;

    Ok(())
}

fn default_filter(config: &Config) -> String {
    format!(
        "weave_runner={level},weave_cli={level}",
        level = config.log_level
    )
}
