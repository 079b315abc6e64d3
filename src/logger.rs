//! Debug logging support for agentedit
//!
//! When debug mode is enabled via config or `--debug`, operations are logged
//! to a file. Logs are written to /var/log/agentedit.log if writable,
//! otherwise ~/.agentedit/agentedit.log. Stdout is never used because it
//! carries responses in `serve` mode.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, registry};

const LOG_FILE_NAME: &str = "agentedit.log";
const VAR_LOG_DIR: &str = "/var/log";

/// Initialize the debug logging system
///
/// Returns the path to the log file, or None if logging is not enabled or
/// the log file could not be opened.
pub fn init_debug_logging(debug_enabled: bool) -> Result<Option<PathBuf>> {
    if !debug_enabled {
        return Ok(None);
    }

    let log_dir = get_log_dir()?;
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    match open_appender(&log_dir) {
        Ok(appender) => {
            let subscriber = registry()
                .with(
                    fmt::layer()
                        .with_writer(appender)
                        .with_ansi(false)
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .with(default_filter());

            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

            Ok(Some(log_dir.join(LOG_FILE_NAME)))
        }
        Err(e) => {
            // Editing must keep working without a log file
            eprintln!("Warning: Could not create log file: {:#}", e);
            Ok(None)
        }
    }
}

/// `RUST_LOG` wins when set, otherwise info for this crate only
fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agentedit=info"))
}

fn open_appender(dir: &Path) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_NAME)
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))
}

/// Directory holding the log file
fn get_log_dir() -> Result<PathBuf> {
    if can_write_to_var_log() {
        return Ok(PathBuf::from(VAR_LOG_DIR));
    }

    let home_dir = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home_dir.join(".agentedit"))
}

fn can_write_to_var_log() -> bool {
    let test_file = Path::new(VAR_LOG_DIR).join(".agentedit_test_write");
    match fs::write(&test_file, b"") {
        Ok(_) => {
            let _ = fs::remove_file(&test_file);
            true
        }
        Err(_) => false,
    }
}

/// Get the current log file path without initializing logging
///
/// Used by `agentedit config --show`
pub fn get_current_log_path() -> PathBuf {
    if can_write_to_var_log() {
        Path::new(VAR_LOG_DIR).join(LOG_FILE_NAME)
    } else {
        dirs::home_dir()
            .map(|h| h.join(".agentedit").join(LOG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from("~/.agentedit/agentedit.log"))
    }
}
