//! Logging setup.
//!
//! stdout carries only the query response (the `--json` object or the
//! status line and payload), so scripts can pipe it. Every log line goes to
//! stderr or, with `--log-file`, to a file that is truncated on each run.
//! `RUST_LOG` overrides the default `info` filter.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "fleet-probe.log";

/// Where log lines are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

/// Installs the global subscriber. A log file that cannot be opened falls
/// back to stderr with a warning there.
pub fn init(target: LogTarget) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = match &target {
        LogTarget::Stderr => None,
        LogTarget::File(path) => match open_log_file(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: cannot log to {}: {e}", path.display());
                None
            }
        },
    };

    match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file)
            .with_ansi(false)
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init(),
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(path)
}

/// Log file location: the platform state dir (`~/.local/state` on Linux),
/// else the config dir, else the temp dir.
pub fn log_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::config_dir)
        .map(|dir| dir.join("fleet-probe").join(LOG_FILE))
        .unwrap_or_else(|| std::env::temp_dir().join(LOG_FILE))
}
