//! File logging with size-based rotation
//!
//! The hook runs inside an interactive session, so nothing is ever written to
//! stdout or stderr.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
pub const LOG_BACKUPS: usize = 3;

fn backup_path(log_file: &Path, index: usize) -> PathBuf {
    let mut name = log_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}", index));
    log_file.with_file_name(name)
}

/// Shift `hooktrace.log` to `hooktrace.log.1` once it exceeds `max_bytes`,
/// keeping at most `LOG_BACKUPS` older files
pub fn rotate_if_needed(log_file: &Path, max_bytes: u64) -> std::io::Result<bool> {
    let size = match std::fs::metadata(log_file) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size <= max_bytes {
        return Ok(false);
    }

    let oldest = backup_path(log_file, LOG_BACKUPS);
    if oldest.exists() {
        std::fs::remove_file(&oldest)?;
    }
    for index in (1..LOG_BACKUPS).rev() {
        let from = backup_path(log_file, index);
        if from.exists() {
            std::fs::rename(&from, backup_path(log_file, index + 1))?;
        }
    }
    std::fs::rename(log_file, backup_path(log_file, 1))?;
    Ok(true)
}

/// Install the global subscriber writing to `log_file`
///
/// `RUST_LOG` overrides the level chosen by `debug`.
pub fn init(log_file: &Path, debug: bool) -> anyhow::Result<()> {
    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    rotate_if_needed(log_file, MAX_LOG_BYTES)?;

    let file = OpenOptions::new().create(true).append(true).open(log_file)?;
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))
}
