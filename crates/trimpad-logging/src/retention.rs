use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};

use crate::config::LoggingConfig;
use crate::fs::log_dir;

const MAX_LOG_BYTES: u64 = 16 * 1024 * 1024;

struct LogFile {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

/// Deletes expired logs, then trims the oldest until the directory fits the size cap.
pub fn run_retention(root: &Path, cfg: &LoggingConfig) -> Result<()> {
    run_retention_with_cap(root, cfg, MAX_LOG_BYTES)
}

fn run_retention_with_cap(root: &Path, cfg: &LoggingConfig, cap: u64) -> Result<()> {
    let mut entries = collect_log_files(&log_dir(root))?;

    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(
            cfg.keep_days.saturating_mul(24 * 60 * 60),
        ))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    entries.retain(|entry| {
        if entry.modified >= cutoff {
            return true;
        }
        match fs::remove_file(&entry.path) {
            Ok(()) => false,
            Err(err) => {
                tracing::warn!("Failed to remove old log {}: {}", entry.path.display(), err);
                true
            }
        }
    });

    let mut total_size: u64 = entries.iter().map(|e| e.size).sum();
    if total_size <= cap {
        return Ok(());
    }

    entries.sort_by_key(|e| e.modified);
    for entry in entries {
        if total_size <= cap {
            break;
        }
        if let Err(err) = fs::remove_file(&entry.path) {
            tracing::warn!(
                "Failed to remove log {} during size cap cleanup: {}",
                entry.path.display(),
                err
            );
            continue;
        }
        total_size = total_size.saturating_sub(entry.size);
    }

    Ok(())
}

fn collect_log_files(dir: &Path) -> Result<Vec<LogFile>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }

    let entries = fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("iterating {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_log = path
            .file_name()
            .and_then(|s| s.to_str())
            .map(|name| name.contains(".log"))
            .unwrap_or(false);
        if !is_log {
            continue;
        }

        let metadata = fs::metadata(&path).with_context(|| format!("stat {}", path.display()))?;
        files.push(LogFile {
            path,
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size: metadata.len(),
        });
    }

    Ok(files)
}
