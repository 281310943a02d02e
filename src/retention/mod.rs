//! Bounded-count cleanup of the screenshot directory.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Placeholder kept in the artifact directory so it survives in version
/// control. Never counted and never removed.
pub const PLACEHOLDER_FILE: &str = ".gitkeep";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: usize,
    pub kept: usize,
    pub failed: usize,
}

/// Delete the oldest artifact files in `dir` until at most `keep` remain.
///
/// A missing directory is a no-op. Files that vanish before removal are
/// skipped silently; other removal errors are logged and counted in
/// [`PurgeReport::failed`]. Only a failure to list `dir` is returned.
pub fn purge(dir: &Path, keep: usize) -> Result<PurgeReport> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Artifact directory missing; nothing to purge");
            return Ok(PurgeReport::default());
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to list artifact directory {}", dir.display()));
        }
    };

    let mut files: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), "Skipping unreadable directory entry: {e}");
                continue;
            }
        };
        if entry.file_name() == PLACEHOLDER_FILE {
            continue;
        }
        let path = entry.path();
        let Ok(meta) = fs::metadata(&path) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(UNIX_EPOCH);
        files.push((path, modified));
    }

    // Oldest first; name breaks ties so equal mtimes purge deterministically.
    files.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    let excess = files.len().saturating_sub(keep);
    let mut report = PurgeReport {
        kept: files.len() - excess,
        ..PurgeReport::default()
    };

    for (path, _) in files.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(file = %path.display(), "Purged artifact");
                report.removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(file = %path.display(), "Artifact already gone");
            }
            Err(e) => {
                warn!(file = %path.display(), "Failed to purge artifact: {e}");
                report.failed += 1;
                report.kept += 1;
            }
        }
    }

    if report.removed > 0 {
        info!(
            dir = %dir.display(),
            removed = report.removed,
            kept = report.kept,
            "Purged old screenshots"
        );
    }
    Ok(report)
}
