//! Time-based garbage collection for the filesystem store.
//!
//! Expired filesystem entries are not removed when they expire; an external
//! scheduler runs this sweep at the configured cadence. The indexed store
//! needs no sweep: its entries self-expire.

use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::CacheError;

/// What a sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
}

pub struct GarbageCollector;

impl GarbageCollector {
    /// Delete every file under `root` whose modification time is older than
    /// `older_than`, then prune emptied directories best-effort.
    ///
    /// Idempotent and safe against concurrent writes: age is evaluated by
    /// current mtime at visit time, so a file written mid-sweep is skipped;
    /// entries that vanish between enumeration and delete are no-ops. The
    /// root directory itself is never removed. There is no global lock.
    pub async fn sweep(root: &Path, older_than: Duration) -> Result<SweepReport, CacheError> {
        let root = root.to_path_buf();
        let report = tokio::task::spawn_blocking(move || sweep_blocking(&root, older_than))
            .await
            .map_err(|err| CacheError::write_failure(format!("sweep task failed: {err}")))?;

        debug!(
            target = "staticcache::gc",
            files_removed = report.files_removed,
            dirs_removed = report.dirs_removed,
            "garbage collection sweep finished"
        );
        Ok(report)
    }
}

fn sweep_blocking(root: &Path, older_than: Duration) -> SweepReport {
    let mut report = SweepReport::default();
    if !root.is_dir() {
        return report;
    }

    // Contents-first so emptied directories can be pruned in the same pass.
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            // Vanished mid-walk, or unreadable; either way not ours to fail on.
            Err(err) => {
                debug!(target = "staticcache::gc", error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        if entry.file_type().is_dir() {
            // Fails while non-empty; that is the pruning rule, not an error.
            if std::fs::remove_dir(entry.path()).is_ok() {
                report.dirs_removed += 1;
            }
            continue;
        }

        let age = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.modified().ok())
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok());
        let Some(age) = age else {
            continue;
        };

        if age >= older_than {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => report.files_removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        target = "staticcache::gc",
                        path = %entry.path().display(),
                        error = %err,
                        "failed to remove expired cache file"
                    );
                }
            }
        }
    }

    report
}
