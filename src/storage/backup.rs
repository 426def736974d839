//! Rotating snapshots of the main file.
//!
//! A snapshot is taken before every write and named with a strictly
//! increasing timestamp. Only the newest `max_backups` are retained. When
//! the main file is found corrupt, the newest snapshot that still parses is
//! published back as main.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::car::Car;
use crate::error::{StoreError, StoreResult};

use super::codec;
use super::file_lock::StoreLock;
use super::paths::StorePaths;
use super::writer;

/// A snapshot file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// Full path of the snapshot.
    pub path: PathBuf,
    /// Modification time, used for recency ordering.
    pub modified: SystemTime,
}

impl BackupEntry {
    /// File name of the snapshot.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Parses the snapshot.
    ///
    /// # Errors
    /// Any codec error for a missing, unreadable or malformed snapshot.
    pub fn read(&self) -> StoreResult<Vec<Car>> {
        codec::read_strict(&self.path)
    }
}

/// Lists snapshots newest first.
///
/// Ordering is by modification time, ties broken by the (timestamped) name.
/// A missing data root yields an empty list.
///
/// # Errors
/// `CARS_STORE_READ_FAILED` if the data root cannot be listed.
pub fn list_backups(paths: &StorePaths) -> StoreResult<Vec<BackupEntry>> {
    let read_err = |e: std::io::Error| StoreError::StoreRead {
        message: format!("failed to list backups in {}: {e}", paths.root().display()),
    };

    let dir = match fs::read_dir(paths.root()) {
        Ok(dir) => dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(read_err(e)),
    };

    let mut entries = Vec::new();
    for entry in dir {
        let entry = entry.map_err(read_err)?;
        let name = entry.file_name();
        if !name.to_str().map_or(false, StorePaths::is_backup_name) {
            continue;
        }
        // Pruned concurrently; skip.
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        entries.push(BackupEntry {
            path: entry.path(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    entries.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| b.name().cmp(a.name()))
    });
    Ok(entries)
}

/// Copies the main file into a fresh snapshot and returns its path.
///
/// The timestamp is bumped a millisecond at a time until the name sorts
/// after every existing snapshot.
///
/// # Errors
/// `CARS_BACKUP_FAILED` if the copy fails.
pub fn create_backup(paths: &StorePaths, _lock: &StoreLock) -> StoreResult<PathBuf> {
    let newest = list_backups(paths)
        .unwrap_or_default()
        .into_iter()
        .map(|e| e.name().to_string())
        .max();

    let mut at = Utc::now();
    let mut target = paths.backup(at);
    while target.exists() || newest.as_deref().map_or(false, |n| file_name(&target) <= n) {
        at += Duration::milliseconds(1);
        target = paths.backup(at);
    }

    fs::copy(paths.main(), &target).map_err(|source| StoreError::Backup {
        path: target.clone(),
        source,
    })?;
    debug!(path = %target.display(), "Backup created");
    Ok(target)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// Deletes every snapshot beyond the newest `max_backups`.
///
/// Best-effort: listing or deletion failures are logged and skipped.
/// Returns the number of snapshots deleted.
pub fn prune(paths: &StorePaths, max_backups: usize) -> usize {
    let entries = match list_backups(paths) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Skipping backup pruning");
            return 0;
        }
    };

    let mut deleted = 0;
    for entry in entries.iter().skip(max_backups) {
        match fs::remove_file(&entry.path) {
            Ok(()) => deleted += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %entry.path.display(), error = %e, "Failed to prune backup"),
        }
    }
    if deleted > 0 {
        debug!(deleted, kept = max_backups, "Pruned backups");
    }
    deleted
}

/// Publishes the newest parseable snapshot as the main file.
///
/// Empty and malformed snapshots are skipped. The restored main file is
/// byte-identical to the chosen snapshot. Returns `None` if no snapshot
/// qualifies.
///
/// # Errors
/// - `CARS_STORE_READ_FAILED` if snapshots cannot be listed
/// - `CARS_STORE_WRITE_FAILED` if publishing the snapshot fails
pub fn restore_latest_valid(paths: &StorePaths, lock: &StoreLock) -> StoreResult<Option<Vec<Car>>> {
    for entry in list_backups(paths)? {
        let bytes = match fs::read(&entry.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "Unreadable backup; skipping");
                continue;
            }
        };
        if codec::is_blank(&bytes) {
            debug!(path = %entry.path.display(), "Empty backup; skipping");
            continue;
        }
        match codec::decode(&entry.path, &bytes) {
            Ok(cars) => {
                writer::publish_bytes(paths, lock, &bytes)?;
                info!(
                    backup = %entry.path.display(),
                    records = cars.len(),
                    "Restored collection from backup"
                );
                return Ok(Some(cars));
            }
            Err(e) => warn!(path = %entry.path.display(), error = %e, "Invalid backup; skipping"),
        }
    }
    Ok(None)
}
