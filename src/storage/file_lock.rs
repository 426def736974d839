//! Advisory lock file guarding every mutation of the store.
//!
//! The lock is a plain file created with `create_new`, so exactly one of
//! several racing creators wins. A lock whose modification time is older
//! than the TTL is treated as abandoned (its holder crashed) and taken over.
//!
//! # Safety
//! - The lock is released when [`StoreLock`] is dropped
//! - Release never fails; a missing lock file is not an error
//! - There is no queueing: a conflicting acquire fails immediately

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

use super::paths::StorePaths;

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// `<pid>:<uuid>` of the holder.
    pub owner: String,
    /// When the lock was taken.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

enum Existing {
    Vanished,
    Stale { owner: String, age: Duration },
    Held { owner: String, age: Duration },
}

/// Exclusive store lock.
///
/// Holding a `&StoreLock` is the capability required by every function that
/// mutates the collection. The lock file is removed when this value is
/// released or dropped.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    owner: String,
    released: bool,
}

impl StoreLock {
    /// Attempt to acquire the store lock.
    ///
    /// # Arguments
    /// * `paths` - Resolver for the data root
    /// * `ttl` - Age after which an existing lock is considered abandoned
    ///
    /// # Errors
    /// - `STORE_LOCKED` if another holder's lock is younger than `ttl`
    /// - `STORE_LOCK_IO_ERROR` if the lock file cannot be created
    /// - `STORE_LOCK_CHECK_FAILED` if an existing lock cannot be inspected
    pub fn acquire(paths: &StorePaths, ttl: Duration) -> StoreResult<Self> {
        let path = paths.lock();
        let owner = format!("{}:{}", std::process::id(), Uuid::new_v4());

        if let Some(lock) = Self::try_create(&path, &owner)? {
            return Ok(lock);
        }

        match inspect(&path, ttl)? {
            Existing::Vanished => {}
            Existing::Held { owner, age } => return Err(StoreError::Locked { owner, age, ttl }),
            Existing::Stale { owner: stale_owner, age } => {
                warn!(
                    path = %path.display(),
                    owner = %stale_owner,
                    age_ms = age.as_millis(),
                    "Taking over stale store lock"
                );
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(source) => return Err(StoreError::LockCheck { path, source }),
                }
            }
        }

        // Single retry; losing this race means someone else just took it.
        match Self::try_create(&path, &owner)? {
            Some(lock) => Ok(lock),
            None => {
                let (owner, age) = match inspect(&path, ttl) {
                    Ok(Existing::Held { owner, age } | Existing::Stale { owner, age }) => (owner, age),
                    _ => ("unknown".to_string(), Duration::ZERO),
                };
                Err(StoreError::Locked { owner, age, ttl })
            }
        }
    }

    /// Returns `Ok(None)` if the lock file already exists.
    fn try_create(path: &Path, owner: &str) -> StoreResult<Option<Self>> {
        let file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(source) => {
                return Err(StoreError::LockIo {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let record = LockRecord {
            owner: owner.to_string(),
            created_at: Utc::now(),
        };
        if let Err(source) = write_record(file, &record) {
            // Half-written; remove it directly.
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove half-written lock");
            }
            return Err(StoreError::LockIo {
                path: path.to_path_buf(),
                source,
            });
        }

        debug!(path = %path.display(), owner = %owner, "Store lock acquired");
        Ok(Some(Self {
            path: path.to_path_buf(),
            owner: owner.to_string(),
            released: false,
        }))
    }

    /// Returns the path to the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns this holder's owner identifier.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Release the lock. Best-effort; never fails.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // Only a lock file that still names us is ours to delete.
        match read_record(&self.path) {
            Some(current) if current.owner == self.owner => {}
            Some(current) => {
                warn!(
                    path = %self.path.display(),
                    owner = %self.owner,
                    holder = %current.owner,
                    "Store lock was taken over; leaving it in place"
                );
                return;
            }
            None if !self.path.exists() => {
                debug!(path = %self.path.display(), "Store lock already gone at release");
                return;
            }
            None => {
                warn!(
                    path = %self.path.display(),
                    owner = %self.owner,
                    "Store lock record unreadable; leaving it in place"
                );
                return;
            }
        }

        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Store lock released"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Store lock already gone at release");
            }
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove store lock"),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

fn write_record(mut file: File, record: &LockRecord) -> std::io::Result<()> {
    let bytes = serde_json::to_vec(record)?;
    file.write_all(&bytes)?;
    file.sync_all()
}

fn read_record(path: &Path) -> Option<LockRecord> {
    let raw = fs::read(path).ok()?;
    serde_json::from_slice(&raw).ok()
}

fn inspect(path: &Path, ttl: Duration) -> StoreResult<Existing> {
    let check_err = |source| StoreError::LockCheck {
        path: path.to_path_buf(),
        source,
    };

    let modified = match fs::metadata(path) {
        Ok(meta) => meta.modified().map_err(check_err)?,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Existing::Vanished),
        Err(e) => return Err(check_err(e)),
    };
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);
    let owner = read_record(path).map_or_else(|| "unknown".to_string(), |r| r.owner);

    if age > ttl {
        Ok(Existing::Stale { owner, age })
    } else {
        Ok(Existing::Held { owner, age })
    }
}
