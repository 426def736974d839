//! Atomic whole-collection replacement.
//!
//! # Protocol
//! 1. Write the new version to `cars.json.tmp` and fsync it.
//! 2. Snapshot the current `cars.json` into a backup (if enabled and non-empty).
//! 3. Publish: `cars.json` → `cars.json.swap`, `cars.json.tmp` → `cars.json`,
//!    then delete the swap file.
//!
//! Readers therefore see either the old or the new file, never a partial
//! one. A crash between the two renames is healed by
//! [`ensure_consistency`](super::recovery::ensure_consistency).

use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};

use tracing::{debug, warn};

use crate::car::Car;
use crate::error::{StoreError, StoreResult};

use super::backup;
use super::codec;
use super::file_lock::StoreLock;
use super::paths::StorePaths;

/// Replace the persisted collection with `cars`.
///
/// # Arguments
/// * `paths` - Resolver for the data root
/// * `lock` - Proof that the caller holds the store lock
/// * `cars` - The complete new collection
/// * `max_backups` - Snapshots to retain; `0` disables backups
///
/// # Errors
/// - `CARS_STORE_WRITE_FAILED` if staging or publishing fails
/// - `CARS_BACKUP_FAILED` if the pre-write snapshot cannot be taken
pub fn write_all(
    paths: &StorePaths,
    lock: &StoreLock,
    cars: &[Car],
    max_backups: usize,
) -> StoreResult<()> {
    let bytes = codec::encode(cars)
        .map_err(|e| StoreError::write(&paths.temp(), io::Error::new(ErrorKind::InvalidData, e)))?;
    stage(paths, &bytes)?;

    if max_backups > 0 && main_has_content(paths) {
        if let Err(e) = backup::create_backup(paths, lock) {
            discard_temp(paths);
            return Err(e);
        }
        backup::prune(paths, max_backups);
    }

    publish(paths)?;
    debug!(path = %paths.main().display(), records = cars.len(), "Collection written");
    Ok(())
}

/// Publish raw bytes as the new main file without taking a backup.
///
/// Used to restore a snapshot byte-for-byte.
///
/// # Errors
/// `CARS_STORE_WRITE_FAILED` if staging or publishing fails.
pub fn publish_bytes(paths: &StorePaths, _lock: &StoreLock, bytes: &[u8]) -> StoreResult<()> {
    stage(paths, bytes)?;
    publish(paths)
}

fn main_has_content(paths: &StorePaths) -> bool {
    fs::metadata(paths.main()).map_or(false, |m| m.len() > 0)
}

fn stage(paths: &StorePaths, bytes: &[u8]) -> StoreResult<()> {
    let temp = paths.temp();
    let result = File::create(&temp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    result.map_err(|e| {
        discard_temp(paths);
        StoreError::write(&temp, e)
    })
}

fn publish(paths: &StorePaths) -> StoreResult<()> {
    let main = paths.main();
    let swap = paths.swap();
    let temp = paths.temp();

    let main_exists = main.exists();
    if main_exists && swap.exists() {
        // Leftover from a cycle that crashed after its second rename.
        fs::remove_file(&swap).map_err(|e| StoreError::write(&swap, e))?;
    }
    if main_exists {
        fs::rename(&main, &swap).map_err(|e| StoreError::write(&swap, e))?;
    }
    fs::rename(&temp, &main).map_err(|e| StoreError::write(&main, e))?;

    remove_best_effort(&swap);
    Ok(())
}

fn discard_temp(paths: &StorePaths) {
    remove_best_effort(&paths.temp());
}

fn remove_best_effort(path: &std::path::Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Best-effort cleanup failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::CarId;
    use std::time::Duration;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, StorePaths) {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path());
        (dir, paths)
    }

    fn sample(n: u64) -> Vec<Car> {
        (1..=n)
            .map(|i| Car::new(CarId::new(i), format!("{i}_kia_rio_2020")).with_field("brand", "Kia"))
            .collect()
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let (_dir, paths) = setup();
        let lock = StoreLock::acquire(&paths, Duration::from_secs(60)).unwrap();

        let cars = sample(3);
        write_all(&paths, &lock, &cars, 10).unwrap();

        let back = codec::read_strict(&paths.main()).unwrap();
        assert_eq!(back, cars);
        assert!(!paths.temp().exists());
        assert!(!paths.swap().exists());
    }

    #[test]
    fn test_first_write_takes_no_backup() {
        let (_dir, paths) = setup();
        let lock = StoreLock::acquire(&paths, Duration::from_secs(60)).unwrap();

        write_all(&paths, &lock, &sample(1), 10).unwrap();
        assert!(backup::list_backups(&paths).unwrap().is_empty());

        write_all(&paths, &lock, &sample(2), 10).unwrap();
        let backups = backup::list_backups(&paths).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].read().unwrap(), sample(1));
    }

    #[test]
    fn test_backups_disabled() {
        let (_dir, paths) = setup();
        let lock = StoreLock::acquire(&paths, Duration::from_secs(60)).unwrap();

        for n in 1..=3 {
            write_all(&paths, &lock, &sample(n), 0).unwrap();
        }
        assert!(backup::list_backups(&paths).unwrap().is_empty());
    }

    #[test]
    fn test_stale_swap_is_replaced() {
        let (_dir, paths) = setup();
        let lock = StoreLock::acquire(&paths, Duration::from_secs(60)).unwrap();

        write_all(&paths, &lock, &sample(1), 0).unwrap();
        fs::write(paths.swap(), b"stale").unwrap();

        write_all(&paths, &lock, &sample(2), 0).unwrap();
        assert_eq!(codec::read_strict(&paths.main()).unwrap(), sample(2));
        assert!(!paths.swap().exists());
    }

    #[test]
    fn test_staging_failure_leaves_main_untouched() {
        let (_dir, paths) = setup();
        let lock = StoreLock::acquire(&paths, Duration::from_secs(60)).unwrap();
        write_all(&paths, &lock, &sample(1), 0).unwrap();
        let before = fs::read(paths.main()).unwrap();

        // A directory in the temp file's place makes staging fail.
        fs::create_dir(paths.temp()).unwrap();
        let err = write_all(&paths, &lock, &sample(2), 0).unwrap_err();
        assert_eq!(err.kind().code(), "CARS_STORE_WRITE_FAILED");
        assert_eq!(fs::read(paths.main()).unwrap(), before);
    }

    #[test]
    fn test_publish_bytes_is_verbatim() {
        let (_dir, paths) = setup();
        let lock = StoreLock::acquire(&paths, Duration::from_secs(60)).unwrap();

        let raw = b"[{\"id\":7,\"brand\":\"Kia\"}]";
        publish_bytes(&paths, &lock, raw).unwrap();
        assert_eq!(fs::read(paths.main()).unwrap(), raw);
    }
}
