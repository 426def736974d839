//! The record store: whole-collection reads and lock-guarded mutations.
//!
//! Every mutation runs the same critical section:
//!
//! ```text
//! acquire lock → ensure consistency → load (init / normalize / recover)
//!   → mutate → write_all → release lock
//! ```
//!
//! The lock is released by [`StoreLock`]'s `Drop` on every exit path.
//!
//! # Self-healing reads
//! [`CarStore::read_all`] is not purely read-only. When it finds no main
//! file, a blank main file, or a corrupt one, it takes the write lock and
//! repairs the file before returning. Callers that need a strictly passive
//! read should use [`codec::read_strict`] on [`StorePaths::main`].

use std::collections::HashSet;
use std::fs;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::car::{next_id, Car, CarId, CarPatch, NewCar};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult, ValidationError};
use crate::storage::{
    codec, ensure_consistency, restore_latest_valid, write_all, Loaded, StoreLock, StorePaths,
};

/// Result of a locked mutation closure.
pub(crate) enum Outcome<T> {
    /// The collection changed and must be written.
    Persist(T),
    /// Nothing to write.
    Unchanged(T),
}

/// File-backed car collection.
#[derive(Debug, Clone)]
pub struct CarStore {
    config: StoreConfig,
    paths: StorePaths,
}

impl CarStore {
    /// Open a store, creating the data root if needed.
    ///
    /// No file is written until the first read or mutation.
    ///
    /// # Errors
    /// - `STORE_CONFIG_INVALID` if the configuration fails validation
    /// - `CARS_STORE_WRITE_FAILED` if the data root cannot be created
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let config = config.validate()?;
        fs::create_dir_all(&config.data_root).map_err(|e| StoreError::write(&config.data_root, e))?;
        let paths = StorePaths::new(&config.data_root);
        Ok(Self { config, paths })
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path resolver for this store's data root.
    #[must_use]
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Acquire the store lock with the configured TTL.
    ///
    /// # Errors
    /// `STORE_LOCKED`, `STORE_LOCK_IO_ERROR` or `STORE_LOCK_CHECK_FAILED`.
    pub fn lock(&self) -> StoreResult<StoreLock> {
        StoreLock::acquire(&self.paths, self.config.lock_ttl)
    }

    /// Returns the whole collection.
    ///
    /// Side effects, all under the write lock:
    /// - missing file: initialized to `[]` (skipped if the lock is busy)
    /// - blank file: rewritten as `[]` (skipped if the lock is busy)
    /// - corrupt file: restored from the newest valid backup, else reset to `[]`
    ///
    /// # Errors
    /// - `STORE_LOCKED` if the file is corrupt and another holder has the lock
    /// - `CARS_JSON_READ_FAILED` / `CARS_STORE_CONSISTENCY_FAILED` on I/O failure
    /// - any write error raised while repairing
    pub fn read_all(&self) -> StoreResult<Vec<Car>> {
        ensure_consistency(&self.paths)?;

        match codec::load(&self.paths.main())? {
            Loaded::Cars(cars) => Ok(cars),
            Loaded::Missing | Loaded::Blank => match self.lock() {
                Ok(lock) => self.load_locked(&lock),
                Err(e) if e.is_locked() => {
                    debug!("Store busy; skipping opportunistic initialization");
                    Ok(Vec::new())
                }
                Err(e) => Err(e),
            },
            Loaded::Corrupt(_) => {
                let lock = self.lock()?;
                self.load_locked(&lock)
            }
        }
    }

    /// Returns the car with `id`, or `None`.
    ///
    /// # Errors
    /// Any error from [`read_all`](Self::read_all).
    pub fn read_by_id(&self, id: CarId) -> StoreResult<Option<Car>> {
        Ok(self.read_all()?.into_iter().find(|c| c.id == id))
    }

    /// Validates `payload` and appends a new car.
    ///
    /// The id is `max(ids) + 1`, `assets_folder` is derived from the id and
    /// the normalized brand/model/year, `photos` starts empty and the asset
    /// directory is created.
    ///
    /// # Errors
    /// - `VALIDATION_ERROR` if the payload fails a field rule
    /// - `STORE_LOCKED` if another mutation is in progress
    /// - `ASSETS_IO_ERROR` if the asset directory cannot be created
    /// - `CARS_STORE_WRITE_FAILED` if no id is left or the write fails
    pub fn create(&self, payload: Value) -> StoreResult<Car> {
        let new_car = NewCar::from_payload(payload)?;

        let mut created_dir = None;
        let result = self.mutate(|_lock, cars| {
            let car = new_car.into_car(next_id(cars)?);
            let dir = self.paths.asset_dir(&car.assets_folder);
            if !dir.exists() {
                fs::create_dir_all(&dir).map_err(|e| StoreError::assets(&dir, e))?;
                created_dir = Some(dir);
            }

            cars.push(car.clone());
            info!(id = %car.id, assets_folder = %car.assets_folder, "Car created");
            Ok(Outcome::Persist(car))
        });

        if let (Err(e), Some(dir)) = (&result, &created_dir) {
            // Non-recursive: the directory is still empty.
            match fs::remove_dir(dir) {
                Ok(()) => debug!(path = %dir.display(), error = %e, "Removed asset folder of failed create"),
                Err(remove) => warn!(path = %dir.display(), error = %remove, "Failed to remove asset folder"),
            }
        }
        result
    }

    /// Merges `patch` over the car with `id`.
    ///
    /// # Errors
    /// - `READONLY_FIELD` if the patch touches `id`, `assets_folder` or `photos`
    /// - `VALIDATION_ERROR` if a present field fails its rule
    /// - `NOT_FOUND` if no car has `id`
    pub fn update(&self, id: CarId, patch: Value) -> StoreResult<Car> {
        let patch = CarPatch::from_payload(patch)?;

        self.mutate(|_lock, cars| {
            let car = find_mut(cars, id)?;
            if patch.is_empty() {
                return Ok(Outcome::Unchanged(car.clone()));
            }
            patch.apply(car);
            debug!(id = %id, fields = patch.fields.len(), "Car updated");
            Ok(Outcome::Persist(car.clone()))
        })
    }

    /// Removes the car with `id` and returns it.
    ///
    /// The car's asset directory is left on disk.
    ///
    /// # Errors
    /// `NOT_FOUND` if no car has `id`.
    pub fn delete(&self, id: CarId) -> StoreResult<Car> {
        self.mutate(|_lock, cars| {
            let index = cars
                .iter()
                .position(|c| c.id == id)
                .ok_or(StoreError::CarNotFound { id })?;
            let removed = cars.remove(index);
            info!(id = %id, "Car deleted");
            Ok(Outcome::Persist(removed))
        })
    }

    /// Removes every car whose id is in `ids` under one lock and one write.
    ///
    /// Returns the number of cars actually removed; unknown and duplicate
    /// ids are not errors.
    ///
    /// # Errors
    /// `VALIDATION_ERROR` if `ids` is empty.
    pub fn bulk_delete(&self, ids: &[CarId]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Err(ValidationError::InvalidIdList.into());
        }
        let wanted: HashSet<CarId> = ids.iter().copied().collect();

        self.mutate(|_lock, cars| {
            let before = cars.len();
            cars.retain(|c| !wanted.contains(&c.id));
            let deleted = before - cars.len();
            if deleted == 0 {
                return Ok(Outcome::Unchanged(0));
            }
            info!(deleted, requested = ids.len(), "Cars bulk deleted");
            Ok(Outcome::Persist(deleted))
        })
    }

    /// Runs `op` inside the guarded critical section.
    pub(crate) fn mutate<T>(
        &self,
        op: impl FnOnce(&StoreLock, &mut Vec<Car>) -> StoreResult<Outcome<T>>,
    ) -> StoreResult<T> {
        let lock = self.lock()?;
        let mut cars = self.load_locked(&lock)?;

        match op(&lock, &mut cars)? {
            Outcome::Persist(value) => {
                write_all(&self.paths, &lock, &cars, self.config.max_backups)?;
                Ok(value)
            }
            Outcome::Unchanged(value) => Ok(value),
        }
    }

    /// Loads the collection while holding the lock, repairing the file if needed.
    fn load_locked(&self, lock: &StoreLock) -> StoreResult<Vec<Car>> {
        ensure_consistency(&self.paths)?;
        let main = self.paths.main();

        match codec::load(&main)? {
            Loaded::Cars(cars) => Ok(cars),
            Loaded::Missing => {
                write_all(&self.paths, lock, &[], 0)?;
                info!(path = %main.display(), "Initialized empty collection");
                Ok(Vec::new())
            }
            Loaded::Blank => {
                write_all(&self.paths, lock, &[], 0)?;
                debug!(path = %main.display(), "Normalized blank collection file");
                Ok(Vec::new())
            }
            Loaded::Corrupt(cause) => self.recover(lock, &cause),
        }
    }

    fn recover(&self, lock: &StoreLock, cause: &StoreError) -> StoreResult<Vec<Car>> {
        warn!(error = %cause, code = %cause.kind(), "Collection is corrupt; attempting recovery");

        if let Some(cars) = restore_latest_valid(&self.paths, lock)? {
            return Ok(cars);
        }

        // The corrupt content is not worth a backup slot.
        write_all(&self.paths, lock, &[], 0)?;
        warn!(path = %self.paths.main().display(), "No valid backup; reset to empty collection");
        Ok(Vec::new())
    }
}

pub(crate) fn find_mut(cars: &mut [Car], id: CarId) -> StoreResult<&mut Car> {
    cars.iter_mut()
        .find(|c| c.id == id)
        .ok_or(StoreError::CarNotFound { id })
}
