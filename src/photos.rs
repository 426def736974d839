//! Photo operations on a car.
//!
//! Photos live in the car's asset directory and are listed, in display
//! order, in its `photos` field. These operations are the only writers of
//! that field and follow the same lock / consistency / atomic-write
//! discipline as every other mutation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::car::{slugify, Car, CarId};
use crate::error::{StoreError, StoreResult, ValidationError};
use crate::store::{find_mut, CarStore, Outcome};

/// File extensions accepted for uploads.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// An uploaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    /// Name supplied by the client; only its stem and extension are used.
    pub file_name: String,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    /// Creates an upload.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Reads an upload from a local file.
    ///
    /// # Errors
    /// `ASSETS_IO_ERROR` if the file cannot be read.
    pub fn from_path(path: &Path) -> StoreResult<Self> {
        let bytes = fs::read(path).map_err(|e| StoreError::assets(path, e))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(Self { file_name, bytes })
    }

    fn split_name(&self) -> Result<(String, String), ValidationError> {
        let invalid = |reason| ValidationError::InvalidPhoto {
            name: self.file_name.clone(),
            reason,
        };

        let path = Path::new(&self.file_name);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| invalid("missing file extension"))?;
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(invalid("unsupported file extension"));
        }
        if self.bytes.is_empty() {
            return Err(invalid("file is empty"));
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        Ok((slugify(stem), ext))
    }
}

/// Rejects anything that is not a bare file name.
fn check_plain_name(name: &str) -> Result<(), ValidationError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains("..");
    if plain {
        Ok(())
    } else {
        Err(ValidationError::InvalidPhoto {
            name: name.to_string(),
            reason: "not a plain file name",
        })
    }
}

fn remove_best_effort(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Failed to remove photo file");
    }
}

impl CarStore {
    /// Stores `uploads` in the car's asset directory and appends them to
    /// `photos`.
    ///
    /// Files are named `<unix_millis>_<n>_<slug(stem)>.<ext>`.
    ///
    /// # Errors
    /// - `VALIDATION_ERROR` if the list is empty or an upload is not an image
    /// - `NOT_FOUND` if no car has `id`
    /// - `ASSETS_IO_ERROR` if a file cannot be written
    pub fn add_photos(&self, id: CarId, uploads: &[PhotoUpload]) -> StoreResult<Car> {
        if uploads.is_empty() {
            return Err(ValidationError::NoPhotos.into());
        }
        let parts = uploads
            .iter()
            .map(PhotoUpload::split_name)
            .collect::<Result<Vec<_>, _>>()?;

        let mut written: Vec<PathBuf> = Vec::new();
        let result = self.mutate(|_lock, cars| {
            let car = find_mut(cars, id)?;
            let dir = self.paths().asset_dir(&car.assets_folder);
            fs::create_dir_all(&dir).map_err(|e| StoreError::assets(&dir, e))?;

            let stamp = Utc::now().timestamp_millis();
            for (n, (upload, (stem, ext))) in uploads.iter().zip(&parts).enumerate() {
                let mut name = format!("{stamp}_{n}_{stem}.{ext}");
                let mut attempt = 1;
                while dir.join(&name).exists() || car.photos.contains(&name) {
                    name = format!("{stamp}_{n}_{stem}_{attempt}.{ext}");
                    attempt += 1;
                }

                let path = dir.join(&name);
                fs::write(&path, &upload.bytes).map_err(|e| StoreError::assets(&path, e))?;
                written.push(path);
                car.photos.push(name);
            }

            debug!(id = %id, added = uploads.len(), "Photos added");
            Ok(Outcome::Persist(car.clone()))
        });

        if result.is_err() {
            for path in &written {
                remove_best_effort(path);
            }
        }
        result
    }

    /// Replaces the photo order.
    ///
    /// # Errors
    /// - `VALIDATION_ERROR` unless `photos` is a permutation of the current list
    /// - `NOT_FOUND` if no car has `id`
    pub fn reorder_photos(&self, id: CarId, photos: Vec<String>) -> StoreResult<Car> {
        self.mutate(|_lock, cars| {
            let car = find_mut(cars, id)?;
            if !is_permutation(&car.photos, &photos) {
                return Err(ValidationError::PhotoOrderMismatch.into());
            }
            if car.photos == photos {
                return Ok(Outcome::Unchanged(car.clone()));
            }
            car.photos = photos;
            Ok(Outcome::Persist(car.clone()))
        })
    }

    /// Removes one photo from the car and deletes its file.
    ///
    /// The file is removed after the collection is written; a failed file
    /// removal is logged, not reported.
    ///
    /// # Errors
    /// - `VALIDATION_ERROR` if `name` is not a plain file name
    /// - `NOT_FOUND` if the car or the photo does not exist
    pub fn delete_photo(&self, id: CarId, name: &str) -> StoreResult<Car> {
        check_plain_name(name)?;

        let (car, file) = self.mutate(|_lock, cars| {
            let car = find_mut(cars, id)?;
            let index = car
                .photos
                .iter()
                .position(|p| p == name)
                .ok_or_else(|| StoreError::PhotoNotFound {
                    id,
                    name: name.to_string(),
                })?;
            car.photos.remove(index);
            let file = self.paths().asset_dir(&car.assets_folder).join(name);
            Ok(Outcome::Persist((car.clone(), file)))
        })?;

        if file.exists() {
            remove_best_effort(&file);
        }
        Ok(car)
    }
}

fn is_permutation(current: &[String], proposed: &[String]) -> bool {
    if current.len() != proposed.len() {
        return false;
    }
    let mut counts: HashMap<&str, isize> = HashMap::new();
    for p in current {
        *counts.entry(p.as_str()).or_default() += 1;
    }
    for p in proposed {
        *counts.entry(p.as_str()).or_default() -= 1;
    }
    counts.values().all(|c| *c == 0)
}
