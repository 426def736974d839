//! Recovery of an interrupted publish.
//!
//! Publishing renames `cars.json` to `cars.json.swap`, then the temp file to
//! `cars.json`. A crash between the two renames leaves no main file and a
//! swap file holding the previous version. Renaming swap back restores it.

use std::fs;
use std::io::ErrorKind;

use tracing::warn;

use crate::error::{StoreError, StoreResult};

use super::paths::StorePaths;

/// What [`ensure_consistency`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Nothing to repair.
    Clean,
    /// The swap file was renamed back to main.
    RestoredFromSwap,
}

/// Heals the "main missing, swap present" crash window. Idempotent.
///
/// A swap file alongside an existing main file is left for the next write
/// to clean up.
///
/// # Errors
/// `CARS_STORE_CONSISTENCY_FAILED` if the file system cannot be inspected
/// or the rename fails.
pub fn ensure_consistency(paths: &StorePaths) -> StoreResult<Consistency> {
    let main = paths.main();
    let swap = paths.swap();
    let fail = |source| StoreError::Consistency {
        path: main.clone(),
        source,
    };

    if main.try_exists().map_err(fail)? || !swap.try_exists().map_err(fail)? {
        return Ok(Consistency::Clean);
    }

    match fs::rename(&swap, &main) {
        Ok(()) => {
            warn!(
                swap = %swap.display(),
                main = %main.display(),
                "Recovered interrupted publish from swap file"
            );
            Ok(Consistency::RestoredFromSwap)
        }
        // A concurrent caller finished the same repair first.
        Err(e) if e.kind() == ErrorKind::NotFound && main.exists() => Ok(Consistency::Clean),
        Err(e) => Err(fail(e)),
    }
}
