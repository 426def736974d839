//! Canonical file locations under a data root.
//!
//! # Layout
//! ```text
//! <root>/
//!   cars.json                     canonical collection
//!   cars.json.tmp                 next version, only during a write
//!   cars.json.swap                previous version, only during publish
//!   cars.lock                     advisory lock, only while locked
//!   cars.json.bak.<timestamp>     rotating snapshots
//!   assets/cars/<assets_folder>/  per-car images
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;

const MAIN_FILE: &str = "cars.json";
const TEMP_FILE: &str = "cars.json.tmp";
const SWAP_FILE: &str = "cars.json.swap";
const LOCK_FILE: &str = "cars.lock";
const BACKUP_PREFIX: &str = "cars.json.bak.";

fn backup_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^cars\.json\.bak\.\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2}-\d{3}Z$")
            .expect("static backup pattern is valid")
    })
}

/// Resolves every path the store touches from a single root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    /// Creates a resolver for `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The data root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `cars.json`
    #[must_use]
    pub fn main(&self) -> PathBuf {
        self.root.join(MAIN_FILE)
    }

    /// `cars.json.tmp`
    #[must_use]
    pub fn temp(&self) -> PathBuf {
        self.root.join(TEMP_FILE)
    }

    /// `cars.json.swap`
    #[must_use]
    pub fn swap(&self) -> PathBuf {
        self.root.join(SWAP_FILE)
    }

    /// `cars.lock`
    #[must_use]
    pub fn lock(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// `assets/cars`
    #[must_use]
    pub fn assets_base(&self) -> PathBuf {
        self.root.join("assets").join("cars")
    }

    /// `assets/cars/<folder>`
    #[must_use]
    pub fn asset_dir(&self, folder: &str) -> PathBuf {
        self.assets_base().join(folder)
    }

    /// Backup path for a snapshot taken at `at`.
    #[must_use]
    pub fn backup(&self, at: DateTime<Utc>) -> PathBuf {
        self.root.join(backup_file_name(at))
    }

    /// Returns true if `name` is a backup file name produced by this resolver.
    #[must_use]
    pub fn is_backup_name(name: &str) -> bool {
        backup_name_pattern().is_match(name)
    }
}

/// `cars.json.bak.<ISO-8601>` with `:` and `.` replaced by `-`.
#[must_use]
pub fn backup_file_name(at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{BACKUP_PREFIX}{stamp}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_paths() {
        let paths = StorePaths::new("/data");
        assert_eq!(paths.main(), Path::new("/data/cars.json"));
        assert_eq!(paths.temp(), Path::new("/data/cars.json.tmp"));
        assert_eq!(paths.swap(), Path::new("/data/cars.json.swap"));
        assert_eq!(paths.lock(), Path::new("/data/cars.lock"));
        assert_eq!(
            paths.asset_dir("1_kia_rio_2020"),
            Path::new("/data/assets/cars/1_kia_rio_2020")
        );
    }

    #[test]
    fn test_backup_name_format() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 12, 30, 5).unwrap()
            + chrono::Duration::milliseconds(42);
        let name = backup_file_name(at);
        assert_eq!(name, "cars.json.bak.2026-10-18T12-30-05-042Z");
        assert!(StorePaths::is_backup_name(&name));
    }

    #[test]
    fn test_backup_name_pattern_rejects_others() {
        assert!(!StorePaths::is_backup_name("cars.json"));
        assert!(!StorePaths::is_backup_name("cars.json.swap"));
        assert!(!StorePaths::is_backup_name("cars.json.bak."));
        assert!(!StorePaths::is_backup_name("cars.json.bak.2026-10-18T12-30-05-042Z.tmp"));
    }

    #[test]
    fn test_backup_names_sort_chronologically() {
        let a = backup_file_name(Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap());
        let b = backup_file_name(Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap());
        assert!(a < b);
    }
}
