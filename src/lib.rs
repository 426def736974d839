//! # carstore - crash-safe JSON record store for a car catalogue
//!
//! The whole collection lives in one human-readable JSON array
//! (`<data_root>/cars.json`). Every mutation is serialized across processes
//! by a lock file, published atomically through a temp file and a swap
//! file, and preceded by a rotating backup so a corrupt main file can be
//! restored.
//!
//! ## Core Concepts
//!
//! - **Car**: a record with a numeric id, an asset folder, ordered photo
//!   names and free-form fields
//! - **CarStore**: the record store; reads, CRUD, bulk delete and photo
//!   management
//! - **StoreLock**: the advisory lock file every mutation holds
//! - **Backups**: timestamped snapshots of the main file, newest `N` kept
//!
//! ## Usage
//!
//! ```rust,ignore
//! use carstore::{CarStore, StoreConfig};
//! use serde_json::json;
//!
//! let store = CarStore::open(StoreConfig::new("/srv/data"))?;
//! let car = store.create(json!({
//!     "brand": "Kia",
//!     "model": "Rio",
//!     "year": 2020,
//!     "price": 15000,
//!     "country_code": "KR"
//! }))?;
//! assert_eq!(store.read_by_id(car.id)?.unwrap().brand(), Some("Kia"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Records and validation
pub mod car;
pub mod config;
pub mod error;

// Storage and the record store
pub mod photos;
pub mod storage;
pub mod store;

// Re-export primary types at crate root for convenience
pub use car::{next_id, parse_ids, slugify, Car, CarId, CarPatch, NewCar};
pub use config::{ConfigError, StoreConfig};
pub use error::{ErrorKind, StoreError, StoreResult, ValidationError};
pub use photos::PhotoUpload;
pub use storage::{BackupEntry, StoreLock, StorePaths};
pub use store::CarStore;
