//! Crash-safe single-file storage for the car collection.
//!
//! This module provides the building blocks the record store composes:
//! - Path resolution for every file under the data root
//! - An advisory lock file with TTL takeover
//! - Recovery of an interrupted publish
//! - Rotating backups and restore of the newest valid snapshot
//! - Atomic whole-collection replacement
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          CarStore                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌──────────────┐  │
//! │  │ ensure_         │  │ write_all       │  │ restore_     │  │
//! │  │ consistency     │  │ (tmp → swap →   │  │ latest_valid │  │
//! │  │ (swap → main)   │  │  main)          │  │ (backups)    │  │
//! │  └────────┬────────┘  └────────┬────────┘  └──────┬───────┘  │
//! │           └────────────────────┼──────────────────┘          │
//! │                                ↓                             │
//! │                  ┌───────────────────────────┐               │
//! │                  │ StoreLock (cars.lock, TTL) │               │
//! │                  └───────────────────────────┘               │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod backup;
pub mod codec;
mod file_lock;
mod paths;
pub mod recovery;
pub mod writer;

pub use backup::{list_backups, prune, restore_latest_valid, BackupEntry};
pub use codec::Loaded;
pub use file_lock::{LockRecord, StoreLock};
pub use paths::{backup_file_name, StorePaths};
pub use recovery::{ensure_consistency, Consistency};
pub use writer::write_all;
