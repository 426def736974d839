//! Error types for the car store.
//!
//! All errors are strongly typed using thiserror. Every failure carries an
//! [`ErrorKind`] so transport layers can map it to a status code without
//! matching on message text.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::car::CarId;
use crate::config::ConfigError;

/// Validation errors raised while checking caller payloads.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Payload must be a JSON object")]
    NotAnObject,

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: &'static str,
    },

    #[error("Field '{field}' must be a non-empty string")]
    EmptyString {
        field: &'static str,
    },

    #[error("Field '{field}' has the wrong type: expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Field '{field}' value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Field '{field}' must be >= 0 (got {value})")]
    Negative {
        field: &'static str,
        value: f64,
    },

    #[error("Field '{field}' value '{value}' is not one of {allowed:?}")]
    NotAllowed {
        field: &'static str,
        value: String,
        allowed: &'static [&'static str],
    },

    #[error("ids must be a non-empty array of numbers")]
    InvalidIdList,

    #[error("At least one photo is required")]
    NoPhotos,

    #[error("Photo '{name}' is not acceptable: {reason}")]
    InvalidPhoto {
        name: String,
        reason: &'static str,
    },

    #[error("Photo order must be a permutation of the current photos")]
    PhotoOrderMismatch,
}

/// Stable classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidId,
    Validation,
    ReadonlyField,
    NotFound,
    StoreLocked,
    LockIo,
    LockCheckFailed,
    JsonInvalid,
    JsonWrongShape,
    JsonNotFound,
    JsonReadFailed,
    ConsistencyFailed,
    StoreReadFailed,
    WriteFailed,
    BackupFailed,
    AssetsIo,
    Config,
}

impl ErrorKind {
    /// Returns the wire code for this kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidId => "INVALID_ID",
            Self::Validation => "VALIDATION_ERROR",
            Self::ReadonlyField => "READONLY_FIELD",
            Self::NotFound => "NOT_FOUND",
            Self::StoreLocked => "STORE_LOCKED",
            Self::LockIo => "STORE_LOCK_IO_ERROR",
            Self::LockCheckFailed => "STORE_LOCK_CHECK_FAILED",
            Self::JsonInvalid => "CARS_JSON_INVALID",
            Self::JsonWrongShape => "CARS_JSON_WRONG_SHAPE",
            Self::JsonNotFound => "CARS_JSON_NOT_FOUND",
            Self::JsonReadFailed => "CARS_JSON_READ_FAILED",
            Self::ConsistencyFailed => "CARS_STORE_CONSISTENCY_FAILED",
            Self::StoreReadFailed => "CARS_STORE_READ_FAILED",
            Self::WriteFailed => "CARS_STORE_WRITE_FAILED",
            Self::BackupFailed => "CARS_BACKUP_FAILED",
            Self::AssetsIo => "ASSETS_IO_ERROR",
            Self::Config => "STORE_CONFIG_INVALID",
        }
    }

    /// Returns the HTTP-equivalent status a transport layer should report.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidId | Self::Validation | Self::ReadonlyField => 400,
            Self::NotFound => 404,
            Self::StoreLocked => 409,
            _ => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Top-level error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid id: '{value}'")]
    InvalidId {
        value: String,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Field '{field}' is read-only")]
    ReadonlyField {
        field: String,
    },

    #[error("Car not found: {id}")]
    CarNotFound {
        id: CarId,
    },

    #[error("Photo '{name}' not found on car {id}")]
    PhotoNotFound {
        id: CarId,
        name: String,
    },

    #[error("Store is locked by {owner} (lock age {age:?}, ttl {ttl:?})")]
    Locked {
        owner: String,
        age: Duration,
        ttl: Duration,
    },

    #[error("Failed to create lock file {}: {source}", path.display())]
    LockIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to inspect lock file {}: {source}", path.display())]
    LockCheck {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not valid JSON: {message}", path.display())]
    JsonInvalid {
        path: PathBuf,
        message: String,
    },

    #[error("{} must contain an array of cars", path.display())]
    JsonWrongShape {
        path: PathBuf,
    },

    #[error("cars.json not found at {}", path.display())]
    JsonNotFound {
        path: PathBuf,
    },

    #[error("Failed to read {}: {source}", path.display())]
    JsonRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to restore consistency at {}: {source}", path.display())]
    Consistency {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Record {index} in {} cannot be read: {message}", path.display())]
    RecordUnreadable {
        path: PathBuf,
        index: usize,
        message: String,
    },

    #[error("No car id left after {last}")]
    IdExhausted {
        last: CarId,
    },

    #[error("Store read failed: {message}")]
    StoreRead {
        message: String,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to back up {}: {source}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Asset I/O failed at {}: {source}", path.display())]
    AssetsIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl StoreError {
    pub(crate) fn invalid_id(value: impl Into<String>) -> Self {
        Self::InvalidId {
            value: value.into(),
        }
    }

    pub(crate) fn write(path: &Path, source: io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn assets(path: &Path, source: io::Error) -> Self {
        Self::AssetsIo {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidId { .. } => ErrorKind::InvalidId,
            Self::Validation(_) => ErrorKind::Validation,
            Self::ReadonlyField { .. } => ErrorKind::ReadonlyField,
            Self::CarNotFound { .. } | Self::PhotoNotFound { .. } => ErrorKind::NotFound,
            Self::Locked { .. } => ErrorKind::StoreLocked,
            Self::LockIo { .. } => ErrorKind::LockIo,
            Self::LockCheck { .. } => ErrorKind::LockCheckFailed,
            Self::JsonInvalid { .. } => ErrorKind::JsonInvalid,
            Self::JsonWrongShape { .. } => ErrorKind::JsonWrongShape,
            Self::JsonNotFound { .. } => ErrorKind::JsonNotFound,
            Self::JsonRead { .. } | Self::RecordUnreadable { .. } => ErrorKind::JsonReadFailed,
            Self::Consistency { .. } => ErrorKind::ConsistencyFailed,
            Self::StoreRead { .. } => ErrorKind::StoreReadFailed,
            Self::Write { .. } | Self::IdExhausted { .. } => ErrorKind::WriteFailed,
            Self::Backup { .. } => ErrorKind::BackupFailed,
            Self::AssetsIo { .. } => ErrorKind::AssetsIo,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns true if this is a lock conflict.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    /// Returns true if no record (or photo) matched.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::CarNotFound { .. } | Self::PhotoNotFound { .. })
    }

    /// Returns true if this is a caller-input error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidId { .. } | Self::Validation(_) | Self::ReadonlyField { .. }
        )
    }

    /// Returns true if the persisted content itself is malformed.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::JsonInvalid { .. } | Self::JsonWrongShape { .. })
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_message() {
        let err = ValidationError::OutOfRange {
            field: "year",
            value: 1800.0,
            min: 1900.0,
            max: 2027.0,
        };
        let msg = format!("{err}");
        assert!(msg.contains("year"));
        assert!(msg.contains("1800"));
    }

    #[test]
    fn test_kind_codes() {
        let err = StoreError::invalid_id("abc");
        assert_eq!(err.kind().code(), "INVALID_ID");
        assert_eq!(err.kind().http_status(), 400);

        let err = StoreError::ReadonlyField {
            field: "photos".to_string(),
        };
        assert_eq!(err.kind().code(), "READONLY_FIELD");

        let err = StoreError::CarNotFound { id: CarId::new(7) };
        assert_eq!(err.kind().code(), "NOT_FOUND");
        assert_eq!(err.kind().http_status(), 404);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_locked_is_conflict() {
        let err = StoreError::Locked {
            owner: "123:abc".to_string(),
            age: Duration::from_secs(1),
            ttl: Duration::from_secs(300),
        };
        assert_eq!(err.kind(), ErrorKind::StoreLocked);
        assert_eq!(err.kind().http_status(), 409);
        assert!(err.is_retryable());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_from_validation() {
        let err: StoreError = ValidationError::InvalidIdList.into();
        assert!(err.is_validation());
        assert_eq!(err.kind().code(), "VALIDATION_ERROR");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_errors_are_server_side() {
        let err = StoreError::write(
            Path::new("/data/cars.json.tmp"),
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        assert_eq!(err.kind().code(), "CARS_STORE_WRITE_FAILED");
        assert_eq!(err.kind().http_status(), 500);
        assert!(format!("{err}").contains("disk full"));
    }

    #[test]
    fn test_corruption_kinds() {
        let err = StoreError::JsonWrongShape {
            path: PathBuf::from("cars.json"),
        };
        assert!(err.is_corruption());
        assert_eq!(err.kind().code(), "CARS_JSON_WRONG_SHAPE");

        let err = StoreError::RecordUnreadable {
            path: PathBuf::from("cars.json"),
            index: 2,
            message: "not an object".to_string(),
        };
        assert!(!err.is_corruption());
        assert_eq!(err.kind().code(), "CARS_JSON_READ_FAILED");
    }
}
