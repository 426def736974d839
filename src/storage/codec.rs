//! JSON codec for the persisted collection.
//!
//! The collection is stored as a pretty-printed JSON array followed by a
//! trailing newline. Decoding separates four failure classes:
//! - malformed JSON (`CARS_JSON_INVALID`)
//! - valid JSON that is not an array (`CARS_JSON_WRONG_SHAPE`)
//! - an array element that is not a readable record (`CARS_JSON_READ_FAILED`)
//! - I/O failures (`CARS_JSON_READ_FAILED`)
//!
//! Only the first two mark the file as corrupt. A zero-length or
//! whitespace-only file decodes as an empty collection.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;

use crate::car::Car;
use crate::error::{StoreError, StoreResult};

/// Canonical bytes of an empty collection.
pub const EMPTY_COLLECTION: &[u8] = b"[]\n";

/// What was found at a collection path.
#[derive(Debug)]
pub enum Loaded {
    /// No file.
    Missing,
    /// Zero-length or whitespace-only file.
    Blank,
    /// A well-formed collection.
    Cars(Vec<Car>),
    /// The file exists but its content is not a collection.
    Corrupt(StoreError),
}

/// Serializes a collection to its on-disk form.
///
/// # Errors
/// Returns an error if a record cannot be serialized.
pub fn encode(cars: &[Car]) -> serde_json::Result<Vec<u8>> {
    let mut out = serde_json::to_vec_pretty(cars)?;
    out.push(b'\n');
    Ok(out)
}

/// Returns true if `bytes` holds nothing but whitespace.
#[must_use]
pub fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// Parses a collection. `path` is used for error context only.
///
/// # Errors
/// - `CARS_JSON_INVALID` if `bytes` is not JSON
/// - `CARS_JSON_WRONG_SHAPE` if it is not an array
/// - `CARS_JSON_READ_FAILED` if an element is not a readable car record
pub fn decode(path: &Path, bytes: &[u8]) -> StoreResult<Vec<Car>> {
    if is_blank(bytes) {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_slice(bytes).map_err(|e| StoreError::JsonInvalid {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let Value::Array(items) = value else {
        return Err(StoreError::JsonWrongShape {
            path: path.to_path_buf(),
        });
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item).map_err(|e| StoreError::RecordUnreadable {
                path: path.to_path_buf(),
                index,
                message: e.to_string(),
            })
        })
        .collect()
}

/// Reads and classifies the collection at `path`.
///
/// Only malformed JSON and a non-array top level yield [`Loaded::Corrupt`].
///
/// # Errors
/// `CARS_JSON_READ_FAILED` for I/O failures other than a missing file, and
/// for arrays holding an element that is not a readable record.
pub fn load(path: &Path) -> StoreResult<Loaded> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Loaded::Missing),
        Err(source) => {
            return Err(StoreError::JsonRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if is_blank(&bytes) {
        return Ok(Loaded::Blank);
    }
    match decode(path, &bytes) {
        Ok(cars) => Ok(Loaded::Cars(cars)),
        Err(e) if e.is_corruption() => Ok(Loaded::Corrupt(e)),
        Err(e) => Err(e),
    }
}

/// Reads a collection that must exist and be well-formed.
///
/// # Errors
/// `CARS_JSON_NOT_FOUND`, `CARS_JSON_READ_FAILED`, `CARS_JSON_INVALID`,
/// or `CARS_JSON_WRONG_SHAPE`.
pub fn read_strict(path: &Path) -> StoreResult<Vec<Car>> {
    match load(path)? {
        Loaded::Missing => Err(StoreError::JsonNotFound {
            path: path.to_path_buf(),
        }),
        Loaded::Blank => Ok(Vec::new()),
        Loaded::Cars(cars) => Ok(cars),
        Loaded::Corrupt(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::CarId;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_encode_is_pretty_with_trailing_newline() {
        let cars = vec![Car::new(CarId::new(1), "1_kia_rio_2020").with_field("brand", "Kia")];
        let bytes = encode(&cars).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("[\n"));
        assert!(text.ends_with("]\n"));
        assert!(text.contains("  {"));
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode(&[]).unwrap(), EMPTY_COLLECTION);
    }

    #[test]
    fn test_decode_classifies_errors() {
        let path = Path::new("cars.json");

        let err = decode(path, b"[{\"id\": 1,").unwrap_err();
        assert_eq!(err.kind().code(), "CARS_JSON_INVALID");

        let err = decode(path, b"{\"cars\": []}").unwrap_err();
        assert_eq!(err.kind().code(), "CARS_JSON_WRONG_SHAPE");

        let err = decode(path, b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, StoreError::RecordUnreadable { index: 0, .. }));
        assert!(!err.is_corruption());

        assert!(decode(path, b"  \n").unwrap().is_empty());
    }

    #[test]
    fn test_decode_tolerates_missing_store_fields() {
        let bytes = serde_json::to_vec(&json!([{ "id": 3, "brand": "Kia" }])).unwrap();
        let cars = decode(Path::new("cars.json"), &bytes).unwrap();
        assert_eq!(cars[0].id, CarId::new(3));
        assert!(cars[0].assets_folder.is_empty());
        assert!(cars[0].photos.is_empty());
    }

    #[test]
    fn test_decode_accepts_loose_records() {
        let bytes = br#"[{"id": 1, "brand": "Kia", "photos": []}, {"id": "2", "brand": "Lada"}, {"id": 3.0, "photos": null}]"#;
        let cars = decode(Path::new("cars.json"), bytes).unwrap();
        let ids: Vec<u64> = cars.iter().map(|c| c.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(cars[2].photos.is_empty());
    }

    #[test]
    fn test_load_unreadable_record_is_an_error_not_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cars.json");
        fs::write(&path, br#"[{"id": 1}, {"id": "abc"}]"#).unwrap();

        match load(&path) {
            Err(StoreError::RecordUnreadable { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected unreadable record, got {other:?}"),
        }
    }

    #[test]
    fn test_load_states() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cars.json");

        assert!(matches!(load(&path).unwrap(), Loaded::Missing));

        fs::write(&path, b"").unwrap();
        assert!(matches!(load(&path).unwrap(), Loaded::Blank));

        fs::write(&path, b"not json").unwrap();
        assert!(matches!(load(&path).unwrap(), Loaded::Corrupt(_)));

        fs::write(&path, EMPTY_COLLECTION).unwrap();
        assert!(matches!(load(&path).unwrap(), Loaded::Cars(c) if c.is_empty()));
    }

    #[test]
    fn test_read_strict_missing() {
        let dir = tempdir().unwrap();
        let err = read_strict(&dir.path().join("cars.json")).unwrap_err();
        assert_eq!(err.kind().code(), "CARS_JSON_NOT_FOUND");
    }
}
