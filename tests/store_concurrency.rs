//! Lock and CRUD tests for the car store.
//!
//! These tests verify:
//! - Mutual exclusion between concurrent writers
//! - Stale lock takeover and fresh lock rejection
//! - CRUD round-trips, read-only fields and bulk delete idempotence

use carstore::{parse_ids, CarId, CarStore, ErrorKind, StoreConfig, StoreError};

use serde_json::{json, Value};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::thread;
use std::time::{Duration, SystemTime};
use tempfile::tempdir;

fn open(dir: &Path) -> CarStore {
    CarStore::open(StoreConfig::new(dir).with_max_backups(2)).unwrap()
}

fn payload(brand: &str, model: &str, year: i64) -> Value {
    json!({
        "brand": brand,
        "model": model,
        "year": year,
        "price": 9900,
        "country_code": "CN"
    })
}

fn create_with_retry(store: &CarStore, body: Value) -> carstore::Car {
    for _ in 0..500 {
        match store.create(body.clone()) {
            Ok(car) => return car,
            Err(e) if e.is_locked() => thread::sleep(Duration::from_millis(2)),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    panic!("lock never became free");
}

#[test]
fn test_concurrent_creates_get_distinct_ids() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    store.read_all().unwrap();

    let handles: Vec<_> = ["Geely", "Chery"]
        .into_iter()
        .map(|brand| {
            let store = store.clone();
            thread::spawn(move || create_with_retry(&store, payload(brand, "X", 2022)).id)
        })
        .collect();

    let mut ids: Vec<CarId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort();
    assert_eq!(ids, vec![CarId::new(1), CarId::new(2)]);
    assert_eq!(store.read_all().unwrap().len(), 2);
    assert!(!store.paths().lock().exists());
}

#[test]
fn test_fresh_lock_rejects_writers() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    let held = store.lock().unwrap();
    let record = fs::read(store.paths().lock()).unwrap();

    let err = store.create(payload("Geely", "Coolray", 2022)).unwrap_err();
    assert!(err.is_locked());
    assert!(err.is_retryable());
    assert_eq!(err.kind().http_status(), 409);
    assert!(matches!(err, StoreError::Locked { ref owner, .. } if owner == held.owner()));

    // The holder's lock file is untouched
    assert_eq!(fs::read(store.paths().lock()).unwrap(), record);
    drop(held);
    assert!(store.create(payload("Geely", "Coolray", 2022)).is_ok());
}

#[test]
fn test_stale_lock_is_taken_over() {
    let dir = tempdir().unwrap();
    let store = CarStore::open(StoreConfig::new(dir.path()).with_lock_ttl(Duration::from_millis(200)))
        .unwrap();
    let lock_path = store.paths().lock();

    fs::write(&lock_path, br#"{"owner":"999:crashed","createdAt":"2020-01-01T00:00:00Z"}"#).unwrap();
    let file = OpenOptions::new().write(true).open(&lock_path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(10)).unwrap();
    drop(file);

    let car = store.create(payload("Lada", "Niva", 2019)).unwrap();
    assert_eq!(car.id, CarId::new(1));
    assert!(!lock_path.exists());
}

#[test]
fn test_round_trip_preserves_fields() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());

    let created = store
        .create(json!({
            "brand": "  Lada ",
            "model": "Vesta",
            "year": "2023",
            "price": "1250000",
            "country_code": "ru",
            "color": "white",
            "options": {"heated_seats": true}
        }))
        .unwrap();

    assert_eq!(created.brand(), Some("Lada"));
    assert_eq!(created.field("country_code"), Some(&json!("RU")));
    assert_eq!(created.field("price"), Some(&json!(1_250_000)));
    assert_eq!(created.year(), Some(2023));
    assert_eq!(created.assets_folder, "1_lada_vesta_2023");
    assert!(created.photos.is_empty());

    let id: CarId = "1".parse().unwrap();
    assert_eq!(store.read_by_id(id).unwrap(), Some(created.clone()));

    // On disk: a pretty-printed array with the record's fields
    let raw: Value = serde_json::from_slice(&fs::read(store.paths().main()).unwrap()).unwrap();
    assert_eq!(raw[0]["id"], json!(1));
    assert_eq!(raw[0]["options"], json!({"heated_seats": true}));
    assert_eq!(raw[0]["photos"], json!([]));
}

#[test]
fn test_update_merges_and_protects_fields() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    let car = store.create(payload("Chery", "Tiggo", 2020)).unwrap();

    let updated = store
        .update(car.id, json!({"price": 8000, "mileage": 12000}))
        .unwrap();
    assert_eq!(updated.field("price"), Some(&json!(8000)));
    assert_eq!(updated.field("mileage"), Some(&json!(12000)));
    assert_eq!(updated.brand(), Some("Chery"));
    assert_eq!(updated.assets_folder, car.assets_folder);

    for field in ["id", "assets_folder", "photos"] {
        let err = store.update(car.id, json!({ field: 1 })).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadonlyField, "field {field}");
    }

    let err = store.update(car.id, json!({"year": 1800})).unwrap_err();
    assert!(err.is_validation());
    let err = store.update(CarId::new(99), json!({"price": 1})).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(store.read_by_id(car.id).unwrap(), Some(updated));
}

#[test]
fn test_ids_are_max_plus_one() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    for i in 0..3 {
        store.create(payload("Geely", &format!("M{i}"), 2020)).unwrap();
    }

    store.delete(CarId::new(2)).unwrap();
    assert_eq!(store.create(payload("Geely", "M3", 2020)).unwrap().id, CarId::new(4));

    store.bulk_delete(&[CarId::new(3), CarId::new(4)]).unwrap();
    assert_eq!(store.create(payload("Geely", "M4", 2020)).unwrap().id, CarId::new(2));
}

#[test]
fn test_delete_keeps_assets() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    let car = store.create(payload("Kia", "Ceed", 2018)).unwrap();
    let assets = store.paths().asset_dir(&car.assets_folder);

    let removed = store.delete(car.id).unwrap();
    assert_eq!(removed, car);
    assert!(assets.is_dir());
    assert!(store.delete(car.id).unwrap_err().is_not_found());
}

#[test]
fn test_bulk_delete_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = open(dir.path());
    let a = store.create(payload("Kia", "Rio", 2020)).unwrap();
    let b = store.create(payload("Kia", "K5", 2021)).unwrap();

    let ids = parse_ids(&json!([a.id.get(), a.id.get(), 404])).unwrap();
    assert_eq!(store.bulk_delete(&ids).unwrap(), 1);
    assert_eq!(store.bulk_delete(&ids).unwrap(), 0);
    assert_eq!(store.read_all().unwrap(), vec![b]);

    assert!(store.bulk_delete(&[]).unwrap_err().is_validation());
    assert!(parse_ids(&json!([])).is_err());
    assert!(parse_ids(&json!(["abc"])).is_err());
}

#[test]
fn test_invalid_ids_are_rejected() {
    for raw in ["abc", "-1", "1.5", "NaN", "inf", ""] {
        let err = raw.parse::<CarId>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidId, "input {raw:?}");
        assert_eq!(err.kind().http_status(), 400);
    }
    assert_eq!("007".parse::<CarId>().unwrap(), CarId::new(7));
}
