//! Car records, identifiers, and payload validation.
//!
//! A [`Car`] is a JSON object with three store-owned fields (`id`,
//! `assets_folder`, `photos`) and any number of free-form domain fields.
//! Only a handful of domain fields are validated; everything else passes
//! through untouched.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::{StoreError, StoreResult, ValidationError};

/// Country codes accepted in `country_code`.
pub const ALLOWED_COUNTRY_CODES: &[&str] = &["KR", "CN", "RU"];

/// Earliest accepted model year.
pub const MIN_YEAR: i64 = 1900;

/// Fields owned by the store; never writable through create or update.
pub const PROTECTED_FIELDS: &[&str] = &["id", "assets_folder", "photos"];

/// Largest integer a JSON number can carry without losing precision.
pub const MAX_ID: u64 = 9_007_199_254_740_991;
const MAX_SAFE_ID: f64 = 9_007_199_254_740_991.0;

/// Numeric car identifier, unique within a collection.
///
/// Serialized as a bare number. Deserialization also accepts numeric strings
/// and integral floats, like [`CarId::from_json`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CarId(u64);

impl CarId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Parses an identifier from a JSON value (a number or a numeric string).
    ///
    /// # Errors
    /// Returns `INVALID_ID` if the value is not a finite non-negative integer.
    pub fn from_json(value: &Value) -> StoreResult<Self> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .filter(|v| *v <= MAX_ID)
                .map(Self)
                .or_else(|| n.as_f64().and_then(Self::from_f64))
                .ok_or_else(|| StoreError::invalid_id(n.to_string())),
            Value::String(s) => s.parse(),
            other => Err(StoreError::invalid_id(other.to_string())),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_f64(v: f64) -> Option<Self> {
        if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= MAX_SAFE_ID {
            Some(Self(v as u64))
        } else {
            None
        }
    }
}

impl FromStr for CarId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(StoreError::invalid_id(s));
        }
        if let Ok(v) = trimmed.parse::<u64>() {
            return if v <= MAX_ID {
                Ok(Self(v))
            } else {
                Err(StoreError::invalid_id(s))
            };
        }
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(Self::from_f64)
            .ok_or_else(|| StoreError::invalid_id(s))
    }
}

impl<'de> Deserialize<'de> for CarId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(de::Error::custom)
    }
}

impl fmt::Display for CarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single inventory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    /// Store-assigned identifier.
    pub id: CarId,
    /// Directory under `assets/cars` holding this car's images.
    #[serde(default, deserialize_with = "null_as_default")]
    pub assets_folder: String,
    /// Image file names, in display order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub photos: Vec<String>,
    /// Free-form domain fields (brand, model, year, price, specs, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Car {
    /// Creates a car with no photos and no domain fields.
    #[must_use]
    pub fn new(id: CarId, assets_folder: impl Into<String>) -> Self {
        Self {
            id,
            assets_folder: assets_folder.into(),
            photos: Vec::new(),
            fields: Map::new(),
        }
    }

    /// Sets a domain field (builder style).
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns a domain field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns the brand, if set to a string.
    #[must_use]
    pub fn brand(&self) -> Option<&str> {
        self.field("brand").and_then(Value::as_str)
    }

    /// Returns the model, if set to a string.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.field("model").and_then(Value::as_str)
    }

    /// Returns the model year, if set to an integer.
    #[must_use]
    pub fn year(&self) -> Option<i64> {
        self.field("year").and_then(Value::as_i64)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Returns the next free identifier: one past the largest id, or 1 when empty.
///
/// # Errors
/// `CARS_STORE_WRITE_FAILED` if the largest id is already [`MAX_ID`].
pub fn next_id(cars: &[Car]) -> StoreResult<CarId> {
    let Some(max) = cars.iter().map(|c| c.id.get()).max() else {
        return Ok(CarId(1));
    };
    max.checked_add(1)
        .filter(|id| *id <= MAX_ID)
        .map(CarId)
        .ok_or(StoreError::IdExhausted { last: CarId(max) })
}

/// Converts free text into a lowercase `[a-z0-9_]` slug.
///
/// Diacritics are stripped, runs of other characters collapse to a single
/// underscore, and leading/trailing underscores are trimmed. An empty result
/// becomes `"x"`.
#[must_use]
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_sep = false;

    for ch in input.nfkd().filter(|c| !is_combining_mark(*c)).flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }

    if out.is_empty() {
        "x".to_string()
    } else {
        out
    }
}

/// Derives the asset directory name for a new car.
#[must_use]
pub fn assets_folder_for(id: CarId, brand: &str, model: &str, year: i64) -> String {
    format!("{id}_{}_{}_{year}", slugify(brand), slugify(model))
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    NonEmptyString,
    Year,
    Price,
    CountryCode,
}

const VALIDATED_FIELDS: &[(&str, Rule)] = &[
    ("brand", Rule::NonEmptyString),
    ("model", Rule::NonEmptyString),
    ("year", Rule::Year),
    ("price", Rule::Price),
    ("country_code", Rule::CountryCode),
];

fn max_year() -> i64 {
    i64::from(Utc::now().year()) + 1
}

fn numeric(field: &'static str, value: &Value, expected: &'static str) -> Result<f64, ValidationError> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
        .ok_or(ValidationError::WrongType { field, expected })
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn apply_rule(field: &'static str, rule: Rule, value: &Value) -> Result<Value, ValidationError> {
    match rule {
        Rule::NonEmptyString => match value {
            Value::String(s) if !s.trim().is_empty() => Ok(Value::String(s.trim().to_string())),
            Value::String(_) => Err(ValidationError::EmptyString { field }),
            _ => Err(ValidationError::WrongType {
                field,
                expected: "string",
            }),
        },
        Rule::Year => {
            let v = numeric(field, value, "integer")?;
            if v.fract() != 0.0 {
                return Err(ValidationError::WrongType {
                    field,
                    expected: "integer",
                });
            }
            let max = max_year();
            if v < MIN_YEAR as f64 || v > max as f64 {
                return Err(ValidationError::OutOfRange {
                    field,
                    value: v,
                    min: MIN_YEAR as f64,
                    max: max as f64,
                });
            }
            Ok(Value::from(v as i64))
        }
        Rule::Price => {
            let v = numeric(field, value, "number")?;
            if v < 0.0 {
                return Err(ValidationError::Negative { field, value: v });
            }
            Ok(number_value(v))
        }
        Rule::CountryCode => {
            let code = value
                .as_str()
                .ok_or(ValidationError::WrongType {
                    field,
                    expected: "string",
                })?
                .trim()
                .to_ascii_uppercase();
            if ALLOWED_COUNTRY_CODES.contains(&code.as_str()) {
                Ok(Value::String(code))
            } else {
                Err(ValidationError::NotAllowed {
                    field,
                    value: code,
                    allowed: ALLOWED_COUNTRY_CODES,
                })
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn number_value(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() <= MAX_SAFE_ID {
        return Value::from(v as i64);
    }
    Number::from_f64(v).map_or(Value::Null, Value::Number)
}

fn trim_free_strings(fields: &mut Map<String, Value>) {
    for (name, value) in fields.iter_mut() {
        if VALIDATED_FIELDS.iter().any(|(f, _)| f == name) {
            continue;
        }
        if let Value::String(s) = value {
            let trimmed = s.trim();
            if trimmed.len() != s.len() {
                *s = trimmed.to_string();
            }
        }
    }
}

/// Domain fields of a validated create payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCar {
    /// Normalized domain fields, protected fields removed.
    pub fields: Map<String, Value>,
}

impl NewCar {
    /// Validates a create payload.
    ///
    /// `brand`, `model`, `year`, `price` and `country_code` are required.
    /// Any caller-supplied `id`, `assets_folder` or `photos` is discarded.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] describing the first failing field.
    pub fn from_payload(payload: Value) -> Result<Self, ValidationError> {
        let Value::Object(mut fields) = payload else {
            return Err(ValidationError::NotAnObject);
        };
        for protected in PROTECTED_FIELDS {
            fields.remove(*protected);
        }

        for &(field, rule) in VALIDATED_FIELDS {
            let value = match fields.get(field) {
                None | Some(Value::Null) => return Err(ValidationError::MissingField { field }),
                Some(v) => apply_rule(field, rule, v)?,
            };
            fields.insert(field.to_string(), value);
        }
        trim_free_strings(&mut fields);

        Ok(Self { fields })
    }

    /// Returns the validated brand.
    #[must_use]
    pub fn brand(&self) -> &str {
        self.fields.get("brand").and_then(Value::as_str).unwrap_or_default()
    }

    /// Returns the validated model.
    #[must_use]
    pub fn model(&self) -> &str {
        self.fields.get("model").and_then(Value::as_str).unwrap_or_default()
    }

    /// Returns the validated year.
    #[must_use]
    pub fn year(&self) -> i64 {
        self.fields.get("year").and_then(Value::as_i64).unwrap_or(MIN_YEAR)
    }

    /// Materializes the record under an assigned id.
    #[must_use]
    pub fn into_car(self, id: CarId) -> Car {
        let assets_folder = assets_folder_for(id, self.brand(), self.model(), self.year());
        Car {
            id,
            assets_folder,
            photos: Vec::new(),
            fields: self.fields,
        }
    }
}

/// A validated partial update.
#[derive(Debug, Clone, PartialEq)]
pub struct CarPatch {
    /// Normalized fields to merge over the existing record.
    pub fields: Map<String, Value>,
}

impl CarPatch {
    /// Validates a patch payload. Every domain rule applies only when the
    /// field is present.
    ///
    /// # Errors
    /// - `READONLY_FIELD` if the patch touches `id`, `assets_folder` or `photos`
    /// - `VALIDATION_ERROR` if the payload is not an object or a field fails its rule
    pub fn from_payload(patch: Value) -> StoreResult<Self> {
        let Value::Object(mut fields) = patch else {
            return Err(ValidationError::NotAnObject.into());
        };
        if let Some(field) = PROTECTED_FIELDS.iter().find(|f| fields.contains_key(**f)) {
            return Err(StoreError::ReadonlyField {
                field: (*field).to_string(),
            });
        }

        for &(field, rule) in VALIDATED_FIELDS {
            if let Some(v) = fields.get(field) {
                let normalized = apply_rule(field, rule, v)?;
                fields.insert(field.to_string(), normalized);
            }
        }
        trim_free_strings(&mut fields);

        Ok(Self { fields })
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merges the patch over `car`. Protected fields are never touched.
    pub fn apply(&self, car: &mut Car) {
        for (name, value) in &self.fields {
            car.fields.insert(name.clone(), value.clone());
        }
    }
}

/// Parses a JSON array of ids as sent by a bulk-delete caller.
///
/// # Errors
/// `VALIDATION_ERROR` unless the value is a non-empty array whose items
/// are all numeric ids.
pub fn parse_ids(value: &Value) -> StoreResult<Vec<CarId>> {
    let items = value
        .as_array()
        .filter(|a| !a.is_empty())
        .ok_or(ValidationError::InvalidIdList)?;
    items
        .iter()
        .map(|v| CarId::from_json(v).map_err(|_| ValidationError::InvalidIdList.into()))
        .collect()
}
