//! Core type definitions for the keyed store
//!
//! Includes semantic field types, the dynamic value carried between records
//! and statements, the `FieldValue` conversion trait and store keys.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, TranslationError};

// ============================================================================
// Semantic Field Types
// ============================================================================

/// Semantic type of a record field
///
/// The lowercase name of the type is embedded in the column name of every
/// field (see [`crate::sql::naming::field_column`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Unbounded text
    String,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// Signed 64-bit integer
    I64,
    /// Single precision float
    F32,
    /// Double precision float
    F64,
    /// Boolean
    Bool,
    /// Single character, stored as short text
    Char,
    /// Arbitrary precision decimal
    Decimal,
    /// 128-bit identifier, stored as fixed-width text
    Uuid,
    /// UTC timestamp
    Timestamp,
    /// JSON document
    Json,
}

impl FieldType {
    /// Every field type, in registration order of the built-in registry
    pub const ALL: [FieldType; 13] = [
        FieldType::String,
        FieldType::I8,
        FieldType::I16,
        FieldType::I32,
        FieldType::I64,
        FieldType::F32,
        FieldType::F64,
        FieldType::Bool,
        FieldType::Char,
        FieldType::Decimal,
        FieldType::Uuid,
        FieldType::Timestamp,
        FieldType::Json,
    ];

    /// Identifier used in column names
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::I8 => "i8",
            FieldType::I16 => "i16",
            FieldType::I32 => "i32",
            FieldType::I64 => "i64",
            FieldType::F32 => "f32",
            FieldType::F64 => "f64",
            FieldType::Bool => "bool",
            FieldType::Char => "char",
            FieldType::Decimal => "decimal",
            FieldType::Uuid => "uuid",
            FieldType::Timestamp => "timestamp",
            FieldType::Json => "json",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::I8 | FieldType::I16 | FieldType::I32 | FieldType::I64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, FieldType::F32 | FieldType::F64)
    }

    /// Integers, floats and decimals
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float() || *self == FieldType::Decimal
    }

    /// Types stored as text and therefore usable in prefix matches
    pub fn is_text(&self) -> bool {
        matches!(self, FieldType::String | FieldType::Char | FieldType::Uuid)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

// ============================================================================
// Dynamic Values
// ============================================================================

/// A single field value on its way to or from a statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Null,
    String(String),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Char(char),
    Decimal(Decimal),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    /// Field type carried by this value, `None` for `Null`
    pub fn field_type(&self) -> Option<FieldType> {
        Some(match self {
            Value::Null => return None,
            Value::String(_) => FieldType::String,
            Value::I8(_) => FieldType::I8,
            Value::I16(_) => FieldType::I16,
            Value::I32(_) => FieldType::I32,
            Value::I64(_) => FieldType::I64,
            Value::F32(_) => FieldType::F32,
            Value::F64(_) => FieldType::F64,
            Value::Bool(_) => FieldType::Bool,
            Value::Char(_) => FieldType::Char,
            Value::Decimal(_) => FieldType::Decimal,
            Value::Uuid(_) => FieldType::Uuid,
            Value::Timestamp(_) => FieldType::Timestamp,
            Value::Json(_) => FieldType::Json,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

// ============================================================================
// Field Value Conversion
// ============================================================================

/// Conversion between a Rust field type and a [`Value`]
///
/// Implemented for every type the built-in registry can store, and for
/// `Option<T>` of those types (mapped to a nullable column).
pub trait FieldValue: Sized {
    /// Semantic type of the field
    const FIELD_TYPE: FieldType;

    /// Whether the field accepts NULL
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, TranslationError>;
}

macro_rules! field_value {
    ($rust:ty, $variant:ident) => {
        impl FieldValue for $rust {
            const FIELD_TYPE: FieldType = FieldType::$variant;

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }

            fn from_value(value: Value) -> Result<Self, TranslationError> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(TranslationError::mismatch(FieldType::$variant, other)),
                }
            }
        }
    };
}

field_value!(String, String);
field_value!(i8, I8);
field_value!(i16, I16);
field_value!(i32, I32);
field_value!(i64, I64);
field_value!(f32, F32);
field_value!(f64, F64);
field_value!(bool, Bool);
field_value!(char, Char);
field_value!(Decimal, Decimal);
field_value!(Uuid, Uuid);
field_value!(DateTime<Utc>, Timestamp);
field_value!(serde_json::Value, Json);

impl<T: FieldValue> FieldValue for Option<T> {
    const FIELD_TYPE: FieldType = T::FIELD_TYPE;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, TranslationError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

// ============================================================================
// Store Keys
// ============================================================================

/// Longest key the key column holds, in characters
pub const MAX_KEY_LENGTH: usize = 255;

/// Key of a stored record
///
/// Accepts strings and 128-bit identifiers; identifiers are normalized to
/// their canonical hyphenated lowercase form before any lookup. Keys compare
/// byte for byte, so `"Alice"` and `"alice"` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreKey(String);

impl StoreKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Reject keys longer than [`MAX_KEY_LENGTH`] characters
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_key(&self.0)
    }
}

/// Reject keys longer than [`MAX_KEY_LENGTH`] characters
///
/// Every statement binding a key checks it first, so an over-long key is
/// refused instead of being truncated or failing in the driver.
pub fn validate_key(key: &str) -> crate::error::Result<()> {
    let length = key.chars().count();
    if length > MAX_KEY_LENGTH {
        return Err(StoreError::validation(format!(
            "Key is {} characters long, the limit is {}",
            length, MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for StoreKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&String> for StoreKey {
    fn from(key: &String) -> Self {
        Self(key.clone())
    }
}

impl From<Uuid> for StoreKey {
    fn from(key: Uuid) -> Self {
        Self(key.hyphenated().to_string())
    }
}

impl From<&Uuid> for StoreKey {
    fn from(key: &Uuid) -> Self {
        Self::from(*key)
    }
}

impl From<&StoreKey> for StoreKey {
    fn from(key: &StoreKey) -> Self {
        key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // FieldType Tests
    // =========================================================================

    #[test]
    fn test_type_names() {
        assert_eq!(FieldType::String.type_name(), "string");
        assert_eq!(FieldType::I64.type_name(), "i64");
        assert_eq!(FieldType::Decimal.to_string(), "decimal");
        assert_eq!(FieldType::Uuid.to_string(), "uuid");
    }

    #[test]
    fn test_type_classes() {
        assert!(FieldType::I8.is_integer());
        assert!(FieldType::F32.is_float());
        assert!(FieldType::Decimal.is_numeric());
        assert!(!FieldType::Decimal.is_integer());
        assert!(!FieldType::Bool.is_numeric());
        assert!(FieldType::Char.is_text());
        assert!(FieldType::Uuid.is_text());
        assert!(!FieldType::Json.is_text());
    }

    #[test]
    fn test_field_type_serialization_matches_type_name() {
        for field_type in FieldType::ALL {
            let json = serde_json::to_string(&field_type).unwrap();
            assert_eq!(json, format!("\"{}\"", field_type.type_name()));
        }
    }

    // =========================================================================
    // FieldValue Tests
    // =========================================================================

    #[test]
    fn test_field_value_round_trip() {
        assert_eq!(i32::from_value(42_i32.to_value()).unwrap(), 42);
        assert_eq!(
            String::from_value("ant".to_string().to_value()).unwrap(),
            "ant"
        );
        assert_eq!(char::from_value('x'.to_value()).unwrap(), 'x');
    }

    #[test]
    fn test_field_value_rejects_widening() {
        let err = i64::from_value(Value::I32(2)).unwrap_err();
        assert!(matches!(
            err,
            TranslationError::Mismatch {
                expected: FieldType::I64,
                ..
            }
        ));
    }

    #[test]
    fn test_option_field_value() {
        assert_eq!(<Option<i64>>::FIELD_TYPE, FieldType::I64);
        assert!(<Option<i64>>::NULLABLE);
        assert!(!<i64>::NULLABLE);
        assert_eq!(None::<i64>.to_value(), Value::Null);
        assert_eq!(Some(3_i64).to_value(), Value::I64(3));
        assert_eq!(<Option<i64>>::from_value(Value::Null).unwrap(), None);
        assert_eq!(<Option<i64>>::from_value(Value::I64(9)).unwrap(), Some(9));
    }

    #[test]
    fn test_non_optional_rejects_null() {
        assert!(bool::from_value(Value::Null).is_err());
    }

    #[test]
    fn test_value_field_type() {
        assert_eq!(Value::Null.field_type(), None);
        assert_eq!(Value::F64(1.0).field_type(), Some(FieldType::F64));
        assert!(Value::Null.is_null());
    }

    // =========================================================================
    // StoreKey Tests
    // =========================================================================

    #[test]
    fn test_store_key_from_str() {
        assert_eq!(StoreKey::from("player-1").as_str(), "player-1");
        assert_eq!(StoreKey::from(String::from("k")).into_string(), "k");
    }

    #[test]
    fn test_store_key_normalizes_uuid() {
        let id = Uuid::parse_str("A1A2A3A4-B1B2-C1C2-D1D2-D3D4D5D6D7D8").unwrap();
        let key = StoreKey::from(id);
        assert_eq!(key.as_str(), "a1a2a3a4-b1b2-c1c2-d1d2-d3d4d5d6d7d8");
        assert_eq!(StoreKey::from(&id), key);
    }

    #[test]
    fn test_store_key_length_limit() {
        assert!(StoreKey::from("k".repeat(MAX_KEY_LENGTH)).validate().is_ok());
        assert!(StoreKey::from("é".repeat(MAX_KEY_LENGTH)).validate().is_ok());
        assert!(StoreKey::from(Uuid::new_v4()).validate().is_ok());

        let err = StoreKey::from("k".repeat(MAX_KEY_LENGTH + 1))
            .validate()
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_store_key_is_case_sensitive() {
        assert_ne!(StoreKey::from("Alice"), StoreKey::from("alice"));
    }
}
