//! Type translation registry
//!
//! Maps each semantic [`FieldType`] to its MySQL column definition and to the
//! pair of functions that move a [`Value`] into a bound statement parameter
//! and back out of a result row.
//!
//! A registry is assembled once, then shared read-only (behind an `Arc`) by
//! every store created from the same [`crate::StoreContext`].

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use uuid::Uuid;

use crate::error::{Result, StoreError, TranslationError};
use crate::types::{FieldType, Value};

/// A MySQL statement with positional arguments
pub type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

/// Writes a value into the next positional parameter of a statement
pub type BindFn =
    for<'q> fn(MySqlQuery<'q>, Value) -> std::result::Result<MySqlQuery<'q>, TranslationError>;

/// Reads a named column of a result row back into a value
pub type ReadFn = fn(&MySqlRow, &str) -> std::result::Result<Value, sqlx::Error>;

/// Storage mapping for one field type
#[derive(Debug, Clone)]
pub struct Translation {
    /// Column type fragment used in CREATE TABLE
    pub column_ddl: String,
    pub bind: BindFn,
    pub read: ReadFn,
}

/// Registry of field type translations
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    entries: HashMap<FieldType, Translation>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in translations for every
    /// [`FieldType`]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(FieldType::String, "TEXT", bind_string, read_string)
            .register(FieldType::I8, "TINYINT", bind_i8, read_i8)
            .register(FieldType::I16, "SMALLINT", bind_i16, read_i16)
            .register(FieldType::I32, "INT", bind_i32, read_i32)
            .register(FieldType::I64, "BIGINT", bind_i64, read_i64)
            .register(FieldType::F32, "FLOAT", bind_f32, read_f32)
            .register(FieldType::F64, "DOUBLE", bind_f64, read_f64)
            .register(FieldType::Bool, "BOOLEAN", bind_bool, read_bool)
            .register(FieldType::Char, "VARCHAR(1)", bind_char, read_char)
            .register(FieldType::Decimal, DECIMAL_DDL, bind_decimal, read_decimal)
            .register(FieldType::Uuid, "CHAR(36)", bind_uuid, read_uuid)
            .register(FieldType::Timestamp, "DATETIME(6)", bind_timestamp, read_timestamp)
            .register(FieldType::Json, "JSON", bind_json, read_json);
        registry
    }

    /// Register (or replace) the translation for a field type
    pub fn register(
        &mut self,
        field_type: FieldType,
        column_ddl: impl Into<String>,
        bind: BindFn,
        read: ReadFn,
    ) -> &mut Self {
        self.entries.insert(
            field_type,
            Translation {
                column_ddl: column_ddl.into(),
                bind,
                read,
            },
        );
        self
    }

    pub fn contains(&self, field_type: FieldType) -> bool {
        self.entries.contains_key(&field_type)
    }

    /// Look up the translation for a field type
    pub fn translation(
        &self,
        field_type: FieldType,
    ) -> std::result::Result<&Translation, TranslationError> {
        self.entries
            .get(&field_type)
            .ok_or(TranslationError::Unsupported(field_type))
    }

    /// Column type fragment for a field type
    pub fn column_for(&self, field_type: FieldType) -> std::result::Result<&str, TranslationError> {
        Ok(self.translation(field_type)?.column_ddl.as_str())
    }

    /// Bind a value as the next positional parameter of `query`
    pub fn bind<'q>(
        &self,
        field_type: FieldType,
        query: MySqlQuery<'q>,
        value: Value,
    ) -> std::result::Result<MySqlQuery<'q>, TranslationError> {
        (self.translation(field_type)?.bind)(query, value)
    }

    /// Read a column of `row` as a value of `field_type`
    pub fn read(&self, field_type: FieldType, row: &MySqlRow, column: &str) -> Result<Value> {
        let translation = self.translation(field_type)?;
        (translation.read)(row, column).map_err(StoreError::Sql)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============================================================================
// Built-in Translations
// ============================================================================

macro_rules! scalar_translation {
    ($bind:ident, $read:ident, $rust:ty, $variant:ident $(, $check:path)?) => {
        fn $bind<'q>(
            query: MySqlQuery<'q>,
            value: Value,
        ) -> std::result::Result<MySqlQuery<'q>, TranslationError> {
            match value {
                Value::Null => Ok(query.bind(None::<$rust>)),
                Value::$variant(v) => {
                    $($check(&v)?;)?
                    Ok(query.bind(v))
                }
                other => Err(TranslationError::mismatch(FieldType::$variant, other)),
            }
        }

        fn $read(row: &MySqlRow, column: &str) -> std::result::Result<Value, sqlx::Error> {
            Ok(row
                .try_get::<Option<$rust>, _>(column)?
                .map_or(Value::Null, Value::$variant))
        }
    };
}

scalar_translation!(bind_string, read_string, String, String);
scalar_translation!(bind_i8, read_i8, i8, I8);
scalar_translation!(bind_i16, read_i16, i16, I16);
scalar_translation!(bind_i32, read_i32, i32, I32);
scalar_translation!(bind_i64, read_i64, i64, I64);
scalar_translation!(bind_f32, read_f32, f32, F32);
scalar_translation!(bind_f64, read_f64, f64, F64);
scalar_translation!(bind_bool, read_bool, bool, Bool);
scalar_translation!(bind_decimal, read_decimal, Decimal, Decimal, check_decimal);
scalar_translation!(bind_timestamp, read_timestamp, DateTime<Utc>, Timestamp, check_timestamp);
scalar_translation!(bind_json, read_json, serde_json::Value, Json);

/// Column type of decimal fields
pub const DECIMAL_DDL: &str = "DECIMAL(28,10)";

/// Fractional digits kept by [`DECIMAL_DDL`]
const DECIMAL_SCALE: u32 = 10;

/// Integer digits kept by [`DECIMAL_DDL`]
const DECIMAL_INTEGER_DIGITS: u32 = 18;

/// Reject decimals the column would round or refuse
fn check_decimal(value: &Decimal) -> std::result::Result<(), TranslationError> {
    if value.normalize().scale() > DECIMAL_SCALE {
        return Err(TranslationError::unrepresentable(
            FieldType::Decimal,
            value,
            format!("more than {} fractional digits", DECIMAL_SCALE),
        ));
    }
    if value.abs().trunc() >= Decimal::from(10_i64.pow(DECIMAL_INTEGER_DIGITS)) {
        return Err(TranslationError::unrepresentable(
            FieldType::Decimal,
            value,
            format!("more than {} integer digits", DECIMAL_INTEGER_DIGITS),
        ));
    }
    Ok(())
}

/// Reject instants outside `DATETIME(6)`: sub-microsecond parts and years
/// outside 1000..=9999
fn check_timestamp(value: &DateTime<Utc>) -> std::result::Result<(), TranslationError> {
    if value.timestamp_subsec_nanos() % 1_000 != 0 {
        return Err(TranslationError::unrepresentable(
            FieldType::Timestamp,
            value,
            "precision finer than a microsecond",
        ));
    }
    if !(1000..=9999).contains(&value.year()) {
        return Err(TranslationError::unrepresentable(
            FieldType::Timestamp,
            value,
            "year outside 1000..=9999",
        ));
    }
    Ok(())
}

fn column_decode(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

fn bind_char<'q>(
    query: MySqlQuery<'q>,
    value: Value,
) -> std::result::Result<MySqlQuery<'q>, TranslationError> {
    match value {
        Value::Null => Ok(query.bind(None::<String>)),
        Value::Char(c) => Ok(query.bind(c.to_string())),
        other => Err(TranslationError::mismatch(FieldType::Char, other)),
    }
}

fn read_char(row: &MySqlRow, column: &str) -> std::result::Result<Value, sqlx::Error> {
    let Some(text) = row.try_get::<Option<String>, _>(column)? else {
        return Ok(Value::Null);
    };
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Char(c)),
        _ => Err(column_decode(
            column,
            format!("expected a single character, got {:?}", text),
        )),
    }
}

fn bind_uuid<'q>(
    query: MySqlQuery<'q>,
    value: Value,
) -> std::result::Result<MySqlQuery<'q>, TranslationError> {
    match value {
        Value::Null => Ok(query.bind(None::<String>)),
        Value::Uuid(id) => Ok(query.bind(id.hyphenated().to_string())),
        other => Err(TranslationError::mismatch(FieldType::Uuid, other)),
    }
}

fn read_uuid(row: &MySqlRow, column: &str) -> std::result::Result<Value, sqlx::Error> {
    match row.try_get::<Option<String>, _>(column)? {
        Some(text) => Uuid::parse_str(&text)
            .map(Value::Uuid)
            .map_err(|e| column_decode(column, format!("invalid uuid {:?}: {}", text, e))),
        None => Ok(Value::Null),
    }
}
