//! Record field mapping
//!
//! A [`Record`] declares its persisted fields once through a
//! [`FieldMapBuilder`]. The resulting [`FieldMap`] is built when a store is
//! opened and stays fixed for the lifetime of that store: its order drives the
//! column order of CREATE TABLE and the parameter order of every statement.

use std::fmt;

use crate::error::{Result, StoreError, TranslationError};
use crate::registry::TypeRegistry;
use crate::sql::naming::field_column;
use crate::sql::sanitize::validate_identifier;
use crate::types::{FieldType, FieldValue, Value};

/// A record type that can be persisted by a keyed store
///
/// `Default` supplies the zero-value sample: rows are read back by starting
/// from the default record and assigning each mapped field.
///
/// Implement it by hand or with the [`record!`](crate::record!) macro:
///
/// ```rust
/// use runtara_keyed_store::{record, FieldMap};
///
/// #[derive(Debug, Default, Clone, PartialEq)]
/// struct Player {
///     name: String,
///     score: i64,
///     active: bool,
/// }
///
/// record!(Player { name, score, active });
///
/// let fields = FieldMap::<Player>::of().unwrap();
/// assert_eq!(fields.names(), vec!["name", "score", "active"]);
/// ```
pub trait Record: Default + Send + Sync + 'static {
    fn describe(fields: &mut FieldMapBuilder<Self>);
}

/// Implement [`Record`] for a struct from a list of its fields
#[macro_export]
macro_rules! record {
    ($record:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::Record for $record {
            fn describe(fields: &mut $crate::FieldMapBuilder<Self>) {
                $(
                    fields.field(
                        stringify!($field),
                        |record: &Self| &record.$field,
                        |record: &mut Self| &mut record.$field,
                    );
                )+
            }
        }
    };
}

type Getter<R> = Box<dyn Fn(&R) -> Value + Send + Sync>;
type Setter<R> =
    Box<dyn Fn(&mut R, Value) -> std::result::Result<(), TranslationError> + Send + Sync>;

/// Name, semantic type and accessors of one record field
pub struct FieldSpec<R> {
    name: String,
    field_type: FieldType,
    nullable: bool,
    column: String,
    get: Getter<R>,
    set: Setter<R>,
}

impl<R> FieldSpec<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    /// Storage column of the field
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Read the field out of a record
    pub fn get(&self, record: &R) -> Value {
        (self.get)(record)
    }

    /// Assign the field on a record
    pub fn set(&self, record: &mut R, value: Value) -> std::result::Result<(), TranslationError> {
        if value.is_null() && !self.nullable {
            return Err(TranslationError::UnexpectedNull(self.column.clone()));
        }
        (self.set)(record, value)
    }
}

impl<R> fmt::Debug for FieldSpec<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("nullable", &self.nullable)
            .field("column", &self.column)
            .finish()
    }
}

/// Collects field declarations for a [`Record`]
pub struct FieldMapBuilder<R> {
    fields: Vec<FieldSpec<R>>,
}

impl<R: 'static> FieldMapBuilder<R> {
    fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Declare a field by name with a shared and a mutable accessor
    pub fn field<T, G, M>(&mut self, name: &str, get: G, get_mut: M) -> &mut Self
    where
        T: FieldValue + 'static,
        G: Fn(&R) -> &T + Send + Sync + 'static,
        M: Fn(&mut R) -> &mut T + Send + Sync + 'static,
    {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            field_type: T::FIELD_TYPE,
            nullable: T::NULLABLE,
            column: field_column(T::FIELD_TYPE.type_name(), name),
            get: Box::new(move |record| get(record).to_value()),
            set: Box::new(move |record, value| {
                *get_mut(record) = T::from_value(value)?;
                Ok(())
            }),
        });
        self
    }
}

/// Ordered field specs of a record type
#[derive(Debug)]
pub struct FieldMap<R> {
    fields: Vec<FieldSpec<R>>,
}

impl<R: Record> FieldMap<R> {
    /// Build the field map of `R`
    ///
    /// Rejects records without fields, duplicate field names, and names
    /// that do not form valid column identifiers.
    pub fn of() -> Result<Self> {
        let mut builder = FieldMapBuilder::new();
        R::describe(&mut builder);
        let fields = builder.fields;

        if fields.is_empty() {
            return Err(StoreError::validation(format!(
                "Record type '{}' declares no fields",
                std::any::type_name::<R>()
            )));
        }

        for (i, spec) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == spec.name) {
                return Err(StoreError::validation(format!(
                    "Field '{}' is declared more than once",
                    spec.name
                )));
            }
            if fields[..i].iter().any(|f| f.column == spec.column) {
                return Err(StoreError::validation(format!(
                    "Field '{}' maps to column '{}' of another field",
                    spec.name, spec.column
                )));
            }
            validate_identifier(&spec.column).map_err(StoreError::Validation)?;
        }

        Ok(Self { fields })
    }

    /// Build a default record and assign every field from `values`
    ///
    /// `values` must be in field order.
    pub fn assemble(&self, values: Vec<Value>) -> std::result::Result<R, TranslationError> {
        let mut record = R::default();
        for (spec, value) in self.fields.iter().zip(values) {
            spec.set(&mut record, value)?;
        }
        Ok(record)
    }
}

impl<R> FieldMap<R> {
    /// Check that every field type has a registry translation
    pub fn verify(&self, registry: &TypeRegistry) -> std::result::Result<(), TranslationError> {
        for spec in &self.fields {
            registry.translation(spec.field_type)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec<R>> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field spec by field name
    pub fn get(&self, name: &str) -> Option<&FieldSpec<R>> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Field values of `record` in field order
    pub fn values(&self, record: &R) -> Vec<Value> {
        self.fields.iter().map(|f| f.get(record)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Order {
        id: Uuid,
        label: String,
        quantity: i32,
        price: Decimal,
        note: Option<String>,
    }

    crate::record!(Order {
        id,
        label,
        quantity,
        price,
        note,
    });

    #[derive(Debug, Default)]
    struct Twice {
        a: i64,
    }

    impl Record for Twice {
        fn describe(fields: &mut FieldMapBuilder<Self>) {
            fields
                .field("a", |r: &Self| &r.a, |r: &mut Self| &mut r.a)
                .field("a", |r: &Self| &r.a, |r: &mut Self| &mut r.a);
        }
    }

    #[derive(Debug, Default)]
    struct CaseClash {
        a: i64,
    }

    impl Record for CaseClash {
        fn describe(fields: &mut FieldMapBuilder<Self>) {
            fields
                .field("total", |r: &Self| &r.a, |r: &mut Self| &mut r.a)
                .field("Total", |r: &Self| &r.a, |r: &mut Self| &mut r.a);
        }
    }

    #[derive(Debug, Default)]
    struct Empty;

    impl Record for Empty {
        fn describe(_fields: &mut FieldMapBuilder<Self>) {}
    }

    #[derive(Debug, Default)]
    struct BadName {
        a: i64,
    }

    impl Record for BadName {
        fn describe(fields: &mut FieldMapBuilder<Self>) {
            fields.field("a; DROP TABLE x", |r: &Self| &r.a, |r: &mut Self| &mut r.a);
        }
    }

    // =========================================================================
    // FieldMap Construction Tests
    // =========================================================================

    #[test]
    fn test_field_order_follows_declaration() {
        let map = FieldMap::<Order>::of().unwrap();
        assert_eq!(map.names(), vec!["id", "label", "quantity", "price", "note"]);
        assert_eq!(map.len(), 5);
    }

    #[test]
    fn test_field_types_and_columns() {
        let map = FieldMap::<Order>::of().unwrap();
        let quantity = map.get("quantity").unwrap();
        assert_eq!(quantity.field_type(), FieldType::I32);
        assert_eq!(quantity.column(), "i32_quantity");
        assert!(!quantity.nullable());

        let note = map.get("note").unwrap();
        assert_eq!(note.field_type(), FieldType::String);
        assert_eq!(note.column(), "string_note");
        assert!(note.nullable());

        assert_eq!(map.get("id").unwrap().column(), "uuid_id");
        assert!(map.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = FieldMap::<Twice>::of().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_column_collision_rejected() {
        let err = FieldMap::<CaseClash>::of().unwrap_err();
        assert!(err.to_string().contains("i64_total"));
    }

    #[test]
    fn test_empty_record_rejected() {
        assert!(FieldMap::<Empty>::of().is_err());
    }

    #[test]
    fn test_invalid_field_name_rejected() {
        assert!(matches!(
            FieldMap::<BadName>::of(),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_verify_against_registry() {
        let map = FieldMap::<Order>::of().unwrap();
        assert!(map.verify(&TypeRegistry::with_builtins()).is_ok());

        let mut partial = TypeRegistry::new();
        let builtins = TypeRegistry::with_builtins();
        let text = builtins.translation(FieldType::String).unwrap();
        partial.register(FieldType::String, "TEXT", text.bind, text.read);
        assert_eq!(
            map.verify(&partial).unwrap_err(),
            TranslationError::Unsupported(FieldType::Uuid)
        );
    }

    // =========================================================================
    // Value Access Tests
    // =========================================================================

    #[test]
    fn test_values_and_assemble() {
        let map = FieldMap::<Order>::of().unwrap();
        let order = Order {
            id: Uuid::new_v4(),
            label: "crate".to_string(),
            quantity: 3,
            price: Decimal::new(1999, 2),
            note: None,
        };

        let values = map.values(&order);
        assert_eq!(values[1], Value::String("crate".to_string()));
        assert_eq!(values[4], Value::Null);

        let rebuilt = map.assemble(values).unwrap();
        assert_eq!(rebuilt, order);
    }

    #[test]
    fn test_set_rejects_null_for_required_field() {
        let map = FieldMap::<Order>::of().unwrap();
        let mut order = Order::default();
        let err = map.get("label").unwrap().set(&mut order, Value::Null).unwrap_err();
        assert_eq!(err, TranslationError::UnexpectedNull("string_label".to_string()));
    }

    #[test]
    fn test_set_rejects_wrong_type() {
        let map = FieldMap::<Order>::of().unwrap();
        let mut order = Order::default();
        let quantity = map.get("quantity").unwrap();
        assert!(quantity.set(&mut order, Value::I64(3)).is_err());
    }
}
