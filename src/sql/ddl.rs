//! DDL Generation for namespace tables
//!
//! Generates the idempotent MySQL statements that create the backing table
//! of a namespace and its scheduled TTL sweep.

use crate::error::{Result, StoreError};
use crate::record::FieldMap;
use crate::registry::TypeRegistry;
use crate::sql::naming::{
    CREATED_COLUMN, KEY_COLUMN, TTL_COLUMN, UPDATED_COLUMN, event_name, table_name,
};
use crate::sql::sanitize::{quote_identifier, validate_identifier};

/// Column type of the key column
///
/// Under the binary collation keys differing only in case or accents are
/// distinct keys.
pub const KEY_COLUMN_DDL: &str = "VARCHAR(255) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin";

/// Event suffix of the TTL sweep
pub const TTL_EVENT: &str = "ttl";

/// DDL Generator for namespace tables
pub struct DdlGenerator<'a> {
    registry: &'a TypeRegistry,
}

impl<'a> DdlGenerator<'a> {
    /// Create a new DDL generator resolving column types through `registry`
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self { registry }
    }

    /// Generate CREATE TABLE for a single-value namespace
    ///
    /// The key column is the primary key, so each key holds one record.
    pub fn create_table<R>(&self, namespace: &str, fields: &FieldMap<R>) -> Result<String> {
        let primary_key = format!("PRIMARY KEY ({})", quote_identifier(KEY_COLUMN));
        self.generate_create_table(namespace, fields, primary_key)
    }

    /// Generate CREATE TABLE for a multi-value namespace
    ///
    /// The key column carries a plain secondary index; any number of rows
    /// may share a key.
    pub fn create_multi_table<R>(&self, namespace: &str, fields: &FieldMap<R>) -> Result<String> {
        self.generate_create_table(
            namespace,
            fields,
            format!(
                "INDEX {} ({})",
                quote_identifier("idx_store_key"),
                quote_identifier(KEY_COLUMN)
            ),
        )
    }

    /// Generate the hourly event deleting rows whose TTL has passed
    pub fn create_ttl_event(&self, namespace: &str) -> Result<String> {
        let table = checked(table_name(namespace))?;
        let event = checked(event_name(namespace, TTL_EVENT))?;

        Ok(format!(
            "CREATE EVENT IF NOT EXISTS {} ON SCHEDULE EVERY 1 HOUR \
             DO DELETE FROM {} WHERE {} < NOW(6)",
            quote_identifier(&event),
            quote_identifier(&table),
            quote_identifier(TTL_COLUMN)
        ))
    }

    fn generate_create_table<R>(
        &self,
        namespace: &str,
        fields: &FieldMap<R>,
        key_index: String,
    ) -> Result<String> {
        let table = checked(table_name(namespace))?;

        let mut column_defs = vec![
            format!("{} {} NOT NULL", quote_identifier(KEY_COLUMN), KEY_COLUMN_DDL),
            format!(
                "{} DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6)",
                quote_identifier(CREATED_COLUMN)
            ),
            format!(
                "{} DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6) \
                 ON UPDATE CURRENT_TIMESTAMP(6)",
                quote_identifier(UPDATED_COLUMN)
            ),
            format!("{} DATETIME(6) NULL DEFAULT NULL", quote_identifier(TTL_COLUMN)),
        ];

        for spec in fields.iter() {
            let column_type = self.registry.column_for(spec.field_type())?;
            column_defs.push(format!(
                "{} {} {}",
                quote_identifier(spec.column()),
                column_type,
                if spec.nullable() { "NULL" } else { "NOT NULL" }
            ));
        }

        column_defs.push(key_index);
        column_defs.push(format!(
            "INDEX {} ({})",
            quote_identifier("idx_store_ttl"),
            quote_identifier(TTL_COLUMN)
        ));

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(&table),
            column_defs.join(", ")
        ))
    }
}

fn checked(identifier: String) -> Result<String> {
    validate_identifier(&identifier).map_err(StoreError::Validation)?;
    Ok(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranslationError;
    use crate::types::FieldType;

    #[derive(Debug, Default)]
    struct Score {
        player: String,
        points: i64,
        bonus: Option<f64>,
    }

    crate::record!(Score {
        player,
        points,
        bonus
    });

    fn fields() -> FieldMap<Score> {
        FieldMap::of().unwrap()
    }

    // ==================== CREATE TABLE Tests ====================

    #[test]
    fn test_create_table_single_value() {
        let registry = TypeRegistry::with_builtins();
        let ddl = DdlGenerator::new(&registry)
            .create_table("Game.Scores", &fields())
            .unwrap();

        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS `game_scores__store` (\
             `store_key` VARCHAR(255) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL, \
             `store_created` DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6), \
             `store_updated` DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6) \
             ON UPDATE CURRENT_TIMESTAMP(6), \
             `store_ttl` DATETIME(6) NULL DEFAULT NULL, \
             `string_player` TEXT NOT NULL, \
             `i64_points` BIGINT NOT NULL, \
             `f64_bonus` DOUBLE NULL, \
             PRIMARY KEY (`store_key`), \
             INDEX `idx_store_ttl` (`store_ttl`))"
        );
    }

    #[test]
    fn test_create_multi_table_indexes_key() {
        let registry = TypeRegistry::with_builtins();
        let ddl = DdlGenerator::new(&registry)
            .create_multi_table("scores", &fields())
            .unwrap();

        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS `scores__store`"));
        assert!(ddl.contains(&format!("`store_key` {} NOT NULL", KEY_COLUMN_DDL)));
        assert!(ddl.contains("INDEX `idx_store_key` (`store_key`)"));
        assert!(!ddl.contains("PRIMARY KEY"));
        assert!(!ddl.contains("UNIQUE"));
    }

    #[test]
    fn test_create_table_is_idempotent_statement() {
        let registry = TypeRegistry::with_builtins();
        let generator = DdlGenerator::new(&registry);
        let first = generator.create_table("scores", &fields()).unwrap();
        let second = generator.create_table("scores", &fields()).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("IF NOT EXISTS"));
    }

    #[test]
    fn test_create_table_uses_registered_ddl() {
        let mut registry = TypeRegistry::with_builtins();
        let text = registry.translation(FieldType::String).unwrap().clone();
        registry.register(FieldType::String, "VARCHAR(64)", text.bind, text.read);

        let ddl = DdlGenerator::new(&registry)
            .create_table("scores", &fields())
            .unwrap();
        assert!(ddl.contains("`string_player` VARCHAR(64) NOT NULL"));
    }

    #[test]
    fn test_create_table_unsupported_type() {
        let registry = TypeRegistry::new();
        let err = DdlGenerator::new(&registry)
            .create_table("scores", &fields())
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Translation(TranslationError::Unsupported(FieldType::String))
        ));
    }

    #[test]
    fn test_create_table_rejects_bad_namespace() {
        let registry = TypeRegistry::with_builtins();
        let generator = DdlGenerator::new(&registry);
        assert!(generator.create_table("bad-name", &fields()).is_err());
        assert!(generator.create_table("x`; DROP", &fields()).is_err());
    }

    // ==================== CREATE EVENT Tests ====================

    #[test]
    fn test_create_ttl_event() {
        let registry = TypeRegistry::with_builtins();
        let ddl = DdlGenerator::new(&registry)
            .create_ttl_event("Game.Scores")
            .unwrap();

        assert_eq!(
            ddl,
            "CREATE EVENT IF NOT EXISTS `game_scores_ttl_store` ON SCHEDULE EVERY 1 HOUR \
             DO DELETE FROM `game_scores__store` WHERE `store_ttl` < NOW(6)"
        );
    }
}
