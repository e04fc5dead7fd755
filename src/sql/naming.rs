//! Naming rules for tables, columns and scheduled events
//!
//! The same functions are used when a table is created and every time a
//! statement is rendered, so the two always agree.

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Reserved column holding the record key
pub const KEY_COLUMN: &str = "store_key";
/// Reserved column holding the creation time
pub const CREATED_COLUMN: &str = "store_created";
/// Reserved column holding the last update time
pub const UPDATED_COLUMN: &str = "store_updated";
/// Reserved column holding the expiry time (NULL never expires)
pub const TTL_COLUMN: &str = "store_ttl";

/// Names accepted by [`reserved_column`]
pub const RESERVED_NAMES: [&str; 4] = ["key", "created", "updated", "ttl"];

/// Lower-case, strip whitespace and replace dots
fn normalize(name: &str) -> String {
    WHITESPACE
        .replace_all(name, "")
        .to_lowercase()
        .replace('.', "_")
}

/// Table backing a namespace
///
/// ```
/// use runtara_keyed_store::sql::table_name;
///
/// assert_eq!(table_name("Game.Scores"), "game_scores__store");
/// ```
pub fn table_name(namespace: &str) -> String {
    format!("{}__store", normalize(namespace))
}

/// Scheduled event of a namespace, e.g. the `ttl` sweep
pub fn event_name(namespace: &str, event: &str) -> String {
    normalize(&format!("{}_{}_store", namespace, event))
}

/// Column of a reserved name (`key`, `created`, `updated`, `ttl`)
pub fn reserved_column(name: &str) -> String {
    format!("store_{}", name.to_lowercase())
}

/// Column of a record field
///
/// The semantic type is part of the column name; changing the declared type
/// of a field therefore maps it to a new column.
pub fn field_column(type_name: &str, field: &str) -> String {
    format!("{}_{}", type_name.to_lowercase(), field.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_lowercases() {
        assert_eq!(table_name("Players"), "players__store");
    }

    #[test]
    fn test_table_name_strips_whitespace() {
        assert_eq!(table_name("  my players\t"), "myplayers__store");
    }

    #[test]
    fn test_table_name_replaces_dots() {
        assert_eq!(table_name("com.example.Players"), "com_example_players__store");
    }

    #[test]
    fn test_table_name_is_deterministic() {
        assert_eq!(table_name("Mixed Case.ns"), table_name("Mixed Case.ns"));
    }

    #[test]
    fn test_event_name() {
        assert_eq!(event_name("Game.Scores", "ttl"), "game_scores_ttl_store");
        assert_eq!(event_name("a b", "TTL"), "ab_ttl_store");
    }

    #[test]
    fn test_reserved_columns() {
        assert_eq!(reserved_column("key"), KEY_COLUMN);
        assert_eq!(reserved_column("created"), CREATED_COLUMN);
        assert_eq!(reserved_column("UPDATED"), UPDATED_COLUMN);
        assert_eq!(reserved_column("ttl"), TTL_COLUMN);
    }

    #[test]
    fn test_field_column_embeds_type() {
        assert_eq!(field_column("i64", "Score"), "i64_score");
        assert_eq!(field_column("STRING", "name"), "string_name");
    }
}
