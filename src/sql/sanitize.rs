//! SQL Identifier Sanitization Utilities
//!
//! Identifiers are derived from namespaces and field names, never taken from
//! values. They are validated against a conservative character set and
//! always emitted backtick-quoted.

use std::sync::LazyLock;

use regex::Regex;

/// Longest identifier MySQL accepts for tables, columns and events
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("identifier pattern is valid"));

/// Quote a MySQL identifier
///
/// # Example
/// ```
/// use runtara_keyed_store::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("players__store"), "`players__store`");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    let escaped = identifier.replace('`', "``");
    format!("`{}`", escaped)
}

/// Validate a derived table, column or event name
///
/// Rules:
/// - Must not be empty or longer than [`MAX_IDENTIFIER_LENGTH`]
/// - Can only contain lowercase letters, digits and underscores
///
/// # Example
/// ```
/// use runtara_keyed_store::sql::validate_identifier;
///
/// assert!(validate_identifier("players__store").is_ok());
/// assert!(validate_identifier("players-store").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(format!(
            "Identifier '{}' is longer than {} characters",
            name, MAX_IDENTIFIER_LENGTH
        ));
    }

    if !IDENTIFIER.is_match(name) {
        return Err(format!(
            "Identifier '{}' is invalid. \
             Only lowercase letters, numbers, and underscores are allowed.",
            name
        ));
    }

    Ok(())
}
