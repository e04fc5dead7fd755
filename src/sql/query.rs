//! Composable query specifications and statement rendering
//!
//! A [`QuerySpec`] describes one read: an optional key scope, an optional
//! filter predicate, an optional sort and an optional page. The
//! [`StatementBuilder`] renders it (and every mutation) into SQL text with
//! positional `?` placeholders plus the ordered [`Param`]s to bind. Values
//! never appear in the SQL text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError, TranslationError};
use crate::record::{FieldMap, FieldSpec};
use crate::sql::naming::{
    CREATED_COLUMN, KEY_COLUMN, RESERVED_NAMES, TTL_COLUMN, UPDATED_COLUMN, reserved_column,
    table_name,
};
use crate::sql::sanitize::{quote_identifier, validate_identifier};
use crate::types::{FieldType, FieldValue, StoreKey, Value};

// ============================================================================
// Query Specification
// ============================================================================

/// Filter predicate on one record field
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field >= cutoff` on a numeric field
    Min { field: String, cutoff: Value },
    /// `field <= cutoff` on a numeric field
    Max { field: String, cutoff: Value },
    /// `field = value` on a numeric field
    Equals { field: String, value: Value },
    /// `field = value` on a boolean field
    Is { field: String, value: bool },
    /// `field LIKE 'prefix%'` on a text field, wildcards in `prefix` match literally
    Prefix { field: String, prefix: String },
}

impl Filter {
    pub fn min(field: impl Into<String>, cutoff: impl FieldValue) -> Self {
        Filter::Min {
            field: field.into(),
            cutoff: cutoff.to_value(),
        }
    }

    pub fn max(field: impl Into<String>, cutoff: impl FieldValue) -> Self {
        Filter::Max {
            field: field.into(),
            cutoff: cutoff.to_value(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl FieldValue) -> Self {
        Filter::Equals {
            field: field.into(),
            value: value.to_value(),
        }
    }

    pub fn is(field: impl Into<String>, value: bool) -> Self {
        Filter::Is {
            field: field.into(),
            value,
        }
    }

    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Filter::Prefix {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    /// Name of the filtered field
    pub fn field(&self) -> &str {
        match self {
            Filter::Min { field, .. }
            | Filter::Max { field, .. }
            | Filter::Equals { field, .. }
            | Filter::Is { field, .. }
            | Filter::Prefix { field, .. } => field,
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Sort on a record field or a reserved name (`key`, `created`, `updated`, `ttl`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    /// Sort ascending, or descending when `reverse` is set
    pub fn new(field: impl Into<String>, reverse: bool) -> Self {
        Self {
            field: field.into(),
            direction: if reverse {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            },
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, false)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, true)
    }
}

/// One page of results, numbered from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    number: u32,
    length: u32,
}

impl Page {
    /// Create a page; both the page number and the page length must be at least 1
    pub fn new(number: u32, length: u32) -> Result<Self> {
        if number < 1 {
            return Err(StoreError::validation("Page number must be at least 1"));
        }
        if length < 1 {
            return Err(StoreError::validation("Page length must be at least 1"));
        }
        Ok(Self { number, length })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Rows skipped before this page: `(number - 1) * length`
    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.length)
    }
}

/// Composable description of a read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub key: Option<StoreKey>,
    pub filter: Option<Filter>,
    pub sort: Option<Sort>,
    pub page: Option<Page>,
}

impl QuerySpec {
    /// Every live row of the namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to rows of one key
    pub fn key(mut self, key: impl Into<StoreKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }
}

// ============================================================================
// Rendered Statements
// ============================================================================

/// A positional statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Record key
    Key(String),
    /// Field value, bound through the type registry
    Field(FieldType, Value),
    /// Plain text (LIKE patterns)
    Text(String),
    /// TTL instant, `None` clears the TTL
    Timestamp(Option<DateTime<Utc>>),
    /// LIMIT and OFFSET
    Count(u64),
}

/// SQL text with its ordered parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

/// Liveness condition applied to every read
pub fn live_clause() -> String {
    let ttl = quote_identifier(TTL_COLUMN);
    format!("({} >= NOW(6) OR {} IS NULL)", ttl, ttl)
}

/// Renders statements for one namespace table
pub struct StatementBuilder<'a, R> {
    table: String,
    fields: &'a FieldMap<R>,
}

impl<'a, R> StatementBuilder<'a, R> {
    pub fn new(namespace: &str, fields: &'a FieldMap<R>) -> Result<Self> {
        let table = table_name(namespace);
        validate_identifier(&table).map_err(StoreError::Validation)?;
        Ok(Self {
            table: quote_identifier(&table),
            fields,
        })
    }

    /// Reserved and field columns, in the order rows are read
    fn select_columns(&self) -> String {
        [KEY_COLUMN, CREATED_COLUMN, UPDATED_COLUMN, TTL_COLUMN]
            .into_iter()
            .chain(self.fields.iter().map(|f| f.column()))
            .map(quote_identifier)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// SELECT rows matching `spec`
    pub fn select(&self, spec: &QuerySpec) -> Result<Statement> {
        let mut params = Vec::new();
        let where_clause = self.where_clause(spec, &mut params)?;
        let order_clause = self.order_clause(spec.sort.as_ref())?;

        let mut sql = format!(
            "SELECT {} FROM {} WHERE {} {}",
            self.select_columns(),
            self.table,
            where_clause,
            order_clause
        );
        push_page(&mut sql, &mut params, spec.page);

        Ok(Statement { sql, params })
    }

    /// SELECT the distinct keys of rows matching `spec`
    ///
    /// Keys are ordered by key; a sort on `key` picks the direction, any
    /// other sort is ignored.
    pub fn keys(&self, spec: &QuerySpec) -> Result<Statement> {
        let mut params = Vec::new();
        let where_clause = self.where_clause(spec, &mut params)?;
        let direction = match &spec.sort {
            Some(sort) if sort.field == "key" => sort.direction,
            _ => SortDirection::Asc,
        };

        let key = quote_identifier(KEY_COLUMN);
        let mut sql = format!(
            "SELECT DISTINCT {} FROM {} WHERE {} ORDER BY {} {}",
            key,
            self.table,
            where_clause,
            key,
            direction.as_sql()
        );
        push_page(&mut sql, &mut params, spec.page);

        Ok(Statement { sql, params })
    }

    /// COUNT rows matching `spec` (sort and page are ignored)
    pub fn count(&self, spec: &QuerySpec) -> Result<Statement> {
        self.aggregate("COUNT(*)".to_string(), spec)
    }

    /// COUNT distinct keys among rows matching `spec`
    pub fn count_distinct(&self, spec: &QuerySpec) -> Result<Statement> {
        self.aggregate(format!("COUNT(DISTINCT {})", quote_identifier(KEY_COLUMN)), spec)
    }

    /// SUM a numeric field over rows matching `spec`, zero when none match
    ///
    /// Float sums come back as DOUBLE. Integer and decimal sums come back as
    /// exact DECIMAL, so an integer total beyond the range of `i64` is kept
    /// whole; the returned field type tells which.
    pub fn sum(&self, field: &str, spec: &QuerySpec) -> Result<(Statement, FieldType)> {
        let field_spec = self.field(field)?;
        let field_type = field_spec.field_type();
        let column = quote_identifier(field_spec.column());

        let expression = if field_type.is_float() {
            format!("COALESCE(SUM({}), 0e0)", column)
        } else if field_type.is_integer() || field_type == FieldType::Decimal {
            format!("COALESCE(SUM({}), 0)", column)
        } else {
            return Err(StoreError::validation(format!(
                "Cannot sum field '{}' of type {}",
                field, field_type
            )));
        };

        Ok((self.aggregate(expression, spec)?, field_type))
    }

    fn aggregate(&self, expression: String, spec: &QuerySpec) -> Result<Statement> {
        let mut params = Vec::new();
        let where_clause = self.where_clause(spec, &mut params)?;
        Ok(Statement {
            sql: format!(
                "SELECT {} FROM {} WHERE {}",
                expression, self.table, where_clause
            ),
            params,
        })
    }

    /// INSERT one row for `record` under `key`
    pub fn insert(&self, key: &StoreKey, record: &R) -> Statement {
        let mut columns = vec![quote_identifier(KEY_COLUMN)];
        let mut params = vec![Param::Key(key.to_string())];

        for spec in self.fields.iter() {
            columns.push(quote_identifier(spec.column()));
            params.push(Param::Field(spec.field_type(), spec.get(record)));
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        Statement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                columns.join(", "),
                placeholders
            ),
            params,
        }
    }

    /// UPDATE every field of the live row(s) of `key`
    pub fn update(&self, key: &StoreKey, record: &R) -> Statement {
        let mut assignments = Vec::new();
        let mut params = Vec::new();

        for spec in self.fields.iter() {
            assignments.push(format!("{} = ?", quote_identifier(spec.column())));
            params.push(Param::Field(spec.field_type(), spec.get(record)));
        }
        assignments.push(format!(
            "{} = CURRENT_TIMESTAMP(6)",
            quote_identifier(UPDATED_COLUMN)
        ));
        params.push(Param::Key(key.to_string()));

        Statement {
            sql: format!(
                "UPDATE {} SET {} WHERE {} = ? AND {}",
                self.table,
                assignments.join(", "),
                quote_identifier(KEY_COLUMN),
                live_clause()
            ),
            params,
        }
    }

    /// DELETE every row of `key`, live or expired
    pub fn delete(&self, key: &StoreKey) -> Statement {
        Statement {
            sql: format!(
                "DELETE FROM {} WHERE {} = ?",
                self.table,
                quote_identifier(KEY_COLUMN)
            ),
            params: vec![Param::Key(key.to_string())],
        }
    }

    /// DELETE the rows of `key` whose fields all equal those of `record`
    pub fn delete_where(&self, key: &StoreKey, record: &R) -> Statement {
        let mut params = vec![Param::Key(key.to_string())];
        let matches = self.match_clause(record, &mut params);
        Statement {
            sql: format!(
                "DELETE FROM {} WHERE {} = ? AND {}",
                self.table,
                quote_identifier(KEY_COLUMN),
                matches
            ),
            params,
        }
    }

    /// DELETE the row(s) of `key` whose TTL has already passed
    pub fn purge_expired(&self, key: &StoreKey) -> Statement {
        Statement {
            sql: format!(
                "DELETE FROM {} WHERE {} = ? AND {} < NOW(6)",
                self.table,
                quote_identifier(KEY_COLUMN),
                quote_identifier(TTL_COLUMN)
            ),
            params: vec![Param::Key(key.to_string())],
        }
    }

    /// Set (or clear, with `None`) the TTL of every row of `key`
    pub fn expire(&self, key: &StoreKey, at: Option<DateTime<Utc>>) -> Statement {
        Statement {
            sql: format!(
                "UPDATE {} SET {} = ? WHERE {} = ?",
                self.table,
                quote_identifier(TTL_COLUMN),
                quote_identifier(KEY_COLUMN)
            ),
            params: vec![Param::Timestamp(at), Param::Key(key.to_string())],
        }
    }

    /// Set (or clear) the TTL of the rows of `key` matching `record`
    pub fn expire_where(
        &self,
        key: &StoreKey,
        record: &R,
        at: Option<DateTime<Utc>>,
    ) -> Statement {
        let mut params = vec![Param::Timestamp(at), Param::Key(key.to_string())];
        let matches = self.match_clause(record, &mut params);
        Statement {
            sql: format!(
                "UPDATE {} SET {} = ? WHERE {} = ? AND {}",
                self.table,
                quote_identifier(TTL_COLUMN),
                quote_identifier(KEY_COLUMN),
                matches
            ),
            params,
        }
    }

    /// Null-safe equality on every field
    ///
    /// A JSON column only equals a JSON value, so its parameter is cast from
    /// the bound text.
    fn match_clause(&self, record: &R, params: &mut Vec<Param>) -> String {
        self.fields
            .iter()
            .map(|spec| {
                params.push(Param::Field(spec.field_type(), spec.get(record)));
                let column = quote_identifier(spec.column());
                if spec.field_type() == FieldType::Json {
                    format!("{} <=> CAST(? AS JSON)", column)
                } else {
                    format!("{} <=> ?", column)
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn where_clause(&self, spec: &QuerySpec, params: &mut Vec<Param>) -> Result<String> {
        let mut clauses = vec![live_clause()];

        if let Some(key) = &spec.key {
            clauses.push(format!("{} = ?", quote_identifier(KEY_COLUMN)));
            params.push(Param::Key(key.to_string()));
        }

        if let Some(filter) = &spec.filter {
            clauses.push(self.filter_clause(filter, params)?);
        }

        Ok(clauses.join(" AND "))
    }

    fn filter_clause(&self, filter: &Filter, params: &mut Vec<Param>) -> Result<String> {
        let spec = self.field(filter.field())?;
        let field_type = spec.field_type();
        let column = quote_identifier(spec.column());

        let (operator, param) = match filter {
            Filter::Min { cutoff, .. } => (">=", numeric_param(spec, cutoff)?),
            Filter::Max { cutoff, .. } => ("<=", numeric_param(spec, cutoff)?),
            Filter::Equals { value, .. } => ("=", numeric_param(spec, value)?),
            Filter::Is { value, .. } => {
                if field_type != FieldType::Bool {
                    return Err(wrong_filter(spec, "a boolean"));
                }
                ("=", Param::Field(FieldType::Bool, Value::Bool(*value)))
            }
            Filter::Prefix { prefix, .. } => {
                if !field_type.is_text() {
                    return Err(wrong_filter(spec, "a text"));
                }
                params.push(Param::Text(format!("{}%", escape_like(prefix))));
                return Ok(format!("{} LIKE ? ESCAPE '{}'", column, LIKE_ESCAPE));
            }
        };

        params.push(param);
        Ok(format!("{} {} ?", column, operator))
    }

    fn order_clause(&self, sort: Option<&Sort>) -> Result<String> {
        let mut parts = Vec::new();

        if let Some(sort) = sort {
            let column = match self.fields.get(&sort.field) {
                Some(spec) => spec.column().to_string(),
                None if RESERVED_NAMES.contains(&sort.field.as_str()) => {
                    reserved_column(&sort.field)
                }
                None => {
                    return Err(StoreError::validation(format!(
                        "Invalid sort field: '{}'. Must be a record field or one of {}.",
                        sort.field,
                        RESERVED_NAMES.join(", ")
                    )));
                }
            };
            parts.push(format!(
                "{} {}",
                quote_identifier(&column),
                sort.direction.as_sql()
            ));
        }

        // Stable tie-break: creation order, then key
        parts.push(format!("{} ASC", quote_identifier(CREATED_COLUMN)));
        parts.push(format!("{} ASC", quote_identifier(KEY_COLUMN)));

        Ok(format!("ORDER BY {}", parts.join(", ")))
    }

    fn field(&self, name: &str) -> Result<&'a FieldSpec<R>> {
        self.fields
            .get(name)
            .ok_or_else(|| StoreError::validation(format!("Unknown field: '{}'", name)))
    }
}

fn push_page(sql: &mut String, params: &mut Vec<Param>, page: Option<Page>) {
    if let Some(page) = page {
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(Param::Count(u64::from(page.length())));
        params.push(Param::Count(page.offset()));
    }
}

fn numeric_param<R>(spec: &FieldSpec<R>, value: &Value) -> Result<Param> {
    let field_type = spec.field_type();
    if !field_type.is_numeric() {
        return Err(wrong_filter(spec, "a numeric"));
    }
    if value.field_type() != Some(field_type) {
        return Err(TranslationError::mismatch(field_type, value).into());
    }
    Ok(Param::Field(field_type, value.clone()))
}

fn wrong_filter<R>(spec: &FieldSpec<R>, expected: &str) -> StoreError {
    StoreError::validation(format!(
        "Field '{}' of type {} is not {} field",
        spec.name(),
        spec.field_type(),
        expected
    ))
}

/// Escape character of prefix patterns
///
/// Declared in the statement, so matching does not depend on the server's
/// `NO_BACKSLASH_ESCAPES` mode.
const LIKE_ESCAPE: char = '!';

/// Escape LIKE wildcards so a prefix matches literally
fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, LIKE_ESCAPE | '%' | '_') {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}
