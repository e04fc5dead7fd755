//! Statement execution for one namespace
//!
//! The engine renders statements through [`StatementBuilder`], leases a
//! connection from the [`ConnectionProvider`], binds every parameter through
//! the [`TypeRegistry`] and marshals result rows back into records.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::mysql::MySqlRow;
use tracing::{debug, error, info};

use crate::error::{Result, StoreError};
use crate::pool::ConnectionProvider;
use crate::record::{FieldMap, Record};
use crate::registry::{MySqlQuery, TypeRegistry};
use crate::sql::ddl::DdlGenerator;
use crate::sql::naming::{CREATED_COLUMN, KEY_COLUMN, TTL_COLUMN, UPDATED_COLUMN, table_name};
use crate::sql::query::{Param, Statement, StatementBuilder};
use crate::types::{FieldType, StoreKey, validate_key};

/// A stored record with its reserved columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<R> {
    pub key: StoreKey,
    pub record: R,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `None` when the row never expires
    pub expires_at: Option<DateTime<Utc>>,
}

/// Backing table layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// One row per key, key is the primary key
    Single,
    /// Any number of rows per key, key is indexed
    Multi,
}

/// Query engine bound to one namespace and record type
#[derive(Debug)]
pub struct QueryEngine<R> {
    namespace: String,
    table: String,
    provider: ConnectionProvider,
    registry: Arc<TypeRegistry>,
    fields: FieldMap<R>,
}

impl<R: Record> QueryEngine<R> {
    /// Build the field map of `R` and check it against the registry
    ///
    /// Fails on an invalid namespace or a field type without a translation.
    pub fn new(
        namespace: impl Into<String>,
        provider: ConnectionProvider,
        registry: Arc<TypeRegistry>,
    ) -> Result<Self> {
        let namespace = namespace.into();
        let fields = FieldMap::<R>::of()?;
        fields.verify(&registry)?;
        StatementBuilder::new(&namespace, &fields)?;

        Ok(Self {
            table: table_name(&namespace),
            namespace,
            provider,
            registry,
            fields,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn fields(&self) -> &FieldMap<R> {
        &self.fields
    }

    /// Statement builder over this namespace
    pub fn statements(&self) -> Result<StatementBuilder<'_, R>> {
        StatementBuilder::new(&self.namespace, &self.fields)
    }

    // =========================================================================
    // Schema
    // =========================================================================

    /// Create the backing table, and the hourly TTL sweep when `ttl_sweep` is set
    ///
    /// Both statements are idempotent.
    pub async fn create_schema(&self, kind: TableKind, ttl_sweep: bool) -> Result<()> {
        let generator = DdlGenerator::new(&self.registry);
        let table_ddl = match kind {
            TableKind::Single => generator.create_table(&self.namespace, &self.fields)?,
            TableKind::Multi => generator.create_multi_table(&self.namespace, &self.fields)?,
        };
        self.execute_ddl(&table_ddl).await?;

        if ttl_sweep {
            let event_ddl = generator.create_ttl_event(&self.namespace)?;
            self.execute_ddl(&event_ddl).await?;
        }

        info!(
            namespace = %self.namespace,
            table = %self.table,
            ?kind,
            ttl_sweep,
            "Namespace table ready"
        );
        Ok(())
    }

    /// DDL runs over the text protocol; MySQL cannot prepare `CREATE EVENT`
    async fn execute_ddl(&self, ddl: &str) -> Result<()> {
        debug!(namespace = %self.namespace, sql = %ddl, "Executing DDL");
        let pool = self.provider.pool().await?;
        let mut conn = pool.acquire().await.map_err(|e| self.failure(e))?;
        sqlx::raw_sql(ddl)
            .execute(&mut *conn)
            .await
            .map_err(|e| self.failure(e))?;
        Ok(())
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Rows of a SELECT, marshalled into entries
    pub async fn fetch_entries(&self, statement: Statement) -> Result<Vec<Entry<R>>> {
        self.fetch_all(statement)
            .await?
            .iter()
            .map(|row| self.entry(row))
            .collect()
    }

    /// First row of a SELECT, if any
    pub async fn fetch_optional(&self, statement: Statement) -> Result<Option<Entry<R>>> {
        let query = self.bind(&statement.sql, statement.params)?;
        let pool = self.provider.pool().await?;
        let mut conn = pool.acquire().await.map_err(|e| self.failure(e))?;
        debug!(namespace = %self.namespace, sql = %statement.sql, "Executing query");

        let row = query
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| self.failure(e))?;
        row.as_ref().map(|row| self.entry(row)).transpose()
    }

    /// Keys from a `SELECT DISTINCT` key statement
    pub async fn fetch_keys(&self, statement: Statement) -> Result<Vec<StoreKey>> {
        self.fetch_all(statement)
            .await?
            .iter()
            .map(|row| {
                row.try_get::<String, _>(0)
                    .map(StoreKey::from)
                    .map_err(|e| self.failure(e))
            })
            .collect()
    }

    /// Single BIGINT result of a COUNT statement
    pub async fn fetch_count(&self, statement: Statement) -> Result<u64> {
        let row = self.fetch_one(statement).await?;
        let count: i64 = row.try_get(0).map_err(|e| self.failure(e))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Single result of a SUM statement over a field of `field_type`
    ///
    /// Integer and decimal sums are exact DECIMAL values; float sums are
    /// DOUBLE.
    pub async fn fetch_sum(&self, statement: Statement, field_type: FieldType) -> Result<Decimal> {
        let row = self.fetch_one(statement).await?;

        if field_type.is_float() {
            let total: f64 = row.try_get(0).map_err(|e| self.failure(e))?;
            Decimal::from_f64_retain(total).ok_or_else(|| {
                StoreError::validation(format!("Sum {} is not representable as a decimal", total))
            })
        } else {
            row.try_get::<Decimal, _>(0).map_err(|e| self.failure(e))
        }
    }

    /// Run a mutation, returning the number of rows affected
    pub async fn execute(&self, statement: Statement) -> Result<u64> {
        let query = self.bind(&statement.sql, statement.params)?;
        let pool = self.provider.pool().await?;
        let mut conn = pool.acquire().await.map_err(|e| self.failure(e))?;
        debug!(namespace = %self.namespace, sql = %statement.sql, "Executing statement");

        let result = query
            .execute(&mut *conn)
            .await
            .map_err(|e| self.failure(e))?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&self, statement: Statement) -> Result<Vec<MySqlRow>> {
        let query = self.bind(&statement.sql, statement.params)?;
        let pool = self.provider.pool().await?;
        let mut conn = pool.acquire().await.map_err(|e| self.failure(e))?;
        debug!(namespace = %self.namespace, sql = %statement.sql, "Executing query");

        query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| self.failure(e))
    }

    async fn fetch_one(&self, statement: Statement) -> Result<MySqlRow> {
        let query = self.bind(&statement.sql, statement.params)?;
        let pool = self.provider.pool().await?;
        let mut conn = pool.acquire().await.map_err(|e| self.failure(e))?;
        debug!(namespace = %self.namespace, sql = %statement.sql, "Executing query");

        query
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| self.failure(e))
    }

    fn bind<'q>(&self, sql: &'q str, params: Vec<Param>) -> Result<MySqlQuery<'q>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Param::Key(key) => {
                    validate_key(&key)?;
                    query.bind(key)
                }
                Param::Field(field_type, value) => self.registry.bind(field_type, query, value)?,
                Param::Text(text) => query.bind(text),
                Param::Timestamp(at) => query.bind(at),
                Param::Count(n) => query.bind(n),
            };
        }
        Ok(query)
    }

    fn entry(&self, row: &MySqlRow) -> Result<Entry<R>> {
        let key: String = row.try_get(KEY_COLUMN).map_err(|e| self.failure(e))?;
        let created_at = row.try_get(CREATED_COLUMN).map_err(|e| self.failure(e))?;
        let updated_at = row.try_get(UPDATED_COLUMN).map_err(|e| self.failure(e))?;
        let expires_at = row.try_get(TTL_COLUMN).map_err(|e| self.failure(e))?;

        let mut values = Vec::with_capacity(self.fields.len());
        for spec in self.fields.iter() {
            values.push(self.registry.read(spec.field_type(), row, spec.column())?);
        }
        let record = self.fields.assemble(values)?;

        Ok(Entry {
            key: StoreKey::from(key),
            record,
            created_at,
            updated_at,
            expires_at,
        })
    }

    /// Classify and log a driver error
    fn failure(&self, err: sqlx::Error) -> StoreError {
        let err = StoreError::from_sqlx(err);
        if err.is_conflict() {
            debug!(namespace = %self.namespace, error = %err, "Key already present");
        } else {
            error!(
                namespace = %self.namespace,
                table = %self.table,
                error = %err,
                "Statement failed"
            );
        }
        err
    }
}
