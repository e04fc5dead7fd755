//! Namespaced multi-value store
//!
//! Any number of records per key. The key column carries a plain index, and
//! a specific member of a group is addressed by its full set of field values.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::context::StoreContext;
use crate::engine::{Entry, QueryEngine, TableKind};
use crate::error::Result;
use crate::record::Record;
use crate::sql::query::QuerySpec;
use crate::types::StoreKey;

/// Store holding a group of records per key
///
/// Cloning is cheap; clones share the same engine and pool.
#[derive(Debug)]
pub struct MultiValueStore<R> {
    engine: Arc<QueryEngine<R>>,
}

impl<R> Clone for MultiValueStore<R> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<R: Record> MultiValueStore<R> {
    /// Open the store, creating the namespace table and TTL sweep if needed
    pub async fn open(context: &StoreContext, namespace: &str) -> Result<Self> {
        let engine = QueryEngine::new(
            namespace,
            context.provider().clone(),
            context.registry_handle(),
        )?;
        engine
            .create_schema(TableKind::Multi, context.ttl_sweep())
            .await?;
        Ok(Self {
            engine: Arc::new(engine),
        })
    }

    pub fn namespace(&self) -> &str {
        self.engine.namespace()
    }

    /// Add a record to the group of `key`
    ///
    /// Always inserts a new row, even when an identical record is present.
    pub async fn add(&self, key: impl Into<StoreKey>, record: &R) -> Result<()> {
        let statement = self.engine.statements()?.insert(&key.into(), record);
        self.engine.execute(statement).await?;
        Ok(())
    }

    /// Every live record of `key`, in creation order
    pub async fn get(&self, key: impl Into<StoreKey>) -> Result<Vec<R>> {
        self.get_with(key, QuerySpec::new()).await
    }

    /// Live records of `key` matching `spec`
    ///
    /// The key scope of `spec` is replaced by `key`.
    pub async fn get_with(&self, key: impl Into<StoreKey>, spec: QuerySpec) -> Result<Vec<R>> {
        let entries = self.list(&spec.key(key)).await?;
        Ok(entries.into_iter().map(|entry| entry.record).collect())
    }

    /// Every live record of `key` with its timestamps
    pub async fn entries(&self, key: impl Into<StoreKey>) -> Result<Vec<Entry<R>>> {
        self.list(&QuerySpec::new().key(key)).await
    }

    /// Live records of the namespace matching `spec`
    pub async fn list(&self, spec: &QuerySpec) -> Result<Vec<Entry<R>>> {
        let statement = self.engine.statements()?.select(spec)?;
        self.engine.fetch_entries(statement).await
    }

    /// Remove the rows of `key` whose fields all equal those of `record`
    ///
    /// Returns the number of rows removed.
    pub async fn delete(&self, key: impl Into<StoreKey>, record: &R) -> Result<u64> {
        let statement = self.engine.statements()?.delete_where(&key.into(), record);
        self.engine.execute(statement).await
    }

    /// Remove every row of `key`, live or expired
    pub async fn delete_all(&self, key: impl Into<StoreKey>) -> Result<u64> {
        let statement = self.engine.statements()?.delete(&key.into());
        self.engine.execute(statement).await
    }

    /// Expire the rows of `key` matching `record` at `at`
    pub async fn expire(
        &self,
        key: impl Into<StoreKey>,
        record: &R,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let statement = self
            .engine
            .statements()?
            .expire_where(&key.into(), record, Some(at));
        self.engine.execute(statement).await
    }

    /// Clear the TTL of the rows of `key` matching `record`
    pub async fn persist(&self, key: impl Into<StoreKey>, record: &R) -> Result<u64> {
        let statement = self
            .engine
            .statements()?
            .expire_where(&key.into(), record, None);
        self.engine.execute(statement).await
    }

    /// Expire every row of `key` at `at`
    pub async fn expire_all(&self, key: impl Into<StoreKey>, at: DateTime<Utc>) -> Result<u64> {
        let statement = self.engine.statements()?.expire(&key.into(), Some(at));
        self.engine.execute(statement).await
    }

    // =========================================================================
    // Keys and Aggregates
    // =========================================================================

    /// Distinct keys owning live records matching `spec`
    pub async fn keys(&self, spec: &QuerySpec) -> Result<Vec<StoreKey>> {
        let statement = self.engine.statements()?.keys(spec)?;
        self.engine.fetch_keys(statement).await
    }

    /// Number of live rows matching `spec`
    pub async fn count(&self, spec: &QuerySpec) -> Result<u64> {
        let statement = self.engine.statements()?.count(spec)?;
        self.engine.fetch_count(statement).await
    }

    /// Number of distinct keys among live rows matching `spec`
    pub async fn count_distinct(&self, spec: &QuerySpec) -> Result<u64> {
        let statement = self.engine.statements()?.count_distinct(spec)?;
        self.engine.fetch_count(statement).await
    }

    /// Sum of a numeric field over live rows matching `spec`, zero when none match
    pub async fn sum(&self, field: &str, spec: &QuerySpec) -> Result<Decimal> {
        let (statement, field_type) = self.engine.statements()?.sum(field, spec)?;
        self.engine.fetch_sum(statement, field_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::pool::ConnectionProvider;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Tag {
        label: String,
    }

    crate::record!(Tag { label });

    #[tokio::test]
    async fn test_open_requires_connection() {
        let context = StoreContext::new(ConnectionProvider::new()).with_ttl_sweep(false);
        let err = MultiValueStore::<Tag>::open(&context, "tags").await.unwrap_err();
        assert!(matches!(err, StoreError::NotConnected));
    }
}
