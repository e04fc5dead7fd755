//! Namespaced single-value store
//!
//! One record per key. The key is the primary key of the namespace table, so
//! the database enforces uniqueness.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use crate::context::StoreContext;
use crate::engine::{Entry, QueryEngine, TableKind};
use crate::error::{Result, StoreError};
use crate::record::Record;
use crate::sql::query::QuerySpec;
use crate::types::StoreKey;

/// Store holding at most one record per key
///
/// Cloning is cheap; clones share the same engine and pool.
#[derive(Debug)]
pub struct SingleValueStore<R> {
    engine: Arc<QueryEngine<R>>,
}

impl<R> Clone for SingleValueStore<R> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<R: Record> SingleValueStore<R> {
    /// Open the store, creating the namespace table and TTL sweep if needed
    pub async fn open(context: &StoreContext, namespace: &str) -> Result<Self> {
        let engine = QueryEngine::new(
            namespace,
            context.provider().clone(),
            context.registry_handle(),
        )?;
        engine
            .create_schema(TableKind::Single, context.ttl_sweep())
            .await?;
        Ok(Self {
            engine: Arc::new(engine),
        })
    }

    pub fn namespace(&self) -> &str {
        self.engine.namespace()
    }

    /// Insert a record under a new key
    ///
    /// A row left behind by an expired TTL does not block the insert. Fails
    /// with [`StoreError::Conflict`] when a live record already holds the key.
    pub async fn create(&self, key: impl Into<StoreKey>, record: &R) -> Result<()> {
        let key = key.into();
        let statements = self.engine.statements()?;
        self.engine.execute(statements.purge_expired(&key)).await?;
        self.engine.execute(statements.insert(&key, record)).await?;
        Ok(())
    }

    /// The live record of `key`
    pub async fn get(&self, key: impl Into<StoreKey>) -> Result<Option<R>> {
        Ok(self.get_entry(key).await?.map(|entry| entry.record))
    }

    /// The live record of `key` with its timestamps
    pub async fn get_entry(&self, key: impl Into<StoreKey>) -> Result<Option<Entry<R>>> {
        let spec = QuerySpec::new().key(key);
        let statement = self.engine.statements()?.select(&spec)?;
        self.engine.fetch_optional(statement).await
    }

    pub async fn exists(&self, key: impl Into<StoreKey>) -> Result<bool> {
        Ok(self.get_entry(key).await?.is_some())
    }

    /// Overwrite every field of the live record of `key`
    ///
    /// Returns `false` when no live record exists.
    pub async fn update(&self, key: impl Into<StoreKey>, record: &R) -> Result<bool> {
        let key = key.into();
        let statement = self.engine.statements()?.update(&key, record);
        Ok(self.engine.execute(statement).await? > 0)
    }

    /// Remove the record of `key`, live or expired
    pub async fn delete(&self, key: impl Into<StoreKey>) -> Result<bool> {
        let key = key.into();
        let statement = self.engine.statements()?.delete(&key);
        Ok(self.engine.execute(statement).await? > 0)
    }

    /// Expire the record of `key` at `at`
    pub async fn expire(&self, key: impl Into<StoreKey>, at: DateTime<Utc>) -> Result<bool> {
        self.set_ttl(key.into(), Some(at)).await
    }

    /// Expire the record of `key` after `ttl`
    pub async fn expire_in(&self, key: impl Into<StoreKey>, ttl: Duration) -> Result<bool> {
        self.set_ttl(key.into(), Some(Utc::now() + ttl)).await
    }

    /// Clear the TTL of `key` so the record never expires
    pub async fn persist(&self, key: impl Into<StoreKey>) -> Result<bool> {
        self.set_ttl(key.into(), None).await
    }

    async fn set_ttl(&self, key: StoreKey, at: Option<DateTime<Utc>>) -> Result<bool> {
        let statement = self.engine.statements()?.expire(&key, at);
        Ok(self.engine.execute(statement).await? > 0)
    }

    /// The existing record of `key`, or `record` after creating it
    ///
    /// An existing record always wins; `record` is discarded. The read and
    /// the create are separate round trips: losing a concurrent create is
    /// recovered by reading the winner.
    pub async fn get_or_create(&self, key: impl Into<StoreKey>, record: &R) -> Result<R> {
        let key = key.into();
        if let Some(existing) = self.get(&key).await? {
            return Ok(existing);
        }

        match self.create(&key, record).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                warn!(
                    namespace = %self.namespace(),
                    key = %key,
                    "Concurrent create, reading existing record"
                );
            }
            Err(e) => return Err(e),
        }

        self.get(&key).await?.ok_or_else(|| {
            StoreError::conflict(format!("Record '{}' was removed while being created", key))
        })
    }

    /// Update the record of `key`, or create it when absent
    ///
    /// Not atomic: a create that collides with a concurrent one falls back to
    /// a single update retry.
    pub async fn create_or_update(&self, key: impl Into<StoreKey>, record: &R) -> Result<()> {
        let key = key.into();
        if self.update(&key, record).await? {
            return Ok(());
        }

        match self.create(&key, record).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_conflict() => {
                warn!(
                    namespace = %self.namespace(),
                    key = %key,
                    "Concurrent create, retrying update"
                );
                if self.update(&key, record).await? {
                    Ok(())
                } else {
                    Err(e)
                }
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Listing and Aggregates
    // =========================================================================

    /// Live records matching `spec`
    pub async fn list(&self, spec: &QuerySpec) -> Result<Vec<Entry<R>>> {
        let statement = self.engine.statements()?.select(spec)?;
        self.engine.fetch_entries(statement).await
    }

    /// Keys of live records matching `spec`
    pub async fn keys(&self, spec: &QuerySpec) -> Result<Vec<StoreKey>> {
        let statement = self.engine.statements()?.keys(spec)?;
        self.engine.fetch_keys(statement).await
    }

    /// Number of live records matching `spec`
    pub async fn count(&self, spec: &QuerySpec) -> Result<u64> {
        let statement = self.engine.statements()?.count(spec)?;
        self.engine.fetch_count(statement).await
    }

    /// Number of distinct keys among live records matching `spec`
    pub async fn count_distinct(&self, spec: &QuerySpec) -> Result<u64> {
        let statement = self.engine.statements()?.count_distinct(spec)?;
        self.engine.fetch_count(statement).await
    }

    /// Sum of a numeric field over live records matching `spec`, zero when none match
    pub async fn sum(&self, field: &str, spec: &QuerySpec) -> Result<Decimal> {
        let (statement, field_type) = self.engine.statements()?.sum(field, spec)?;
        self.engine.fetch_sum(statement, field_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ConnectionProvider;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Session {
        user: String,
        visits: i32,
    }

    crate::record!(Session { user, visits });

    #[tokio::test]
    async fn test_open_requires_connection() {
        let context = StoreContext::new(ConnectionProvider::new());
        let err = SingleValueStore::<Session>::open(&context, "sessions")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotConnected));
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_namespace() {
        let context = StoreContext::new(ConnectionProvider::new());
        let err = SingleValueStore::<Session>::open(&context, "bad namespace!")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
