//! Connection lease provider
//!
//! Owns the single MySQL pool shared by every store of a [`crate::StoreContext`].
//! The pool bounds concurrent leases and the time a caller waits for one.

use std::sync::Arc;

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

/// Shared handle to the connection pool
#[derive(Debug, Clone, Default)]
pub struct ConnectionProvider {
    pool: Arc<RwLock<Option<MySqlPool>>>,
}

impl ConnectionProvider {
    /// Create a provider with no pool installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider around an existing pool
    ///
    /// Use this when you already have a connection pool and want to share it
    /// with the keyed stores.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self {
            pool: Arc::new(RwLock::new(Some(pool))),
        }
    }

    /// Connect a new pool, closing any pool installed before
    pub async fn connect(&self, config: &StoreConfig) -> Result<()> {
        let options = config.connect_options()?;

        let mut slot = self.pool.write().await;
        if let Some(previous) = slot.take() {
            info!("Closing previous connection pool before reconnecting");
            previous.close().await;
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool.max_connections)
            .acquire_timeout(config.pool.acquire_timeout)
            .idle_timeout(config.pool.idle_timeout)
            .max_lifetime(config.pool.max_lifetime)
            .connect_with(options)
            .await
            .map_err(|e| {
                warn!(
                    host = %config.host,
                    database = %config.database,
                    error = %e,
                    "Database connection failed"
                );
                StoreError::connection(format!("Database connection failed: {}", e))
            })?;

        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_connections = config.pool.max_connections,
            "Connection pool ready"
        );
        *slot = Some(pool);
        Ok(())
    }

    /// The installed pool
    ///
    /// `MySqlPool` is a cheap reference-counted handle; callers lease
    /// connections from it with `acquire`.
    pub async fn pool(&self) -> Result<MySqlPool> {
        self.pool.read().await.clone().ok_or(StoreError::NotConnected)
    }

    pub async fn is_connected(&self) -> bool {
        self.pool.read().await.is_some()
    }

    /// Shut the pool down, waiting for leased connections to be returned
    pub async fn close(&self) {
        let pool = self.pool.write().await.take();
        match pool {
            Some(pool) => {
                pool.close().await;
                info!("Connection pool closed");
            }
            None => info!("Connection pool already closed"),
        }
    }
}
