//! Explicit store context
//!
//! A [`StoreContext`] carries what every store needs: the connection
//! provider, the read-only type registry and store options. Stores are opened
//! from it instead of looking anything up in global state.

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::multi::MultiValueStore;
use crate::pool::ConnectionProvider;
use crate::record::Record;
use crate::registry::TypeRegistry;
use crate::single::SingleValueStore;

/// Shared context for opening namespaced stores
#[derive(Debug, Clone)]
pub struct StoreContext {
    provider: ConnectionProvider,
    registry: Arc<TypeRegistry>,
    ttl_sweep: bool,
}

impl StoreContext {
    /// Create a context over a provider with the built-in type registry
    pub fn new(provider: ConnectionProvider) -> Self {
        Self {
            provider,
            registry: Arc::new(TypeRegistry::with_builtins()),
            ttl_sweep: true,
        }
    }

    /// Connect a new pool from `config` and wrap it in a context
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let provider = ConnectionProvider::new();
        provider.connect(config).await?;
        Ok(Self::new(provider))
    }

    /// Use `registry` for every store opened from this context
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Enable or disable the hourly TTL sweep event (default: enabled)
    ///
    /// Disable it on servers without the event scheduler or the `EVENT`
    /// privilege; expired rows are still hidden from every read.
    pub fn with_ttl_sweep(mut self, enabled: bool) -> Self {
        self.ttl_sweep = enabled;
        self
    }

    pub fn provider(&self) -> &ConnectionProvider {
        &self.provider
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn ttl_sweep(&self) -> bool {
        self.ttl_sweep
    }

    /// Open a single-value store for `namespace`, creating its table if needed
    pub async fn single<R: Record>(&self, namespace: &str) -> Result<SingleValueStore<R>> {
        SingleValueStore::open(self, namespace).await
    }

    /// Open a multi-value store for `namespace`, creating its table if needed
    pub async fn multi<R: Record>(&self, namespace: &str) -> Result<MultiValueStore<R>> {
        MultiValueStore::open(self, namespace).await
    }

    /// Close the shared pool
    pub async fn close(&self) {
        self.provider.close().await;
    }

    pub(crate) fn registry_handle(&self) -> Arc<TypeRegistry> {
        Arc::clone(&self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::types::FieldType;

    #[derive(Debug, Default)]
    struct Flag {
        on: bool,
    }

    crate::record!(Flag { on });

    #[test]
    fn test_context_defaults() {
        let context = StoreContext::new(ConnectionProvider::new());
        assert!(context.ttl_sweep());
        assert!(context.registry().contains(FieldType::Bool));
    }

    #[test]
    fn test_context_options() {
        let context = StoreContext::new(ConnectionProvider::new())
            .with_ttl_sweep(false)
            .with_registry(TypeRegistry::new());
        assert!(!context.ttl_sweep());
        assert!(!context.registry().contains(FieldType::Bool));
    }

    #[tokio::test]
    async fn test_open_store_validates_before_connecting() {
        let context =
            StoreContext::new(ConnectionProvider::new()).with_registry(TypeRegistry::new());
        let err = context.single::<Flag>("flags").await.unwrap_err();
        assert!(matches!(err, StoreError::Translation(_)));

        let context = StoreContext::new(ConnectionProvider::new());
        let err = context.multi::<Flag>("flags").await.unwrap_err();
        assert!(matches!(err, StoreError::NotConnected));
    }
}
