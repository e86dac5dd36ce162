//! Plugin-based gateway and store registry
//!
//! The registry lets EPP gateways and registry stores be registered
//! dynamically at runtime, avoiding hardcoded if-else chains in the
//! binaries.
//!
//! ## Building from config
//!
//! ```rust,ignore
//! use regsync_core::registry::GatewayRegistry;
//! use regsync_core::config::GatewayConfig;
//!
//! let registry = GatewayRegistry::new();
//! registry.register_gateway("rest", Box::new(rest_factory));
//!
//! // Later, from deserialized configuration
//! let config = GatewayConfig::Rest { /* ... */ };
//! let gateway = registry.create_gateway(&config).await?;
//! ```
//!
//! ## Self-registration
//!
//! Gateway crates expose a `register` entry point the binaries call at
//! startup:
//!
//! ```rust,ignore
//! # use regsync_core::registry::GatewayRegistry;
//!
//! // In the regsync-gateway-rest crate
//! pub fn register(registry: &GatewayRegistry) {
//!     registry.register_gateway("rest", Box::new(RestGatewayFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::{GatewayConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::traits::{EppGateway, GatewayFactory, RegistryStore, StoreFactory};

/// Registry for plugin-based gateway and store creation
///
/// The registry maintains maps from type names to factory objects,
/// allowing dynamic instantiation from configuration.
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing
/// concurrent reads and exclusive writes. Factories are held behind
/// `Arc` so creation can await without holding a lock.
#[derive(Default)]
pub struct GatewayRegistry {
    /// Registered EPP gateway factories
    gateways: RwLock<HashMap<String, Arc<dyn GatewayFactory>>>,

    /// Registered registry store factories
    stores: RwLock<HashMap<String, Arc<dyn StoreFactory>>>,
}

impl GatewayRegistry {
    /// An empty registry with no factories
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an EPP gateway factory
    ///
    /// # Parameters
    ///
    /// - `name`: Gateway type name (e.g., "rest")
    /// - `factory`: Factory object for creating gateway instances
    pub fn register_gateway(&self, name: impl Into<String>, factory: Box<dyn GatewayFactory>) {
        let name = name.into();
        let mut gateways = self.gateways.write().unwrap();
        gateways.insert(name, Arc::from(factory));
    }

    /// Register a registry store factory
    ///
    /// # Parameters
    ///
    /// - `name`: Store type name (e.g., "file", "memory")
    /// - `factory`: Factory object for creating store instances
    pub fn register_store(&self, name: impl Into<String>, factory: Box<dyn StoreFactory>) {
        let name = name.into();
        let mut stores = self.stores.write().unwrap();
        stores.insert(name, Arc::from(factory));
    }

    /// Create an EPP gateway from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn EppGateway>)`: Created gateway instance
    /// - `Err(Error)`: If the gateway type is not registered or creation fails
    pub async fn create_gateway(&self, config: &GatewayConfig) -> Result<Arc<dyn EppGateway>> {
        let gateway_type = match config {
            GatewayConfig::Rest { .. } => "rest",
            GatewayConfig::Custom { factory, .. } => factory.as_str(),
        };

        // Clone the factory out so no lock is held across the await
        let factory = {
            let gateways = self.gateways.read().unwrap();
            gateways
                .get(gateway_type)
                .ok_or_else(|| Error::config(format!("Unknown gateway type: {}", gateway_type)))?
                .clone()
        };

        factory.create(config).await
    }

    /// Create a registry store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn RegistryStore>)`: Created store instance
    /// - `Err(Error)`: If the store type is not registered or creation fails
    pub async fn create_store(&self, config: &StoreConfig) -> Result<Arc<dyn RegistryStore>> {
        let store_type = match config {
            StoreConfig::Memory => "memory",
            StoreConfig::File { .. } => "file",
            StoreConfig::Custom { factory, .. } => factory.as_str(),
        };

        let factory = {
            let stores = self.stores.read().unwrap();
            stores
                .get(store_type)
                .ok_or_else(|| Error::config(format!("Unknown store type: {}", store_type)))?
                .clone()
        };

        factory.create(config).await
    }

    /// List all registered gateway types
    pub fn list_gateways(&self) -> Vec<String> {
        let gateways = self.gateways.read().unwrap();
        gateways.keys().cloned().collect()
    }

    /// List all registered store types
    pub fn list_stores(&self) -> Vec<String> {
        let stores = self.stores.read().unwrap();
        stores.keys().cloned().collect()
    }

    /// Check if a gateway type is registered
    pub fn has_gateway(&self, name: &str) -> bool {
        let gateways = self.gateways.read().unwrap();
        gateways.contains_key(name)
    }

    /// Check if a store type is registered
    pub fn has_store(&self, name: &str) -> bool {
        let stores = self.stores.read().unwrap();
        stores.contains_key(name)
    }
}

/// Register the built-in store factories.
///
/// Binaries call this once at startup; the REST gateway crate registers
/// its own factory through its `register` function.
pub fn register_builtin_stores(registry: &GatewayRegistry) {
    registry.register_store("memory", Box::new(crate::store::MemoryStoreFactory));
    registry.register_store("file", Box::new(crate::store::FileStoreFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct MockGatewayFactory;

    #[async_trait]
    impl GatewayFactory for MockGatewayFactory {
        async fn create(&self, _config: &GatewayConfig) -> Result<Arc<dyn EppGateway>> {
            Err(Error::config("Mock gateway not implemented"))
        }
    }

    #[test]
    fn registry_registration() {
        let registry = GatewayRegistry::new();
        assert!(!registry.has_gateway("mock"));

        registry.register_gateway("mock", Box::new(MockGatewayFactory));

        assert!(registry.has_gateway("mock"));
        assert!(registry.list_gateways().contains(&"mock".to_string()));
    }

    #[tokio::test]
    async fn builtin_stores_resolve_from_config() {
        let registry = GatewayRegistry::new();
        register_builtin_stores(&registry);

        assert!(registry.has_store("memory"));
        assert!(registry.has_store("file"));

        let store = registry.create_store(&StoreConfig::Memory).await.unwrap();
        assert!(store.list_domains().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_types_are_config_errors() {
        let registry = GatewayRegistry::new();

        let result = registry
            .create_gateway(&GatewayConfig::Custom {
                factory: "nope".to_string(),
                config: serde_json::Value::Null,
            })
            .await;

        assert!(matches!(result, Err(Error::Config(_))));
    }
}
