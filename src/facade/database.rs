use crate::config::RegistryConfig;
use crate::core::Result;
use crate::notify::{Broker, Dispatcher};
use crate::query::QueryEngine;
use crate::storage::{MemoryStore, Store};
use crate::transaction::Transaction;
use std::sync::Arc;

/// Shared handle to a store, a notification broker and the configuration.
///
/// Cloning is cheap; every registry built from the same `Database` sees the
/// same tables, row locks and broker.
///
/// # Examples
///
/// ```
/// use entity_registry::Database;
///
/// let db = Database::in_memory();
/// let tx = db.begin();
/// assert!(tx.is_active());
/// ```
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
    engine: QueryEngine,
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }

    /// Memory store, default configuration, no broker.
    pub fn in_memory() -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let config = Arc::new(RegistryConfig::default());
        Self {
            engine: QueryEngine::new(Arc::clone(&store), config),
            store,
            dispatcher: Dispatcher::disabled(),
        }
    }

    /// Opens a transaction; dropping it without commit rolls it back.
    pub fn begin(&self) -> Transaction {
        Transaction::begin(Arc::clone(&self.store))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn config(&self) -> &RegistryConfig {
        self.engine.config()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", self.config())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[derive(Default)]
pub struct DatabaseBuilder {
    store: Option<Arc<dyn Store>>,
    broker: Option<Arc<dyn Broker>>,
    config: RegistryConfig,
}

impl DatabaseBuilder {
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Database> {
        self.config.validate()?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn Store>);
        let dispatcher = match self.broker {
            Some(broker) => Dispatcher::new(broker),
            None => Dispatcher::disabled(),
        };
        tracing::debug!(
            notifications = dispatcher.is_enabled(),
            max_page_size = self.config.max_page_size,
            "database opened"
        );
        Ok(Database {
            engine: QueryEngine::new(Arc::clone(&store), Arc::new(self.config)),
            store,
            dispatcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryBroker;

    #[test]
    fn test_builder_validates_config() {
        let err = Database::builder()
            .config(RegistryConfig::new().max_page_size(0))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::Validation);
    }

    #[test]
    fn test_builder_wires_broker() {
        let db = Database::builder()
            .broker(Arc::new(MemoryBroker::default()))
            .build()
            .unwrap();
        assert!(db.dispatcher().is_enabled());
        assert!(!Database::in_memory().dispatcher().is_enabled());
    }
}
