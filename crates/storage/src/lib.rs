pub mod alert_store;
pub mod backend;
pub mod error;
pub mod rule_store;

use std::sync::Arc;

use tracing::info;

pub use alert_store::{AlertConfig, AlertConfigStore, ObjectAlertStore, TemplateDesc};
pub use backend::{LocalBackend, S3Backend, StorageBackend};
pub use error::StorageError;
pub use rule_store::{ObjectRuleStore, RuleStore};

/// Config-driven backend with the rule and alert-config stores layered on it.
pub struct RulerStorage {
    pub backend: StorageBackend,
    pub rules: Arc<ObjectRuleStore>,
    pub alerts: Arc<ObjectAlertStore>,
}

impl RulerStorage {
    pub fn from_config(cfg: &ruler_core::config::StoreConfig) -> Result<Self, StorageError> {
        let backend = StorageBackend::from_config(cfg)?;
        Ok(Self::with_backend(backend))
    }

    pub fn with_backend(backend: StorageBackend) -> Self {
        let store = backend.store_arc();
        let root = backend.root();
        info!(remote = backend.is_remote(), prefix = backend.prefix(), "rule storage ready");
        Self {
            rules: Arc::new(ObjectRuleStore::new(store.clone(), root.clone())),
            alerts: Arc::new(ObjectAlertStore::new(store, root)),
            backend,
        }
    }

    /// In-memory storage, handy for tests and single-process setups.
    pub fn in_memory() -> Self {
        Self::with_backend(StorageBackend::Memory(Arc::new(
            object_store::memory::InMemory::new(),
        )))
    }
}
