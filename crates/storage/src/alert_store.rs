//! Per-tenant Alertmanager configuration stored as JSON at `alerts/<tenant>`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ruler_core::TenantId;

use crate::error::StorageError;

const ALERTS_PREFIX: &str = "alerts";

/// A named notification template shipped alongside the routing config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDesc {
    pub filename: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Overwritten with the owning tenant on write.
    #[serde(default)]
    pub user: String,
    /// Raw Alertmanager YAML, passed through untouched.
    #[serde(default)]
    pub raw_config: String,
    #[serde(default)]
    pub templates: Vec<TemplateDesc>,
}

impl AlertConfig {
    pub fn empty_for(tenant: &TenantId) -> Self {
        Self {
            user: tenant.to_string(),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait AlertConfigStore: Send + Sync {
    async fn list_alert_configs(&self) -> Result<Vec<AlertConfig>, StorageError>;

    /// Stored config for `tenant`, or an empty one when none exists.
    async fn get_alert_config(&self, tenant: &TenantId) -> Result<AlertConfig, StorageError>;

    async fn set_alert_config(
        &self,
        tenant: &TenantId,
        config: &AlertConfig,
    ) -> Result<(), StorageError>;

    async fn delete_alert_config(&self, tenant: &TenantId) -> Result<(), StorageError>;
}

pub struct ObjectAlertStore {
    store: Arc<dyn ObjectStore>,
    root: Path,
}

impl ObjectAlertStore {
    pub fn new(store: Arc<dyn ObjectStore>, root: Path) -> Self {
        Self { store, root }
    }

    fn handle(&self, tenant: &TenantId) -> Path {
        self.root.child(ALERTS_PREFIX).child(tenant.as_str())
    }

    async fn load(&self, path: &Path) -> Result<Option<AlertConfig>, StorageError> {
        match self.store.get(path).await {
            Ok(obj) => {
                let bytes = obj.bytes().await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl AlertConfigStore for ObjectAlertStore {
    async fn list_alert_configs(&self) -> Result<Vec<AlertConfig>, StorageError> {
        let prefix = self.root.child(ALERTS_PREFIX);
        let mut stream = self.store.list(Some(&prefix));
        let mut configs = Vec::new();

        while let Some(meta) = stream.try_next().await? {
            match self.load(&meta.location).await {
                Ok(Some(cfg)) => configs.push(cfg),
                Ok(None) => {}
                Err(StorageError::Json(e)) => {
                    warn!(key = %meta.location, error = %e, "skipping undecodable alert config");
                }
                Err(e) => return Err(e),
            }
        }

        configs.sort_by(|a, b| a.user.cmp(&b.user));
        Ok(configs)
    }

    async fn get_alert_config(&self, tenant: &TenantId) -> Result<AlertConfig, StorageError> {
        Ok(self
            .load(&self.handle(tenant))
            .await?
            .unwrap_or_else(|| AlertConfig::empty_for(tenant)))
    }

    async fn set_alert_config(
        &self,
        tenant: &TenantId,
        config: &AlertConfig,
    ) -> Result<(), StorageError> {
        let mut config = config.clone();
        // The key decides ownership, not the body.
        config.user = tenant.to_string();
        let data = serde_json::to_vec(&config)?;
        let path = self.handle(tenant);
        self.store.put(&path, bytes::Bytes::from(data).into()).await?;
        debug!(tenant = %tenant, "stored alert config");
        Ok(())
    }

    async fn delete_alert_config(&self, tenant: &TenantId) -> Result<(), StorageError> {
        match self.store.delete(&self.handle(tenant)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
