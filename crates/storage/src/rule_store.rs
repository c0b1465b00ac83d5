//! Rule groups in the object store.
//!
//! Each group is one object at `rules/<tenant>/<namespace>/<name>` holding the
//! encoded [`RuleGroupDesc`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectStore;
use tracing::{debug, warn};

use ruler_core::TenantId;
use ruler_rules::RuleGroupDesc;

use crate::error::StorageError;

const RULES_PREFIX: &str = "rules";

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Every tenant with at least one stored group.
    async fn list_tenants(&self) -> Result<Vec<TenantId>, StorageError>;

    /// Groups of `tenant`, restricted to `namespace` unless it is empty.
    async fn list_rule_groups(
        &self,
        tenant: &TenantId,
        namespace: &str,
    ) -> Result<Vec<RuleGroupDesc>, StorageError>;

    async fn get_rule_group(
        &self,
        tenant: &TenantId,
        namespace: &str,
        name: &str,
    ) -> Result<RuleGroupDesc, StorageError>;

    /// Create or replace the group at its own `(tenant, namespace, name)`.
    async fn set_rule_group(&self, group: &RuleGroupDesc) -> Result<(), StorageError>;

    async fn delete_rule_group(
        &self,
        tenant: &TenantId,
        namespace: &str,
        name: &str,
    ) -> Result<(), StorageError>;
}

/// Reject key segments that would alias another key.
pub(crate) fn check_segment(kind: &'static str, value: &str) -> Result<(), StorageError> {
    if value.is_empty() || value == "." || value == ".." || value.contains('/') {
        return Err(StorageError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// [`RuleStore`] over any [`ObjectStore`].
pub struct ObjectRuleStore {
    store: Arc<dyn ObjectStore>,
    root: Path,
}

impl ObjectRuleStore {
    pub fn new(store: Arc<dyn ObjectStore>, root: Path) -> Self {
        Self { store, root }
    }

    /// `rules/<tenant>/<namespace>/<name>`; trailing parts may be empty to get a prefix.
    fn rule_handle(&self, tenant: &str, namespace: &str, name: &str) -> Path {
        let mut path = self.root.child(RULES_PREFIX);
        for part in [tenant, namespace, name] {
            if part.is_empty() {
                break;
            }
            path = path.child(part);
        }
        path
    }

    async fn load(&self, path: &Path) -> Result<Option<RuleGroupDesc>, StorageError> {
        match self.store.get(path).await {
            Ok(obj) => {
                let bytes = obj.bytes().await?;
                Ok(Some(RuleGroupDesc::decode(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RuleStore for ObjectRuleStore {
    async fn list_tenants(&self) -> Result<Vec<TenantId>, StorageError> {
        let prefix = self.root.child(RULES_PREFIX);
        let listing = self.store.list_with_delimiter(Some(&prefix)).await?;
        let mut tenants: Vec<TenantId> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename())
            .filter_map(|name| match TenantId::new(name) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!(error = %e, "skipping invalid tenant prefix in rule store");
                    None
                }
            })
            .collect();
        tenants.sort();
        Ok(tenants)
    }

    async fn list_rule_groups(
        &self,
        tenant: &TenantId,
        namespace: &str,
    ) -> Result<Vec<RuleGroupDesc>, StorageError> {
        if !namespace.is_empty() {
            check_segment("namespace", namespace)?;
        }
        let prefix = self.rule_handle(tenant.as_str(), namespace, "");
        let mut stream = self.store.list(Some(&prefix));
        let mut groups = Vec::new();

        while let Some(meta) = stream.try_next().await? {
            match self.load(&meta.location).await {
                Ok(Some(group)) => groups.push(group),
                Ok(None) => debug!(key = %meta.location, "group vanished while listing"),
                Err(StorageError::Rule(e)) => {
                    warn!(tenant = %tenant, key = %meta.location, error = %e, "skipping undecodable rule group");
                }
                Err(e) => return Err(e),
            }
        }

        groups.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        Ok(groups)
    }

    async fn get_rule_group(
        &self,
        tenant: &TenantId,
        namespace: &str,
        name: &str,
    ) -> Result<RuleGroupDesc, StorageError> {
        check_segment("namespace", namespace)?;
        check_segment("group name", name)?;
        let path = self.rule_handle(tenant.as_str(), namespace, name);
        self.load(&path)
            .await?
            .ok_or_else(|| StorageError::GroupNotFound {
                tenant: tenant.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn set_rule_group(&self, group: &RuleGroupDesc) -> Result<(), StorageError> {
        check_segment("namespace", &group.namespace)?;
        check_segment("group name", &group.name)?;
        let path = self.rule_handle(group.tenant.as_str(), &group.namespace, &group.name);
        let data = group.encode()?;
        self.store.put(&path, bytes::Bytes::from(data).into()).await?;
        debug!(key = %path, "stored rule group");
        Ok(())
    }

    async fn delete_rule_group(
        &self,
        tenant: &TenantId,
        namespace: &str,
        name: &str,
    ) -> Result<(), StorageError> {
        check_segment("namespace", namespace)?;
        check_segment("group name", name)?;
        let path = self.rule_handle(tenant.as_str(), namespace, name);
        // Not every backend reports deleting a missing key as NotFound.
        match self.store.head(&path).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::GroupNotFound {
                    tenant: tenant.to_string(),
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        }
        self.store.delete(&path).await?;
        Ok(())
    }
}
