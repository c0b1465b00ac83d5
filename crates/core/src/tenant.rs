//! Tenant identity.
//!
//! Every rule group, metric set and notifier is partitioned by [`TenantId`].
//! The id travels on outbound HTTP requests in the [`ORG_ID_HEADER`] header.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// HTTP header carrying the tenant id on every tenant-scoped request.
pub const ORG_ID_HEADER: &str = "X-Scope-OrgID";

/// Opaque tenant identifier.
///
/// Must be non-empty and must not contain `/`, since it is used as a key
/// segment in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() || id.contains('/') || id.trim() != id {
            return Err(CoreError::InvalidTenant(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for TenantId {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::str::FromStr for TenantId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_ids() {
        let t = TenantId::new("team-a").unwrap();
        assert_eq!(t.as_str(), "team-a");
        assert_eq!(t.to_string(), "team-a");
    }

    #[test]
    fn rejects_empty_and_slashes() {
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("a/b").is_err());
        assert!(TenantId::new(" padded ").is_err());
    }

    #[test]
    fn serializes_as_bare_string() {
        let t = TenantId::new("t1").unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"t1\"");
    }
}
