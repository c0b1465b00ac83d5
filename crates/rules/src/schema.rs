//! Persisted rule group model.
//!
//! A [`RuleGroupDesc`] is what the rule store holds under
//! `rules/<tenant>/<namespace>/<name>`. It is stored as a MessagePack blob;
//! nothing outside this module interprets the bytes.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ruler_core::TenantId;

use crate::error::RuleError;

/// A single rule definition, in declared order within its group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleDesc {
    Recording {
        record: String,
        expr: String,
        #[serde(default)]
        labels: BTreeMap<String, String>,
    },
    Alerting {
        alert: String,
        expr: String,
        /// How long the condition must hold before the alert fires.
        #[serde(default)]
        hold: Duration,
        #[serde(default)]
        labels: BTreeMap<String, String>,
        #[serde(default)]
        annotations: BTreeMap<String, String>,
    },
}

impl RuleDesc {
    /// Record name or alert name.
    pub fn name(&self) -> &str {
        match self {
            RuleDesc::Recording { record, .. } => record,
            RuleDesc::Alerting { alert, .. } => alert,
        }
    }

    pub fn expr(&self) -> &str {
        match self {
            RuleDesc::Recording { expr, .. } | RuleDesc::Alerting { expr, .. } => expr,
        }
    }

    pub fn is_alerting(&self) -> bool {
        matches!(self, RuleDesc::Alerting { .. })
    }
}

/// A named, ordered set of rules owned by one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroupDesc {
    pub tenant: TenantId,
    pub namespace: String,
    pub name: String,
    /// Evaluation cadence; `None` means the global evaluation interval.
    #[serde(default)]
    pub interval: Option<Duration>,
    pub rules: Vec<RuleDesc>,
}

impl RuleGroupDesc {
    /// Stable identity string `tenant/namespace/name`.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.tenant, self.namespace, self.name)
    }

    /// Effective interval given the global default.
    pub fn interval_or(&self, default: Duration) -> Duration {
        self.interval.unwrap_or(default)
    }

    pub fn encode(&self) -> Result<Vec<u8>, RuleError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RuleError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_group() -> RuleGroupDesc {
        RuleGroupDesc {
            tenant: TenantId::new("t1").unwrap(),
            namespace: "ns".into(),
            name: "g1".into(),
            interval: Some(Duration::from_secs(30)),
            rules: vec![
                RuleDesc::Recording {
                    record: "job:up:sum".into(),
                    expr: "sum by (job) (up)".into(),
                    labels: BTreeMap::new(),
                },
                RuleDesc::Alerting {
                    alert: "JobDown".into(),
                    expr: "job:up:sum == 0".into(),
                    hold: Duration::from_secs(300),
                    labels: BTreeMap::from([("severity".into(), "page".into())]),
                    annotations: BTreeMap::new(),
                },
            ],
        }
    }

    #[test]
    fn blob_preserves_rule_order_and_fields() {
        let group = sample_group();
        let decoded = RuleGroupDesc::decode(&group.encode().unwrap()).unwrap();
        assert_eq!(decoded, group);
        assert_eq!(decoded.rules[0].name(), "job:up:sum");
        assert!(decoded.rules[1].is_alerting());
    }

    #[test]
    fn garbage_blob_fails_to_decode() {
        assert!(matches!(
            RuleGroupDesc::decode(b"\xc1not msgpack"),
            Err(RuleError::Decode(_))
        ));
    }

    #[test]
    fn interval_falls_back_to_default() {
        let mut group = sample_group();
        assert_eq!(group.interval_or(Duration::from_secs(15)), Duration::from_secs(30));
        group.interval = None;
        assert_eq!(group.interval_or(Duration::from_secs(15)), Duration::from_secs(15));
        assert_eq!(group.key(), "t1/ns/g1");
    }
}
