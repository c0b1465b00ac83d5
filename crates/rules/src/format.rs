//! Prometheus-style YAML rule files.
//!
//! ```yaml
//! groups:
//!   - name: example
//!     interval: 1m
//!     rules:
//!       - record: job:up:sum
//!         expr: sum by (job) (up)
//!       - alert: JobDown
//!         expr: job:up:sum == 0
//!         for: 5m
//!         labels: { severity: page }
//!         annotations: { summary: "{{ labels.job }} is down" }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ruler_core::duration::serde_opt_duration;
use ruler_core::TenantId;

use crate::error::RuleError;
use crate::schema::{RuleDesc, RuleGroupDesc};
use crate::validation::validate_groups_file;

/// Top-level document: a list of groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleGroupsFile {
    #[serde(default)]
    pub groups: Vec<RuleGroupFormat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroupFormat {
    pub name: String,
    #[serde(default, with = "serde_opt_duration", skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
    #[serde(default)]
    pub rules: Vec<RuleFormat>,
}

/// One rule as written in YAML; exactly one of `record` / `alert` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    pub expr: String,
    #[serde(
        default,
        rename = "for",
        with = "serde_opt_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub hold: Option<Duration>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl RuleGroupsFile {
    /// Parse and validate a YAML rule file.
    pub fn parse(yaml: &str) -> Result<Self, RuleError> {
        let file: RuleGroupsFile = serde_yaml::from_str(yaml)?;
        let result = validate_groups_file(&file);
        if !result.valid {
            return Err(RuleError::Validation(
                result
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.path, e.message))
                    .collect(),
            ));
        }
        Ok(file)
    }

    pub fn to_yaml(&self) -> Result<String, RuleError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl RuleGroupFormat {
    /// Bind the group to a tenant and namespace.
    ///
    /// Assumes the group has been validated; a rule with neither `record` nor
    /// `alert` is reported as a validation error.
    pub fn into_desc(self, tenant: &TenantId, namespace: &str) -> Result<RuleGroupDesc, RuleError> {
        let mut rules = Vec::with_capacity(self.rules.len());
        for (i, rule) in self.rules.into_iter().enumerate() {
            rules.push(rule.into_desc().ok_or_else(|| {
                RuleError::Validation(vec![format!(
                    "groups.{}.rules[{i}]: one of 'record' or 'alert' must be set",
                    self.name
                )])
            })?);
        }
        Ok(RuleGroupDesc {
            tenant: tenant.clone(),
            namespace: namespace.to_string(),
            name: self.name,
            interval: self.interval,
            rules,
        })
    }

    pub fn from_desc(desc: &RuleGroupDesc) -> Self {
        Self {
            name: desc.name.clone(),
            interval: desc.interval,
            rules: desc.rules.iter().map(RuleFormat::from_desc).collect(),
        }
    }
}

impl RuleFormat {
    fn into_desc(self) -> Option<RuleDesc> {
        match (self.record, self.alert) {
            (Some(record), None) => Some(RuleDesc::Recording {
                record,
                expr: self.expr,
                labels: self.labels,
            }),
            (None, Some(alert)) => Some(RuleDesc::Alerting {
                alert,
                expr: self.expr,
                hold: self.hold.unwrap_or_default(),
                labels: self.labels,
                annotations: self.annotations,
            }),
            _ => None,
        }
    }

    fn from_desc(desc: &RuleDesc) -> Self {
        match desc {
            RuleDesc::Recording {
                record,
                expr,
                labels,
            } => Self {
                record: Some(record.clone()),
                expr: expr.clone(),
                labels: labels.clone(),
                ..Self::default()
            },
            RuleDesc::Alerting {
                alert,
                expr,
                hold,
                labels,
                annotations,
            } => Self {
                alert: Some(alert.clone()),
                expr: expr.clone(),
                hold: (!hold.is_zero()).then_some(*hold),
                labels: labels.clone(),
                annotations: annotations.clone(),
                ..Self::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"
groups:
  - name: example
    interval: 1m
    rules:
      - record: job:up:sum
        expr: sum by (job) (up)
      - alert: JobDown
        expr: job:up:sum == 0
        for: 5m
        labels:
          severity: page
        annotations:
          summary: "{{ labels.job }} is down"
  - name: defaults
    rules:
      - record: instance:cpu:rate5m
        expr: rate(cpu[5m])
"#;

    #[test]
    fn parses_groups_and_rules() {
        let file = RuleGroupsFile::parse(RULES).unwrap();
        assert_eq!(file.groups.len(), 2);
        let g = &file.groups[0];
        assert_eq!(g.interval, Some(Duration::from_secs(60)));
        assert_eq!(g.rules[1].hold, Some(Duration::from_secs(300)));
        assert_eq!(file.groups[1].interval, None);
    }

    #[test]
    fn into_desc_binds_tenant_and_namespace() {
        let file = RuleGroupsFile::parse(RULES).unwrap();
        let tenant = TenantId::new("t1").unwrap();
        let desc = file.groups[0].clone().into_desc(&tenant, "team-a").unwrap();
        assert_eq!(desc.key(), "t1/team-a/example");
        assert_eq!(desc.rules.len(), 2);
        match &desc.rules[1] {
            RuleDesc::Alerting { hold, labels, .. } => {
                assert_eq!(*hold, Duration::from_secs(300));
                assert_eq!(labels["severity"], "page");
            }
            other => panic!("expected alerting rule, got {other:?}"),
        }

        let back = RuleGroupFormat::from_desc(&desc);
        assert_eq!(back, file.groups[0]);
    }

    #[test]
    fn invalid_file_is_rejected_with_paths() {
        let yaml = r#"
groups:
  - name: bad
    rules:
      - record: ok:metric
        alert: AlsoAlert
        expr: up
"#;
        let err = RuleGroupsFile::parse(yaml).unwrap_err();
        match err {
            RuleError::Validation(errs) => {
                assert!(errs.iter().any(|e| e.contains("groups[0].rules[0]")));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn malformed_duration_is_a_parse_error() {
        let yaml = "groups:\n  - name: g\n    interval: soon\n    rules: []\n";
        assert!(matches!(RuleGroupsFile::parse(yaml), Err(RuleError::Parse(_))));
    }
}
