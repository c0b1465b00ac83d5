//! Recording rules: evaluate an expression and store the result as a new series.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::engine::{Labels, Vector};
use crate::error::RuleError;

#[derive(Debug, Clone)]
pub struct RecordingRule {
    pub name: String,
    pub expr: String,
    pub labels: Labels,
}

impl RecordingRule {
    pub fn new(name: impl Into<String>, expr: impl Into<String>, labels: Labels) -> Self {
        Self {
            name: name.into(),
            expr: expr.into(),
            labels,
        }
    }

    /// Rename every sample to the record name, apply the rule labels and
    /// stamp it with `ts`.
    ///
    /// Two samples ending up with the same label set is an error, since the
    /// output would be ambiguous.
    pub fn apply(&self, result: Vector, ts: DateTime<Utc>) -> Result<Vector, RuleError> {
        let mut seen: HashSet<Labels> = HashSet::with_capacity(result.len());
        let mut out = Vec::with_capacity(result.len());
        for mut sample in result {
            sample
                .labels
                .insert("__name__".to_string(), self.name.clone());
            for (k, v) in &self.labels {
                if v.is_empty() {
                    sample.labels.remove(k);
                } else {
                    sample.labels.insert(k.clone(), v.clone());
                }
            }
            if !seen.insert(sample.labels.clone()) {
                return Err(RuleError::InvalidResult {
                    rule: self.name.clone(),
                    message: "vector contains metrics with the same labelset after applying rule labels"
                        .into(),
                });
            }
            sample.timestamp = ts;
            out.push(sample);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Sample;

    fn sample(labels: &[(&str, &str)], value: f64) -> Sample {
        Sample {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
        }
    }

    #[test]
    fn renames_and_relabels() {
        let rule = RecordingRule::new(
            "job:up:sum",
            "sum by (job) (up)",
            Labels::from([("team".into(), "infra".into())]),
        );
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let out = rule
            .apply(vec![sample(&[("__name__", "up"), ("job", "api")], 3.0)], ts)
            .unwrap();
        assert_eq!(out[0].labels["__name__"], "job:up:sum");
        assert_eq!(out[0].labels["team"], "infra");
        assert_eq!(out[0].value, 3.0);
        assert_eq!(out[0].timestamp, ts);
    }

    #[test]
    fn empty_rule_label_removes_series_label() {
        let rule = RecordingRule::new("r", "x", Labels::from([("job".into(), String::new())]));
        let out = rule
            .apply(vec![sample(&[("job", "api"), ("env", "prod")], 1.0)], Utc::now())
            .unwrap();
        assert!(!out[0].labels.contains_key("job"));
    }

    #[test]
    fn collision_after_relabel_is_an_error() {
        let rule = RecordingRule::new("r", "x", Labels::from([("job".into(), "same".into())]));
        let err = rule
            .apply(
                vec![sample(&[("job", "a")], 1.0), sample(&[("job", "b")], 2.0)],
                Utc::now(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("same labelset"));
    }
}
