//! Alerting rules and the pending → firing → resolved state machine.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::{Labels, Vector};
use crate::templating::{expand_annotations, AlertTemplateContext};

/// Resolved alerts are kept, and re-sent, for this long.
pub const RESOLVED_RETENTION: Duration = Duration::from_secs(15 * 60);

/// Label carrying the alerting rule name.
pub const ALERT_NAME_LABEL: &str = "alertname";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    /// Not active; a resolved alert sits here until retention expires.
    Inactive,
    /// Condition holds but the `for` duration has not elapsed.
    Pending,
    Firing,
}

/// One alert instance, identified by its label set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub labels: Labels,
    pub annotations: Labels,
    pub state: AlertState,
    pub value: f64,
    pub active_at: DateTime<Utc>,
    pub fired_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn name(&self) -> &str {
        self.labels
            .get(ALERT_NAME_LABEL)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Active alerts of one rule, keyed by label set.
pub type ActiveAlerts = HashMap<Labels, Alert>;

/// Alerting rule definition. Holds no state; the active set is passed in so
/// it can outlive a single evaluation cycle.
#[derive(Debug, Clone)]
pub struct AlertingRule {
    pub name: String,
    pub expr: String,
    pub hold: Duration,
    pub labels: Labels,
    pub annotations: Labels,
}

impl AlertingRule {
    pub fn new(
        name: impl Into<String>,
        expr: impl Into<String>,
        hold: Duration,
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            expr: expr.into(),
            hold,
            labels,
            annotations,
        }
    }

    /// Alert label set for a result series: series labels without `__name__`,
    /// then rule labels, then `alertname`.
    fn alert_labels(&self, series: &Labels) -> Labels {
        let mut labels: Labels = series
            .iter()
            .filter(|(k, _)| k.as_str() != "__name__")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        labels.extend(self.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        labels.insert(ALERT_NAME_LABEL.to_string(), self.name.clone());
        labels
    }

    /// Advance `active` with the result of one evaluation at `ts` and return
    /// every alert that is still tracked, ordered by label set.
    ///
    /// Pending alerts are included; filtering them out is the caller's job.
    pub fn eval(
        &self,
        active: &mut ActiveAlerts,
        result: Vector,
        ts: DateTime<Utc>,
        external_url: &str,
    ) -> Vec<Alert> {
        let mut seen: HashSet<Labels> = HashSet::with_capacity(result.len());

        for sample in result {
            let labels = self.alert_labels(&sample.labels);
            let ctx = AlertTemplateContext {
                labels: &labels,
                value: sample.value,
                external_url,
            };
            let (annotations, errors) = expand_annotations(&self.annotations, &ctx);
            for e in errors {
                warn!(alert = %self.name, error = %e, "annotation template failed");
            }

            if !seen.insert(labels.clone()) {
                warn!(alert = %self.name, "result contains duplicate label sets, keeping the first");
                continue;
            }

            match active.get_mut(&labels) {
                Some(alert) if alert.state != AlertState::Inactive => {
                    alert.value = sample.value;
                    alert.annotations = annotations;
                }
                _ => {
                    active.insert(
                        labels.clone(),
                        Alert {
                            labels,
                            annotations,
                            state: AlertState::Pending,
                            value: sample.value,
                            active_at: ts,
                            fired_at: None,
                            resolved_at: None,
                        },
                    );
                }
            }
        }

        let retention = chrono::Duration::from_std(RESOLVED_RETENTION).unwrap_or(chrono::Duration::zero());
        active.retain(|labels, alert| {
            if seen.contains(labels) {
                return true;
            }
            match alert.state {
                AlertState::Pending => false,
                AlertState::Firing => {
                    alert.state = AlertState::Inactive;
                    alert.resolved_at = Some(ts);
                    true
                }
                AlertState::Inactive => alert
                    .resolved_at
                    .is_some_and(|at| ts.signed_duration_since(at) < retention),
            }
        });

        let hold = chrono::Duration::from_std(self.hold).unwrap_or(chrono::Duration::MAX);
        for alert in active.values_mut() {
            if alert.state == AlertState::Pending && ts.signed_duration_since(alert.active_at) >= hold {
                alert.state = AlertState::Firing;
                alert.fired_at = Some(ts);
            }
        }

        let mut alerts: Vec<Alert> = active.values().cloned().collect();
        alerts.sort_by(|a, b| a.labels.cmp(&b.labels));
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Sample;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn series(instance: &str, value: f64) -> Sample {
        Sample {
            labels: Labels::from([
                ("__name__".into(), "up".into()),
                ("instance".into(), instance.into()),
            ]),
            value,
            timestamp: t(0),
        }
    }

    fn rule(hold_secs: u64) -> AlertingRule {
        AlertingRule::new(
            "InstanceDown",
            "up == 0",
            Duration::from_secs(hold_secs),
            Labels::from([("severity".into(), "page".into())]),
            Labels::from([("summary".into(), "{{ labels.instance }} down".into())]),
        )
    }

    #[test]
    fn labels_drop_name_and_add_alertname() {
        let r = rule(0);
        let mut active = ActiveAlerts::new();
        let alerts = r.eval(&mut active, vec![series("a", 0.0)], t(0), "");
        let labels = &alerts[0].labels;
        assert!(!labels.contains_key("__name__"));
        assert_eq!(labels["alertname"], "InstanceDown");
        assert_eq!(labels["severity"], "page");
        assert_eq!(alerts[0].annotations["summary"], "a down");
        assert_eq!(alerts[0].name(), "InstanceDown");
    }

    #[test]
    fn zero_hold_fires_immediately() {
        let r = rule(0);
        let mut active = ActiveAlerts::new();
        let alerts = r.eval(&mut active, vec![series("a", 0.0)], t(0), "");
        assert_eq!(alerts[0].state, AlertState::Firing);
        assert_eq!(alerts[0].fired_at, Some(t(0)));
    }

    #[test]
    fn pending_until_hold_elapses() {
        let r = rule(60);
        let mut active = ActiveAlerts::new();

        let a = r.eval(&mut active, vec![series("a", 0.0)], t(0), "");
        assert_eq!(a[0].state, AlertState::Pending);

        let a = r.eval(&mut active, vec![series("a", 0.0)], t(30), "");
        assert_eq!(a[0].state, AlertState::Pending);

        let a = r.eval(&mut active, vec![series("a", 0.0)], t(60), "");
        assert_eq!(a[0].state, AlertState::Firing);
        assert_eq!(a[0].active_at, t(0));
        assert_eq!(a[0].fired_at, Some(t(60)));
    }

    #[test]
    fn pending_alert_dropped_when_series_disappears() {
        let r = rule(60);
        let mut active = ActiveAlerts::new();
        r.eval(&mut active, vec![series("a", 0.0)], t(0), "");
        let a = r.eval(&mut active, vec![], t(15), "");
        assert!(a.is_empty());
        assert!(active.is_empty());
    }

    #[test]
    fn firing_alert_resolves_and_is_retained() {
        let r = rule(0);
        let mut active = ActiveAlerts::new();
        r.eval(&mut active, vec![series("a", 0.0)], t(0), "");

        let a = r.eval(&mut active, vec![], t(15), "");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].state, AlertState::Inactive);
        assert_eq!(a[0].resolved_at, Some(t(15)));

        // Still reported within retention.
        let a = r.eval(&mut active, vec![], t(15 + 14 * 60), "");
        assert_eq!(a.len(), 1);

        // Gone after retention.
        let a = r.eval(&mut active, vec![], t(15 + 15 * 60), "");
        assert!(a.is_empty());
    }

    #[test]
    fn resolved_alert_restarts_as_pending_when_series_returns() {
        let r = rule(60);
        let mut active = ActiveAlerts::new();
        r.eval(&mut active, vec![series("a", 0.0)], t(0), "");
        r.eval(&mut active, vec![series("a", 0.0)], t(60), "");
        r.eval(&mut active, vec![], t(75), "");

        let a = r.eval(&mut active, vec![series("a", 0.0)], t(90), "");
        assert_eq!(a[0].state, AlertState::Pending);
        assert_eq!(a[0].active_at, t(90));
        assert_eq!(a[0].resolved_at, None);
    }
}
