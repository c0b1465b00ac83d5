//! [`WrappedGroup`]: a decoded rule group bound to its tenant's metrics, an
//! alert-sending closure and a result appender. It is the unit a worker
//! evaluates, and it is owned by that worker for the whole evaluation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use ruler_core::TenantId;

use crate::alert::{Alert, AlertingRule};
use crate::engine::{EvaluationEngine, Pusher};
use crate::error::RuleError;
use crate::metrics::{group_label, TenantMetrics};
use crate::recording::RecordingRule;
use crate::schema::{RuleDesc, RuleGroupDesc};
use crate::state::{AlertStateStore, RuleKey};

/// Called with the rule expression and every tracked alert of one alerting
/// rule after it is evaluated.
pub type NotifyFn = Arc<dyn Fn(&str, Vec<Alert>) + Send + Sync>;

/// Collaborators shared by every group a ruler builds.
#[derive(Clone)]
pub struct GroupDeps {
    pub engine: Arc<dyn EvaluationEngine>,
    pub pusher: Arc<dyn Pusher>,
    pub state: Arc<AlertStateStore>,
    pub external_url: String,
}

enum Rule {
    Recording(RecordingRule),
    Alerting(AlertingRule),
}

impl Rule {
    fn name(&self) -> &str {
        match self {
            Rule::Recording(r) => &r.name,
            Rule::Alerting(r) => &r.name,
        }
    }
}

impl From<&RuleDesc> for Rule {
    fn from(desc: &RuleDesc) -> Self {
        match desc {
            RuleDesc::Recording {
                record,
                expr,
                labels,
            } => Rule::Recording(RecordingRule::new(record, expr, labels.clone())),
            RuleDesc::Alerting {
                alert,
                expr,
                hold,
                labels,
                annotations,
            } => Rule::Alerting(AlertingRule::new(
                alert,
                expr,
                *hold,
                labels.clone(),
                annotations.clone(),
            )),
        }
    }
}

/// Result of one group evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalOutcome {
    pub rules: usize,
    pub failed: usize,
}

pub struct WrappedGroup {
    desc: RuleGroupDesc,
    interval: Duration,
    rules: Vec<Rule>,
    deps: GroupDeps,
    metrics: Arc<TenantMetrics>,
    notify: NotifyFn,
    label: String,
}

impl std::fmt::Debug for WrappedGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedGroup")
            .field("group", &self.desc.key())
            .field("interval", &self.interval)
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl WrappedGroup {
    pub fn new(
        desc: RuleGroupDesc,
        interval: Duration,
        deps: GroupDeps,
        metrics: Arc<TenantMetrics>,
        notify: NotifyFn,
    ) -> Self {
        let rules = desc.rules.iter().map(Rule::from).collect();
        let label = group_label(&desc.namespace, &desc.name);
        Self {
            desc,
            interval,
            rules,
            deps,
            metrics,
            notify,
            label,
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.desc.tenant
    }

    pub fn namespace(&self) -> &str {
        &self.desc.namespace
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn key(&self) -> String {
        self.desc.key()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn desc(&self) -> &RuleGroupDesc {
        &self.desc
    }

    /// Evaluate every rule, strictly in declared order, at `ts`.
    ///
    /// A failing rule is recorded and logged; later rules still run.
    pub async fn eval(&self, ts: DateTime<Utc>) -> EvalOutcome {
        let start = Instant::now();
        let m = &self.metrics;
        m.rules
            .with_label_values(&[self.label.as_str()])
            .set(self.rules.len() as i64);

        let mut outcome = EvalOutcome {
            rules: self.rules.len(),
            failed: 0,
        };

        for (position, rule) in self.rules.iter().enumerate() {
            let rule_start = Instant::now();
            m.evaluations.with_label_values(&[self.label.as_str()]).inc();

            let result = self.eval_rule(position, rule, ts).await;

            m.evaluation_duration
                .with_label_values(&[self.label.as_str()])
                .observe(rule_start.elapsed().as_secs_f64());
            let health = m.rule_health.with_label_values(&[self.label.as_str(), rule.name()]);
            match result {
                Ok(()) => health.set(1),
                Err(e) => {
                    health.set(0);
                    outcome.failed += 1;
                    m.evaluation_failures.with_label_values(&[self.label.as_str()]).inc();
                    warn!(
                        tenant = %self.desc.tenant,
                        namespace = %self.desc.namespace,
                        group = %self.desc.name,
                        rule = rule.name(),
                        error = %e,
                        "rule evaluation failed"
                    );
                }
            }
        }

        let elapsed = start.elapsed();
        m.iterations.with_label_values(&[self.label.as_str()]).inc();
        m.last_evaluation
            .with_label_values(&[self.label.as_str()])
            .set(ts.timestamp_millis() as f64 / 1000.0);
        m.last_duration
            .with_label_values(&[self.label.as_str()])
            .set(elapsed.as_secs_f64());

        debug!(
            tenant = %self.desc.tenant,
            group = %self.key(),
            rules = outcome.rules,
            failed = outcome.failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "group evaluated"
        );
        outcome
    }

    async fn eval_rule(&self, position: usize, rule: &Rule, ts: DateTime<Utc>) -> Result<(), RuleError> {
        let tenant = &self.desc.tenant;
        match rule {
            Rule::Recording(r) => {
                let result = self.deps.engine.query(tenant, &r.expr, ts).await?;
                let samples = r.apply(result, ts)?;
                self.deps.pusher.push(tenant, samples).await?;
            }
            Rule::Alerting(r) => {
                let result = self.deps.engine.query(tenant, &r.expr, ts).await?;
                let key = RuleKey::new(self.key(), position, r.name.as_str());
                let mut active = self.deps.state.take(&key);
                let alerts = r.eval(&mut active, result, ts, &self.deps.external_url);
                self.deps.state.put(key, active);
                if !alerts.is_empty() {
                    (self.notify)(&r.expr, alerts);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertState;
    use crate::engine::{Labels, Sample, Vector};
    use crate::error::EngineError;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Engine that logs every query and returns canned results per expression.
    #[derive(Default)]
    struct ScriptedEngine {
        calls: Mutex<Vec<String>>,
        results: BTreeMap<String, Result<f64, String>>,
    }

    #[async_trait]
    impl EvaluationEngine for ScriptedEngine {
        async fn query(
            &self,
            _tenant: &TenantId,
            expr: &str,
            ts: DateTime<Utc>,
        ) -> Result<Vector, EngineError> {
            self.calls.lock().unwrap().push(expr.to_string());
            match self.results.get(expr) {
                Some(Ok(v)) => Ok(vec![Sample {
                    labels: Labels::from([("job".into(), "api".into())]),
                    value: *v,
                    timestamp: ts,
                }]),
                Some(Err(msg)) => Err(EngineError::Other(msg.clone())),
                None => Ok(vec![]),
            }
        }
    }

    #[derive(Default)]
    struct CollectingPusher {
        pushed: Mutex<Vec<Sample>>,
    }

    #[async_trait]
    impl Pusher for CollectingPusher {
        async fn push(&self, _tenant: &TenantId, samples: Vec<Sample>) -> Result<(), EngineError> {
            self.pushed.lock().unwrap().extend(samples);
            Ok(())
        }
    }

    fn desc(rules: Vec<RuleDesc>) -> RuleGroupDesc {
        RuleGroupDesc {
            tenant: TenantId::new("t1").unwrap(),
            namespace: "ns".into(),
            name: "g1".into(),
            interval: None,
            rules,
        }
    }

    fn recording(name: &str, expr: &str) -> RuleDesc {
        RuleDesc::Recording {
            record: name.into(),
            expr: expr.into(),
            labels: BTreeMap::new(),
        }
    }

    fn alerting(name: &str, expr: &str) -> RuleDesc {
        RuleDesc::Alerting {
            alert: name.into(),
            expr: expr.into(),
            hold: Duration::ZERO,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    struct Harness {
        engine: Arc<ScriptedEngine>,
        pusher: Arc<CollectingPusher>,
        metrics: Arc<TenantMetrics>,
        sent: Arc<Mutex<Vec<(String, Vec<Alert>)>>>,
        state: Arc<AlertStateStore>,
    }

    impl Harness {
        fn new(results: BTreeMap<String, Result<f64, String>>) -> Self {
            Self {
                engine: Arc::new(ScriptedEngine {
                    calls: Mutex::new(Vec::new()),
                    results,
                }),
                pusher: Arc::new(CollectingPusher::default()),
                metrics: Arc::new(TenantMetrics::new(&TenantId::new("t1").unwrap()).unwrap()),
                sent: Arc::new(Mutex::new(Vec::new())),
                state: Arc::new(AlertStateStore::new()),
            }
        }

        fn group(&self, d: RuleGroupDesc) -> WrappedGroup {
            let sent = self.sent.clone();
            let notify: NotifyFn = Arc::new(move |expr: &str, alerts: Vec<Alert>| {
                sent.lock().unwrap().push((expr.to_string(), alerts));
            });
            WrappedGroup::new(
                d,
                Duration::from_secs(15),
                GroupDeps {
                    engine: self.engine.clone(),
                    pusher: self.pusher.clone(),
                    state: self.state.clone(),
                    external_url: "http://ruler.example".into(),
                },
                self.metrics.clone(),
                notify,
            )
        }
    }

    #[tokio::test]
    async fn rules_run_in_declared_order() {
        let h = Harness::new(BTreeMap::from([
            ("up".to_string(), Ok(1.0)),
            ("job:up".to_string(), Ok(1.0)),
        ]));
        let g = h.group(desc(vec![recording("job:up", "up"), recording("job:up:x2", "job:up * 2")]));
        g.eval(Utc::now()).await;
        assert_eq!(*h.engine.calls.lock().unwrap(), vec!["up", "job:up * 2"]);
    }

    #[tokio::test]
    async fn recording_rule_pushes_and_sends_no_alerts() {
        let h = Harness::new(BTreeMap::from([("up".to_string(), Ok(3.0))]));
        let g = h.group(desc(vec![recording("job:up", "up")]));
        let outcome = g.eval(Utc::now()).await;

        assert_eq!(outcome, EvalOutcome { rules: 1, failed: 0 });
        let pushed = h.pusher.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].labels["__name__"], "job:up");
        assert!(h.sent.lock().unwrap().is_empty());
        assert_eq!(h.metrics.iterations.with_label_values(&["ns;g1"]).get(), 1);
    }

    #[tokio::test]
    async fn failing_rule_does_not_stop_the_group() {
        let h = Harness::new(BTreeMap::from([
            ("bad".to_string(), Err("boom".to_string())),
            ("up".to_string(), Ok(1.0)),
        ]));
        let g = h.group(desc(vec![recording("a", "bad"), recording("b", "up")]));
        let outcome = g.eval(Utc::now()).await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(h.engine.calls.lock().unwrap().len(), 2);
        assert_eq!(h.metrics.rule_health.with_label_values(&["ns;g1", "a"]).get(), 0);
        assert_eq!(h.metrics.rule_health.with_label_values(&["ns;g1", "b"]).get(), 1);
        assert_eq!(
            h.metrics.evaluation_failures.with_label_values(&["ns;g1"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn alerting_rule_notifies_and_state_survives_rebuild() {
        let h = Harness::new(BTreeMap::from([("up == 0".to_string(), Ok(0.0))]));

        h.group(desc(vec![alerting("Down", "up == 0")])).eval(Utc::now()).await;
        // A fresh wrapper for the next cycle sees the same alert.
        h.group(desc(vec![alerting("Down", "up == 0")])).eval(Utc::now()).await;

        let sent = h.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "up == 0");
        assert_eq!(sent[1].1[0].state, AlertState::Firing);
        assert_eq!(sent[0].1[0].fired_at, sent[1].1[0].fired_at);
    }
}
