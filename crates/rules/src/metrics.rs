//! Per-tenant rule evaluation metrics.
//!
//! Every metric carries a constant `user` label with the tenant id; group
//! metrics are further split by `rule_group` (`namespace;name`).

use prometheus::{
    GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
};

use ruler_core::TenantId;

const GROUP_LABELS: &[&str] = &["rule_group"];
const RULE_LABELS: &[&str] = &["rule_group", "rule"];

/// Metrics set bound to one tenant.
#[derive(Clone)]
pub struct TenantMetrics {
    pub evaluations: IntCounterVec,
    pub evaluation_failures: IntCounterVec,
    pub evaluation_duration: HistogramVec,
    pub iterations: IntCounterVec,
    pub last_evaluation: GaugeVec,
    pub last_duration: GaugeVec,
    pub rules: IntGaugeVec,
    /// 1 when the rule's last evaluation succeeded, 0 otherwise.
    pub rule_health: IntGaugeVec,
}

impl TenantMetrics {
    pub fn new(tenant: &TenantId) -> Result<Self, prometheus::Error> {
        let user = tenant.as_str();
        let opts = |name: &str, help: &str| Opts::new(name, help).const_label("user", user);

        Ok(Self {
            evaluations: IntCounterVec::new(
                opts("rule_evaluations_total", "The total number of rule evaluations."),
                GROUP_LABELS,
            )?,
            evaluation_failures: IntCounterVec::new(
                opts(
                    "rule_evaluation_failures_total",
                    "The total number of rule evaluation failures.",
                ),
                GROUP_LABELS,
            )?,
            evaluation_duration: HistogramVec::new(
                HistogramOpts::new(
                    "rule_evaluation_duration_seconds",
                    "The duration for a rule to execute.",
                )
                .const_label("user", user)
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
                GROUP_LABELS,
            )?,
            iterations: IntCounterVec::new(
                opts(
                    "rule_group_iterations_total",
                    "The total number of scheduled rule group evaluations.",
                ),
                GROUP_LABELS,
            )?,
            last_evaluation: GaugeVec::new(
                opts(
                    "rule_group_last_evaluation_timestamp_seconds",
                    "The timestamp of the last rule group evaluation in seconds.",
                ),
                GROUP_LABELS,
            )?,
            last_duration: GaugeVec::new(
                opts(
                    "rule_group_last_duration_seconds",
                    "The duration of the last rule group evaluation.",
                ),
                GROUP_LABELS,
            )?,
            rules: IntGaugeVec::new(
                opts("rule_group_rules", "The number of rules."),
                GROUP_LABELS,
            )?,
            rule_health: IntGaugeVec::new(
                opts(
                    "rule_health",
                    "Whether the last evaluation of a rule succeeded (1) or failed (0).",
                ),
                RULE_LABELS,
            )?,
        })
    }

    /// Create and register in one step.
    pub fn registered(tenant: &TenantId, registry: &Registry) -> Result<Self, prometheus::Error> {
        let m = Self::new(tenant)?;
        m.register(registry)?;
        Ok(m)
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.evaluations.clone()))?;
        registry.register(Box::new(self.evaluation_failures.clone()))?;
        registry.register(Box::new(self.evaluation_duration.clone()))?;
        registry.register(Box::new(self.iterations.clone()))?;
        registry.register(Box::new(self.last_evaluation.clone()))?;
        registry.register(Box::new(self.last_duration.clone()))?;
        registry.register(Box::new(self.rules.clone()))?;
        registry.register(Box::new(self.rule_health.clone()))?;
        Ok(())
    }
}

/// `namespace;name`, the value of the `rule_group` label.
pub fn group_label(namespace: &str, name: &str) -> String {
    format!("{namespace};{name}")
}
