//! Process-level ruler metrics, registered in the ruler's own registry.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

#[derive(Clone)]
pub struct RulerMetrics {
    pub group_evaluation_duration: Histogram,
    pub group_evaluation_failures: IntCounterVec,
    pub ring_check_errors: IntCounter,
    pub discovery_errors: IntCounter,
    pub groups_dispatched: IntCounterVec,
}

impl RulerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            group_evaluation_duration: Histogram::with_opts(
                HistogramOpts::new(
                    "ruler_group_evaluation_duration_seconds",
                    "The duration for a rule group to execute.",
                )
                .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 60.0, 120.0]),
            )?,
            group_evaluation_failures: IntCounterVec::new(
                Opts::new(
                    "ruler_group_evaluation_failures_total",
                    "Rule group evaluations that panicked or timed out.",
                ),
                &["user"],
            )?,
            ring_check_errors: IntCounter::new(
                "ruler_ring_check_errors_total",
                "Number of errors that have occurred when checking the ring for ownership",
            )?,
            discovery_errors: IntCounter::new(
                "ruler_discovery_errors_total",
                "Failures listing tenants or rule groups from the rule store.",
            )?,
            groups_dispatched: IntCounterVec::new(
                Opts::new(
                    "ruler_groups_dispatched_total",
                    "Rule groups handed to the worker pool.",
                ),
                &["user"],
            )?,
        })
    }

    pub fn registered(registry: &Registry) -> Result<Self, prometheus::Error> {
        let m = Self::new()?;
        registry.register(Box::new(m.group_evaluation_duration.clone()))?;
        registry.register(Box::new(m.group_evaluation_failures.clone()))?;
        registry.register(Box::new(m.ring_check_errors.clone()))?;
        registry.register(Box::new(m.discovery_errors.clone()))?;
        registry.register(Box::new(m.groups_dispatched.clone()))?;
        Ok(m)
    }
}
