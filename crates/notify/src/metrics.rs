use prometheus::{IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

use ruler_core::TenantId;

const USER_LABEL: &[&str] = &["user"];

/// Notification metrics shared by every notifier, split by `user`.
#[derive(Clone)]
pub struct NotifierMetrics {
    pub sent: IntCounterVec,
    pub errors: IntCounterVec,
    pub dropped: IntCounterVec,
    pub queue_length: IntGaugeVec,
}

impl NotifierMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            sent: IntCounterVec::new(
                Opts::new(
                    "ruler_notifications_sent_total",
                    "Total number of alerts sent.",
                ),
                USER_LABEL,
            )?,
            errors: IntCounterVec::new(
                Opts::new(
                    "ruler_notifications_errors_total",
                    "Total number of errors sending alert notifications.",
                ),
                USER_LABEL,
            )?,
            dropped: IntCounterVec::new(
                Opts::new(
                    "ruler_notifications_dropped_total",
                    "Total number of alerts dropped due to errors or a full queue.",
                ),
                USER_LABEL,
            )?,
            queue_length: IntGaugeVec::new(
                Opts::new(
                    "ruler_notifications_queue_length",
                    "The number of alert notifications in the queue.",
                ),
                USER_LABEL,
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.sent.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        registry.register(Box::new(self.dropped.clone()))?;
        registry.register(Box::new(self.queue_length.clone()))?;
        Ok(())
    }

    pub(crate) fn for_tenant(&self, tenant: &TenantId) -> TenantCounters {
        let user = [tenant.as_str()];
        TenantCounters {
            sent: self.sent.with_label_values(&user),
            errors: self.errors.with_label_values(&user),
            dropped: self.dropped.with_label_values(&user),
            queue_length: self.queue_length.with_label_values(&user),
        }
    }
}

#[derive(Clone)]
pub(crate) struct TenantCounters {
    pub sent: IntCounter,
    pub errors: IntCounter,
    pub dropped: IntCounter,
    pub queue_length: IntGauge,
}
