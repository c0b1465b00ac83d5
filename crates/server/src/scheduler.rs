//! Periodic discovery of due rule groups.
//!
//! Every tick the scheduler lists tenants and their groups from the rule
//! store, and for each group that is due and owned by this replica builds a
//! [`WrappedGroup`] through the injected [`GroupFactory`] and sends it to the
//! worker pool. The work channel is bounded, so a slow pool stalls discovery.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use ruler_rules::{RuleGroupDesc, WrappedGroup};
use ruler_storage::RuleStore;

use crate::error::RulerError;
use crate::metrics::RulerMetrics;
use crate::ownership::Ownership;

/// Builds the evaluation unit for a stored group.
#[async_trait]
pub trait GroupFactory: Send + Sync {
    async fn new_group(&self, desc: RuleGroupDesc) -> Result<WrappedGroup, RulerError>;

    /// Called after a complete listing with the key of every stored group,
    /// so per-group state of deleted groups can be dropped.
    fn retain_groups(&self, _groups: &HashSet<String>) {}
}

#[derive(Default)]
struct DispatchState {
    last: HashMap<String, Instant>,
    zero_interval_warned: HashSet<String>,
}

pub struct Scheduler {
    store: Arc<dyn RuleStore>,
    factory: Arc<dyn GroupFactory>,
    ownership: Arc<Ownership>,
    poll_interval: Duration,
    default_interval: Duration,
    metrics: RulerMetrics,
    work_tx: Mutex<Option<mpsc::Sender<WrappedGroup>>>,
    state: Mutex<DispatchState>,
    stopped: AtomicBool,
    shutdown: Notify,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn RuleStore>,
        factory: Arc<dyn GroupFactory>,
        ownership: Arc<Ownership>,
        poll_interval: Duration,
        default_interval: Duration,
        metrics: RulerMetrics,
        work_tx: mpsc::Sender<WrappedGroup>,
    ) -> Self {
        Self {
            store,
            factory,
            ownership,
            poll_interval,
            default_interval,
            metrics,
            work_tx: Mutex::new(Some(work_tx)),
            state: Mutex::new(DispatchState::default()),
            stopped: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Poll until [`stop`](Self::stop) is called.
    ///
    /// A tick that has started always finishes dispatching. The work channel
    /// closes when this returns.
    pub async fn run(&self) {
        let Some(tx) = lock(&self.work_tx).take() else {
            warn!("scheduler already ran");
            return;
        };
        if self.stopped.load(Ordering::Acquire) {
            return;
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(poll_interval = ?self.poll_interval, "scheduler started");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                at = ticker.tick() => {
                    if !self.tick(&tx, at).await {
                        break;
                    }
                }
            }
        }

        drop(tx);
        info!("scheduler stopped");
    }

    /// Ask [`run`](Self::run) to return. Further calls do nothing.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.shutdown.notify_one();
        }
    }

    /// One discovery and dispatch pass. Returns false once the workers are gone.
    pub(crate) async fn tick(&self, tx: &mpsc::Sender<WrappedGroup>, now: Instant) -> bool {
        let tenants = match self.store.list_tenants().await {
            Ok(t) => t,
            Err(e) => {
                self.metrics.discovery_errors.inc();
                warn!(error = %e, "unable to list tenants, retrying next tick");
                return true;
            }
        };

        let mut seen = HashSet::new();
        let mut complete = true;
        for tenant in tenants {
            let groups = match self.store.list_rule_groups(&tenant, "").await {
                Ok(g) => g,
                Err(e) => {
                    complete = false;
                    self.metrics.discovery_errors.inc();
                    warn!(tenant = %tenant, error = %e, "unable to list rule groups");
                    continue;
                }
            };

            for desc in groups {
                let key = desc.key();
                seen.insert(key.clone());

                if !self.is_due(&key, desc.interval_or(self.default_interval), now) {
                    continue;
                }
                if !self.ownership.owns_group(&desc) {
                    continue;
                }

                let (namespace, name) = (desc.namespace.clone(), desc.name.clone());
                let group = match self.factory.new_group(desc).await {
                    Ok(g) => g,
                    Err(e) => {
                        warn!(tenant = %tenant, namespace = %namespace, group = %name, error = %e, "unable to build rule group");
                        continue;
                    }
                };

                lock(&self.state).last.insert(key, now);
                if tx.send(group).await.is_err() {
                    warn!("work channel closed, stopping dispatch");
                    return false;
                }
                self.metrics
                    .groups_dispatched
                    .with_label_values(&[tenant.as_str()])
                    .inc();
                debug!(tenant = %tenant, namespace = %namespace, group = %name, "dispatched rule group");
            }
        }

        // Groups deleted from the store are forgotten. Alert state is only
        // pruned on a complete listing so a failed tenant keeps its alerts.
        {
            let mut state = lock(&self.state);
            state.last.retain(|k, _| seen.contains(k));
            state.zero_interval_warned.retain(|k| seen.contains(k));
        }
        if complete {
            self.factory.retain_groups(&seen);
        }
        true
    }

    fn is_due(&self, key: &str, interval: Duration, now: Instant) -> bool {
        let mut state = lock(&self.state);
        if interval.is_zero() {
            if state.zero_interval_warned.insert(key.to_string()) {
                warn!(group = %key, "rule group has a zero evaluation interval, evaluating every tick");
            }
            return true;
        }
        match state.last.get(key) {
            None => true,
            Some(last) => now.saturating_duration_since(*last) >= interval,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
