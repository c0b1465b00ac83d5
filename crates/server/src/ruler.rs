//! The ruler: owns ring membership, notifiers, scheduler and worker pool.
//!
//! Lifecycle: `Created → RingJoined (sharding only) → WorkersStarted →
//! SchedulerRunning → Stopping → Stopped`.
//!
//! Stop order:
//! 1. stop every notifier
//! 2. stop the scheduler and wait for its loop (this closes the work channel)
//! 3. wait for the workers to drain the channel and exit
//! 4. leave the ring, then stop the ring refresh

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use ruler_core::config::{RingConfig, RulerConfig};
use ruler_core::TenantId;
use ruler_notify::{
    DnsResolver, HttpTransportFactory, NotifierConfig, NotifierManager, NotifierMetrics,
    TransportFactory,
};
use ruler_ring::{status, InMemoryMembership, Lifecycler, MembershipStore, Ring};
use ruler_rules::{
    Alert, AlertStateStore, EvaluationEngine, GroupDeps, Pusher, RuleGroupDesc, TenantMetrics,
    WrappedGroup,
};
use ruler_storage::RuleStore;

use crate::error::RulerError;
use crate::metrics::RulerMetrics;
use crate::ownership::Ownership;
use crate::scheduler::{GroupFactory, Scheduler};
use crate::worker::WorkerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulerState {
    Created,
    RingJoined,
    WorkersStarted,
    SchedulerRunning,
    Stopping,
    Stopped,
}

/// External collaborators handed to [`Ruler::new`].
pub struct RulerDeps {
    pub store: Arc<dyn RuleStore>,
    pub engine: Arc<dyn EvaluationEngine>,
    pub pusher: Arc<dyn Pusher>,
    /// Ring membership table; a process-local one when unset.
    pub membership: Option<Arc<dyn MembershipStore>>,
    /// Alert transport; HTTP when unset.
    pub transport: Option<Arc<dyn TransportFactory>>,
}

// ── Group construction ───────────────────────────────────────

/// Builds [`WrappedGroup`]s for the scheduler.
struct GroupBuilder {
    deps: GroupDeps,
    default_interval: Duration,
    notifiers: Arc<NotifierManager>,
    registry: Registry,
    tenant_metrics: Mutex<HashMap<TenantId, Arc<TenantMetrics>>>,
}

impl GroupBuilder {
    /// The tenant's metrics set, created and registered on first use.
    fn metrics_for(&self, tenant: &TenantId) -> Result<Arc<TenantMetrics>, RulerError> {
        let mut all = lock(&self.tenant_metrics);
        if let Some(m) = all.get(tenant) {
            return Ok(Arc::clone(m));
        }
        let m = Arc::new(TenantMetrics::registered(tenant, &self.registry)?);
        all.insert(tenant.clone(), Arc::clone(&m));
        Ok(m)
    }

    fn build(&self, desc: RuleGroupDesc) -> Result<WrappedGroup, RulerError> {
        let metrics = self.metrics_for(&desc.tenant)?;
        let notify = self
            .notifiers
            .notify_fn(desc.tenant.clone(), self.deps.external_url.clone());
        let interval = desc.interval_or(self.default_interval);
        Ok(WrappedGroup::new(desc, interval, self.deps.clone(), metrics, notify))
    }
}

#[async_trait]
impl GroupFactory for GroupBuilder {
    async fn new_group(&self, desc: RuleGroupDesc) -> Result<WrappedGroup, RulerError> {
        self.build(desc)
    }

    fn retain_groups(&self, groups: &HashSet<String>) {
        let removed = self.deps.state.retain_groups(groups);
        if removed > 0 {
            debug!(removed, "dropped alert state of deleted rule groups");
        }
    }
}

// ── Ruler ────────────────────────────────────────────────────

struct Membership {
    ring: Arc<Ring>,
    lifecycler: Arc<Lifecycler>,
}

pub struct Ruler {
    cfg: RulerConfig,
    registry: Registry,
    metrics: RulerMetrics,
    store: Arc<dyn RuleStore>,
    alert_state: Arc<AlertStateStore>,
    notifiers: Arc<NotifierManager>,
    groups: Arc<GroupBuilder>,
    ownership: Arc<Ownership>,
    membership: Option<Membership>,
    scheduler: Arc<Scheduler>,
    work_rx: Mutex<Option<mpsc::Receiver<WrappedGroup>>>,
    scheduler_handle: Mutex<Option<JoinHandle<()>>>,
    workers: Mutex<Option<WorkerPool>>,
    state: Mutex<RulerState>,
}

impl Ruler {
    /// Validate the configuration and wire every component; nothing runs yet.
    pub fn new(cfg: RulerConfig, ring_cfg: RingConfig, deps: RulerDeps) -> Result<Self, RulerError> {
        cfg.validate()?;
        if cfg.enable_sharding {
            ring_cfg.validate()?;
        }

        let registry = Registry::new();
        let metrics = RulerMetrics::registered(&registry)?;

        let notifier_cfg = NotifierConfig::from_ruler(&cfg)?;
        let notifier_metrics = NotifierMetrics::new()?;
        notifier_metrics.register(&registry)?;
        let notifiers = Arc::new(NotifierManager::with_parts(
            notifier_cfg,
            deps.transport
                .unwrap_or_else(|| Arc::new(HttpTransportFactory)),
            Arc::new(DnsResolver),
            notifier_metrics,
        ));

        let (membership, ownership) = if cfg.enable_sharding {
            let kv = deps
                .membership
                .unwrap_or_else(|| Arc::new(InMemoryMembership::new()));
            let ring = Arc::new(Ring::new(&ring_cfg, Arc::clone(&kv)));
            let lifecycler = Arc::new(Lifecycler::new(&ring_cfg, kv));
            let ownership = Ownership::sharded(
                ring.clone(),
                lifecycler.addr(),
                metrics.ring_check_errors.clone(),
            );
            (Some(Membership { ring, lifecycler }), ownership)
        } else {
            (None, Ownership::Unsharded)
        };
        let ownership = Arc::new(ownership);

        let alert_state = Arc::new(AlertStateStore::new());
        let groups = Arc::new(GroupBuilder {
            deps: GroupDeps {
                engine: deps.engine,
                pusher: deps.pusher,
                state: Arc::clone(&alert_state),
                external_url: cfg.external_url.clone(),
            },
            default_interval: cfg.evaluation_interval,
            notifiers: Arc::clone(&notifiers),
            registry: registry.clone(),
            tenant_metrics: Mutex::new(HashMap::new()),
        });

        let (tx, rx) = mpsc::channel(cfg.work_queue_capacity);
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&deps.store),
            groups.clone(),
            Arc::clone(&ownership),
            cfg.evaluation_interval,
            cfg.evaluation_interval,
            metrics.clone(),
            tx,
        ));

        Ok(Self {
            cfg,
            registry,
            metrics,
            store: deps.store,
            alert_state,
            notifiers,
            groups,
            ownership,
            membership,
            scheduler,
            work_rx: Mutex::new(Some(rx)),
            scheduler_handle: Mutex::new(None),
            workers: Mutex::new(None),
            state: Mutex::new(RulerState::Created),
        })
    }

    /// Join the ring (when sharding), start the workers, then the scheduler.
    pub async fn start(&self) -> Result<(), RulerError> {
        let current = self.state();
        if current != RulerState::Created {
            return Err(RulerError::InvalidState(current, "start"));
        }

        if let Some(m) = &self.membership {
            m.lifecycler.join().await?;
            m.ring.start().await?;
            self.set_state(RulerState::RingJoined);
        }

        let rx = lock(&self.work_rx)
            .take()
            .ok_or(RulerError::InvalidState(current, "start workers"))?;
        let pool = WorkerPool::start(
            self.cfg.num_workers,
            rx,
            self.cfg.group_timeout,
            self.metrics.clone(),
        );
        *lock(&self.workers) = Some(pool);
        self.set_state(RulerState::WorkersStarted);

        let scheduler = Arc::clone(&self.scheduler);
        let handle = tokio::spawn(async move { scheduler.run().await });
        *lock(&self.scheduler_handle) = Some(handle);
        self.set_state(RulerState::SchedulerRunning);

        info!(
            workers = self.cfg.num_workers,
            sharding = self.cfg.enable_sharding,
            "ruler up and running"
        );
        Ok(())
    }

    /// Tear everything down in order; each step waits for the previous one.
    pub async fn stop(&self) {
        {
            let mut state = lock(&self.state);
            if matches!(*state, RulerState::Stopping | RulerState::Stopped) {
                return;
            }
            *state = RulerState::Stopping;
        }

        info!("stopping notifiers");
        self.notifiers.stop_all().await;

        info!("shutting down rules scheduler");
        self.scheduler.stop();
        let handle = lock(&self.scheduler_handle).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "scheduler task failed");
            }
        }

        info!("waiting for workers to finish");
        let pool = lock(&self.workers).take();
        if let Some(pool) = pool {
            pool.wait().await;
        }

        if let Some(m) = &self.membership {
            info!("attempting shutdown lifecycle");
            if let Err(e) = m.lifecycler.shutdown().await {
                warn!(error = %e, "failed to leave the ring cleanly");
            }
            info!("shutting down the ring");
            m.ring.stop().await;
        }

        self.set_state(RulerState::Stopped);
        info!("ruler stopped");
    }

    pub fn state(&self) -> RulerState {
        *lock(&self.state)
    }

    fn set_state(&self, next: RulerState) {
        *lock(&self.state) = next;
    }

    /// Whether this replica evaluates the group with the given token.
    pub fn owns(&self, token: u32) -> bool {
        self.ownership.owns(token)
    }

    /// Build the evaluation unit for `desc`, as the scheduler does.
    pub async fn new_group(&self, desc: RuleGroupDesc) -> Result<WrappedGroup, RulerError> {
        self.groups.new_group(desc).await
    }

    /// Ring status page, or the static page when sharding is off.
    pub fn status_page(&self) -> String {
        match &self.membership {
            Some(m) => m.ring.status_page(),
            None => status::sharding_disabled_page().to_string(),
        }
    }

    /// Alerts currently tracked for `tenant`, pending ones included.
    pub fn alerts(&self, tenant: &TenantId) -> Vec<Alert> {
        self.alert_state
            .alerts_with_prefix(&format!("{tenant}/"))
    }

    pub fn config(&self) -> &RulerConfig {
        &self.cfg
    }

    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    pub fn notifiers(&self) -> &Arc<NotifierManager> {
        &self.notifiers
    }

    pub fn metrics(&self) -> &RulerMetrics {
        &self.metrics
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Every registered metric in the text exposition format.
    pub fn render_metrics(&self) -> Result<String, RulerError> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Number of tenants with a metrics set.
    pub fn tenant_count(&self) -> usize {
        lock(&self.groups.tenant_metrics).len()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
