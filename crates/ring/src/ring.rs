//! Read path of the hash ring.
//!
//! [`Ring`] keeps a local snapshot of the membership table, refreshed in the
//! background from the [`MembershipStore`]. Lookups never touch the store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ruler_core::config::RingConfig;

use crate::desc::{InstanceDesc, InstanceState, ReplicationSet, RingDesc};
use crate::error::RingError;
use crate::membership::MembershipStore;

/// Kind of access a lookup is made for; decides which member states count as healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

impl Operation {
    fn accepts(self, state: InstanceState) -> bool {
        match self {
            Operation::Read => matches!(state, InstanceState::Active | InstanceState::Leaving),
            Operation::Write => state == InstanceState::Active,
        }
    }
}

/// Read-only view of the ring used for ownership lookups.
pub trait ReadRing: Send + Sync {
    /// Ordered replicas responsible for `token`.
    fn get(&self, token: u32, op: Operation) -> Result<ReplicationSet, RingError>;
}

#[derive(Debug, Default)]
struct Snapshot {
    desc: RingDesc,
    tokens: Vec<(u32, String)>,
}

impl Snapshot {
    fn from_desc(desc: RingDesc) -> Self {
        let tokens = desc.sorted_tokens();
        Self { desc, tokens }
    }
}

/// Hash ring with a background-refreshed membership snapshot.
pub struct Ring {
    replication_factor: usize,
    heartbeat_timeout: Duration,
    refresh_period: Duration,
    store: Arc<dyn MembershipStore>,
    snapshot: RwLock<Snapshot>,
    shutdown: Arc<Notify>,
    refresh_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Ring {
    pub fn new(cfg: &RingConfig, store: Arc<dyn MembershipStore>) -> Self {
        Self {
            replication_factor: cfg.replication_factor.max(1),
            heartbeat_timeout: cfg.heartbeat_timeout,
            refresh_period: cfg.refresh_period,
            store,
            snapshot: RwLock::new(Snapshot::default()),
            shutdown: Arc::new(Notify::new()),
            refresh_handle: Mutex::new(None),
        }
    }

    /// Load the membership table once, then keep refreshing it every
    /// `refresh_period` until [`stop`](Ring::stop) is called.
    pub async fn start(self: &Arc<Self>) -> Result<(), RingError> {
        self.refresh().await?;

        let ring = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let period = self.refresh_period;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // skip immediate tick
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = ring.refresh().await {
                            warn!(error = %e, "failed to refresh ring membership");
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
            debug!("ring refresh loop stopped");
        });

        if let Ok(mut slot) = self.refresh_handle.lock() {
            *slot = Some(handle);
        }
        info!(replication_factor = self.replication_factor, "ring started");
        Ok(())
    }

    /// Pull the latest membership table into the local snapshot.
    pub async fn refresh(&self) -> Result<(), RingError> {
        let desc = self.store.snapshot().await?;
        let snap = Snapshot::from_desc(desc);
        let mut guard = self
            .snapshot
            .write()
            .map_err(|e| RingError::Store(format!("ring snapshot lock poisoned: {e}")))?;
        *guard = snap;
        Ok(())
    }

    /// Stop the background refresh and wait for it to exit.
    pub async fn stop(&self) {
        self.shutdown.notify_one();
        let handle = self.refresh_handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "ring refresh task ended abnormally");
            }
        }
        info!("ring stopped");
    }

    /// Copy of the current membership table.
    pub fn desc(&self) -> RingDesc {
        self.snapshot
            .read()
            .map(|s| s.desc.clone())
            .unwrap_or_default()
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Render the HTML status page for the current snapshot.
    pub fn status_page(&self) -> String {
        crate::status::render(&self.desc(), self.heartbeat_timeout, Utc::now())
    }
}

impl ReadRing for Ring {
    fn get(&self, token: u32, op: Operation) -> Result<ReplicationSet, RingError> {
        let snap = self
            .snapshot
            .read()
            .map_err(|e| RingError::Store(format!("ring snapshot lock poisoned: {e}")))?;
        lookup(
            &snap.desc,
            &snap.tokens,
            token,
            op,
            self.replication_factor,
            self.heartbeat_timeout,
        )
    }
}

/// Walk the ring clockwise from `key`, collecting up to `replication_factor`
/// distinct instances, then keep the healthy ones in ring order.
///
/// Fails when the ring is empty or fewer than a majority of the collected
/// instances are healthy.
fn lookup(
    desc: &RingDesc,
    tokens: &[(u32, String)],
    key: u32,
    op: Operation,
    replication_factor: usize,
    heartbeat_timeout: Duration,
) -> Result<ReplicationSet, RingError> {
    if tokens.is_empty() {
        return Err(RingError::Empty);
    }

    let now = Utc::now();
    let start = tokens.partition_point(|(t, _)| *t < key);
    let mut seen: HashSet<&str> = HashSet::new();
    let mut collected: Vec<&InstanceDesc> = Vec::with_capacity(replication_factor);

    for i in 0..tokens.len() {
        let (_, id) = &tokens[(start + i) % tokens.len()];
        if !seen.insert(id.as_str()) {
            continue;
        }
        if let Some(inst) = desc.instances.get(id) {
            collected.push(inst);
        }
        if collected.len() == replication_factor {
            break;
        }
    }

    let min_success = collected.len() / 2 + 1;
    let healthy: Vec<InstanceDesc> = collected
        .into_iter()
        .filter(|inst| op.accepts(inst.state) && inst.is_alive(now, heartbeat_timeout))
        .cloned()
        .collect();

    if healthy.len() < min_success {
        return Err(RingError::InsufficientHealthy {
            required: min_success,
            found: healthy.len(),
        });
    }

    Ok(ReplicationSet { instances: healthy })
}
