//! A tenant's alert pipeline: a bounded queue drained by a background send loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ruler_core::TenantId;
use ruler_rules::Alert;

use crate::config::NotifierConfig;
use crate::discovery::{Discovery, Resolver, Targets};
use crate::error::NotifyError;
use crate::metrics::TenantCounters;
use crate::payload::{build_notifications, NotificationAlert};
use crate::transport::AlertTransport;

/// Largest batch posted to an Alertmanager in one request.
const MAX_BATCH_SIZE: usize = 64;

pub struct Notifier {
    tenant: TenantId,
    capacity: usize,
    queue: Mutex<VecDeque<NotificationAlert>>,
    stopped: AtomicBool,
    more: Notify,
    shutdown: Notify,
    transport: Arc<dyn AlertTransport>,
    targets: Targets,
    discovery: tokio::sync::Mutex<Discovery>,
    handle: Mutex<Option<JoinHandle<()>>>,
    counters: TenantCounters,
}

impl Notifier {
    /// Build a notifier without starting its send loop.
    pub(crate) fn new(
        tenant: TenantId,
        config: &NotifierConfig,
        transport: Arc<dyn AlertTransport>,
        resolver: Arc<dyn Resolver>,
        counters: TenantCounters,
    ) -> Self {
        let discovery = Discovery::start(&config.routing, resolver);
        Self {
            tenant,
            capacity: config.queue_capacity,
            queue: Mutex::new(VecDeque::new()),
            stopped: AtomicBool::new(false),
            more: Notify::new(),
            shutdown: Notify::new(),
            transport,
            targets: discovery.targets(),
            discovery: tokio::sync::Mutex::new(discovery),
            handle: Mutex::new(None),
            counters,
        }
    }

    pub(crate) fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        *lock(&self.handle) = Some(handle);
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Queue alerts for delivery, dropping the oldest ones when full.
    pub fn send(&self, mut alerts: Vec<NotificationAlert>) -> Result<(), NotifyError> {
        {
            let mut queue = lock(&self.queue);
            if self.is_stopped() {
                return Err(NotifyError::Stopped);
            }

            if alerts.len() > self.capacity {
                let excess = alerts.len() - self.capacity;
                alerts.drain(..excess);
                self.counters.dropped.inc_by(excess as u64);
            }
            let overflow = (queue.len() + alerts.len()).saturating_sub(self.capacity);
            if overflow > 0 {
                queue.drain(..overflow);
                self.counters.dropped.inc_by(overflow as u64);
                warn!(tenant = %self.tenant, dropped = overflow, "alert queue full, dropping oldest alerts");
            }
            queue.extend(alerts);
            self.counters.queue_length.set(queue.len() as i64);
        }
        self.more.notify_one();
        Ok(())
    }

    /// Stop accepting alerts, end the send loop and discard what is still queued.
    pub async fn stop(&self) {
        {
            let mut queue = lock(&self.queue);
            if self.stopped.swap(true, Ordering::AcqRel) {
                return;
            }
            if !queue.is_empty() {
                debug!(tenant = %self.tenant, discarded = queue.len(), "discarding queued alerts on stop");
                self.counters.dropped.inc_by(queue.len() as u64);
                queue.clear();
            }
            self.counters.queue_length.set(0);
        }

        self.shutdown.notify_one();
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(tenant = %self.tenant, error = %e, "notifier send loop failed");
            }
        }
        self.discovery.lock().await.stop().await;
        info!(tenant = %self.tenant, "notifier stopped");
    }

    async fn run(&self) {
        loop {
            let batch = self.next_batch();
            if batch.is_empty() {
                tokio::select! {
                    _ = self.shutdown.notified() => break,
                    _ = self.more.notified() => continue,
                }
            }
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = self.dispatch(batch) => {}
            }
        }
        debug!(tenant = %self.tenant, "notifier send loop exited");
    }

    fn next_batch(&self) -> Vec<NotificationAlert> {
        let mut queue = lock(&self.queue);
        let n = queue.len().min(MAX_BATCH_SIZE);
        let batch: Vec<_> = queue.drain(..n).collect();
        self.counters.queue_length.set(queue.len() as i64);
        batch
    }

    async fn dispatch(&self, batch: Vec<NotificationAlert>) {
        let count = batch.len() as u64;
        let targets = self.targets.snapshot();
        if targets.is_empty() {
            debug!(tenant = %self.tenant, count, "no alertmanager configured, dropping alerts");
            self.counters.dropped.inc_by(count);
            return;
        }

        let mut delivered = false;
        for target in &targets {
            match self.transport.send(&self.tenant, target, &batch).await {
                Ok(()) => {
                    self.counters.sent.inc_by(count);
                    delivered = true;
                }
                Err(e) => {
                    self.counters.errors.inc();
                    warn!(tenant = %self.tenant, alertmanager = %target, count, error = %e, "error sending alerts");
                }
            }
        }
        if !delivered {
            self.counters.dropped.inc_by(count);
        }
    }
}

/// Forward the non-pending `alerts` of one rule to `notifier`.
///
/// Returns how many notifications were queued; nothing is queued when every
/// alert is pending.
pub fn send_alerts(
    notifier: &Notifier,
    external_url: &str,
    expr: &str,
    alerts: &[Alert],
) -> Result<usize, NotifyError> {
    let batch = build_notifications(alerts, external_url, expr);
    if batch.is_empty() {
        return Ok(0);
    }
    let n = batch.len();
    notifier.send(batch)?;
    Ok(n)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
