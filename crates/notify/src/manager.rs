//! Per-tenant notifier cache.
//!
//! Notifiers are created on first use and kept for the life of the process;
//! tenants that stop alerting keep their notifier until shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use prometheus::Registry;
use tracing::{info, warn};

use ruler_core::TenantId;
use ruler_rules::{Alert, AlertState, NotifyFn};

use crate::config::NotifierConfig;
use crate::discovery::{DnsResolver, Resolver};
use crate::error::NotifyError;
use crate::metrics::NotifierMetrics;
use crate::notifier::{send_alerts, Notifier};
use crate::transport::{HttpTransportFactory, TransportFactory};

pub struct NotifierManager {
    config: NotifierConfig,
    factory: Arc<dyn TransportFactory>,
    resolver: Arc<dyn Resolver>,
    metrics: NotifierMetrics,
    notifiers: Mutex<HashMap<TenantId, Arc<Notifier>>>,
    stopped: AtomicBool,
}

impl NotifierManager {
    /// HTTP delivery with DNS discovery; metrics go to `registry`.
    pub fn new(config: NotifierConfig, registry: &Registry) -> Result<Self, NotifyError> {
        let metrics = NotifierMetrics::new()?;
        metrics.register(registry)?;
        Ok(Self::with_parts(
            config,
            Arc::new(HttpTransportFactory),
            Arc::new(DnsResolver),
            metrics,
        ))
    }

    pub fn with_parts(
        config: NotifierConfig,
        factory: Arc<dyn TransportFactory>,
        resolver: Arc<dyn Resolver>,
        metrics: NotifierMetrics,
    ) -> Self {
        Self {
            config,
            factory,
            resolver,
            metrics,
            notifiers: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// The tenant's notifier, created and started if it does not exist yet.
    ///
    /// A failed creation leaves nothing behind, so the next call retries.
    pub fn get_or_create(&self, tenant: &TenantId) -> Result<Arc<Notifier>, NotifyError> {
        let mut notifiers = self.lock();
        if self.stopped.load(Ordering::Acquire) {
            return Err(NotifyError::Stopped);
        }
        if let Some(n) = notifiers.get(tenant) {
            return Ok(Arc::clone(n));
        }

        let transport = self.factory.build(tenant, self.config.timeout)?;
        let notifier = Arc::new(Notifier::new(
            tenant.clone(),
            &self.config,
            transport,
            Arc::clone(&self.resolver),
            self.metrics.for_tenant(tenant),
        ));
        notifier.start();
        notifiers.insert(tenant.clone(), Arc::clone(&notifier));
        info!(tenant = %tenant, "created notifier");
        Ok(notifier)
    }

    pub fn get(&self, tenant: &TenantId) -> Option<Arc<Notifier>> {
        self.lock().get(tenant).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Alert-sending closure for one tenant's groups.
    ///
    /// The notifier is only looked up (and possibly created) once there is a
    /// non-pending alert to deliver.
    pub fn notify_fn(self: &Arc<Self>, tenant: TenantId, external_url: String) -> NotifyFn {
        let manager = Arc::clone(self);
        Arc::new(move |expr: &str, alerts: Vec<Alert>| {
            if alerts.iter().all(|a| a.state == AlertState::Pending) {
                return;
            }
            match manager.get_or_create(&tenant) {
                Ok(notifier) => {
                    if let Err(e) = send_alerts(&notifier, &external_url, expr, &alerts) {
                        warn!(tenant = %tenant, error = %e, "failed to queue alerts");
                    }
                }
                Err(e) => {
                    warn!(tenant = %tenant, error = %e, "unable to get notifier, dropping alerts");
                }
            }
        })
    }

    /// Stop every notifier and refuse to create new ones.
    pub async fn stop_all(&self) {
        let notifiers: Vec<Arc<Notifier>> = {
            let notifiers = self.lock();
            self.stopped.store(true, Ordering::Release);
            notifiers.values().cloned().collect()
        };
        for n in &notifiers {
            n.stop().await;
        }
        info!(count = notifiers.len(), "stopped all notifiers");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TenantId, Arc<Notifier>>> {
        self.notifiers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::tests::{static_config, RecordingTransport, Sent};
    use crate::transport::AlertTransport;
    use chrono::Utc;
    use ruler_rules::Labels;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingFactory {
        builds: Arc<AtomicUsize>,
        fail_first: AtomicBool,
        sent: Sent,
    }

    impl TransportFactory for CountingFactory {
        fn build(
            &self,
            _tenant: &TenantId,
            _timeout: Duration,
        ) -> Result<Arc<dyn AlertTransport>, NotifyError> {
            if self.fail_first.swap(false, Ordering::SeqCst) {
                return Err(NotifyError::Config("transport unavailable".into()));
            }
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(RecordingTransport {
                sent: self.sent.clone(),
                fail: false,
            }))
        }
    }

    fn manager(fail_first: bool) -> (Arc<NotifierManager>, Arc<AtomicUsize>, Sent) {
        let builds = Arc::new(AtomicUsize::new(0));
        let sent: Sent = Arc::default();
        let m = NotifierManager::with_parts(
            static_config(100),
            Arc::new(CountingFactory {
                builds: builds.clone(),
                fail_first: AtomicBool::new(fail_first),
                sent: sent.clone(),
            }),
            Arc::new(DnsResolver),
            NotifierMetrics::new().unwrap(),
        );
        (Arc::new(m), builds, sent)
    }

    fn firing(name: &str) -> Alert {
        Alert {
            labels: Labels::from([("alertname".into(), name.into())]),
            annotations: Labels::new(),
            state: AlertState::Firing,
            value: 1.0,
            active_at: Utc::now(),
            fired_at: Some(Utc::now()),
            resolved_at: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_get_or_create_yields_one_notifier() {
        let (m, builds, _) = manager(false);
        let tenant = TenantId::new("t1").unwrap();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let m = m.clone();
            let tenant = tenant.clone();
            tasks.push(tokio::spawn(async move { m.get_or_create(&tenant).unwrap() }));
        }
        let mut got = Vec::new();
        for t in tasks {
            got.push(t.await.unwrap());
        }

        assert!(got.iter().all(|n| Arc::ptr_eq(n, &got[0])));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(m.len(), 1);
        m.stop_all().await;
    }

    #[tokio::test]
    async fn failed_creation_is_not_cached() {
        let (m, builds, _) = manager(true);
        let tenant = TenantId::new("t1").unwrap();

        assert!(m.get_or_create(&tenant).is_err());
        assert!(m.is_empty());

        let n = m.get_or_create(&tenant).unwrap();
        assert_eq!(n.tenant(), &tenant);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        m.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_first_sends_share_one_notifier() {
        let (m, builds, sent) = manager(false);
        let tenant = TenantId::new("t2").unwrap();
        let notify = m.notify_fn(tenant.clone(), "http://ruler".into());

        let a = {
            let notify = notify.clone();
            tokio::spawn(async move { notify("up == 0", vec![firing("A")]) })
        };
        let b = {
            let notify = notify.clone();
            tokio::spawn(async move { notify("up == 0", vec![firing("B")]) })
        };
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(m.len(), 1);

        for _ in 0..200 {
            let delivered: usize = sent.lock().unwrap().iter().map(|(_, _, a)| a.len()).sum();
            if delivered == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let sent = sent.lock().unwrap().clone();
        let delivered: usize = sent.iter().map(|(_, _, a)| a.len()).sum();
        assert_eq!(delivered, 2);
        assert!(sent.iter().all(|(t, _, _)| t == &tenant));
        m.stop_all().await;
    }

    #[tokio::test]
    async fn pending_only_does_not_create_notifier() {
        let (m, builds, _) = manager(false);
        let notify = m.notify_fn(TenantId::new("t1").unwrap(), String::new());
        let mut a = firing("A");
        a.state = AlertState::Pending;
        notify("up", vec![a]);
        assert!(m.is_empty());
        assert_eq!(builds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_all_stops_every_notifier() {
        let (m, _, _) = manager(false);
        let t1 = m.get_or_create(&TenantId::new("t1").unwrap()).unwrap();
        let t2 = m.get_or_create(&TenantId::new("t2").unwrap()).unwrap();

        m.stop_all().await;

        assert!(t1.is_stopped() && t2.is_stopped());
        assert!(t1.send(Vec::new()).is_err());
        assert!(matches!(
            m.get_or_create(&TenantId::new("t3").unwrap()),
            Err(NotifyError::Stopped)
        ));
    }
}
