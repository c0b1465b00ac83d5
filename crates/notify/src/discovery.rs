//! Alertmanager target discovery.
//!
//! A static URL is used as-is. With DNS discovery the URL's host is looked up
//! on every refresh and one target is produced per resolved address, keeping
//! the scheme, port and path of the configured URL.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::config::Routing;
use crate::error::NotifyError;

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, NotifyError>;
}

/// A/AAAA lookup through the system resolver.
pub struct DnsResolver;

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, NotifyError> {
        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|source| NotifyError::Resolve {
                host: host.to_string(),
                source,
            })?;
        Ok(addrs.collect())
    }
}

/// The current Alertmanager URLs of one notifier.
#[derive(Debug, Clone, Default)]
pub struct Targets(Arc<RwLock<Vec<Url>>>);

impl Targets {
    pub fn snapshot(&self) -> Vec<Url> {
        self.0.read().map(|t| t.clone()).unwrap_or_default()
    }

    fn replace(&self, urls: Vec<Url>) {
        if let Ok(mut t) = self.0.write() {
            *t = urls;
        }
    }
}

/// Keeps a [`Targets`] set up to date for a [`Routing`].
pub struct Discovery {
    targets: Targets,
    shutdown: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl Discovery {
    pub fn start(routing: &Routing, resolver: Arc<dyn Resolver>) -> Self {
        let targets = Targets::default();
        let shutdown = Arc::new(Notify::new());

        let handle = match routing {
            Routing::Disabled => None,
            Routing::Static(url) => {
                targets.replace(vec![url.clone()]);
                None
            }
            Routing::Dns { url, refresh } => Some(tokio::spawn(refresh_loop(
                url.clone(),
                *refresh,
                resolver,
                targets.clone(),
                shutdown.clone(),
            ))),
        };

        Self {
            targets,
            shutdown,
            handle,
        }
    }

    pub fn targets(&self) -> Targets {
        self.targets.clone()
    }

    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shutdown.notify_one();
            if let Err(e) = handle.await {
                warn!(error = %e, "alertmanager discovery task failed");
            }
        }
    }
}

async fn refresh_loop(
    url: Url,
    refresh: Duration,
    resolver: Arc<dyn Resolver>,
    targets: Targets,
    shutdown: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(refresh);
    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {
                match resolve_targets(&url, resolver.as_ref()).await {
                    Ok(urls) => {
                        debug!(host = url.host_str().unwrap_or_default(), count = urls.len(), "refreshed alertmanager targets");
                        targets.replace(urls);
                    }
                    // Keep the previous targets until a lookup succeeds again.
                    Err(e) => warn!(error = %e, "alertmanager discovery failed"),
                }
            }
        }
    }
}

/// Expand `url` into one URL per address its host resolves to.
pub async fn resolve_targets(url: &Url, resolver: &dyn Resolver) -> Result<Vec<Url>, NotifyError> {
    let host = url.host_str().ok_or_else(|| NotifyError::InvalidUrl {
        url: url.to_string(),
        reason: "missing host".into(),
    })?;
    let port = url.port_or_known_default().unwrap_or(80);

    let mut addrs = resolver.resolve(host, port).await?;
    addrs.sort();
    addrs.dedup();

    let mut out = Vec::with_capacity(addrs.len());
    for addr in addrs {
        let mut target = url.clone();
        target
            .set_ip_host(addr.ip())
            .map_err(|()| NotifyError::InvalidUrl {
                url: url.to_string(),
                reason: "cannot carry an ip host".into(),
            })?;
        if target.set_port(Some(addr.port())).is_err() {
            continue;
        }
        out.push(target);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedResolver {
        addrs: Vec<SocketAddr>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Resolver for FixedResolver {
        async fn resolve(&self, _host: &str, port: u16) -> Result<Vec<SocketAddr>, NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .addrs
                .iter()
                .map(|a| SocketAddr::new(a.ip(), port))
                .collect())
        }
    }

    fn resolver(ips: &[&str]) -> (Arc<FixedResolver>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let addrs = ips
            .iter()
            .map(|ip| SocketAddr::new(ip.parse().unwrap(), 0))
            .collect();
        (
            Arc::new(FixedResolver {
                addrs,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn resolve_keeps_scheme_port_and_path() {
        let (r, _) = resolver(&["10.0.0.2", "10.0.0.1", "10.0.0.1"]);
        let url = Url::parse("http://alertmanager.svc:9093/prefix").unwrap();
        let urls = resolve_targets(&url, r.as_ref()).await.unwrap();
        let urls: Vec<String> = urls.iter().map(Url::to_string).collect();
        assert_eq!(
            urls,
            vec!["http://10.0.0.1:9093/prefix", "http://10.0.0.2:9093/prefix"]
        );
    }

    #[tokio::test]
    async fn static_routing_has_one_target() {
        let (r, calls) = resolver(&[]);
        let url = Url::parse("http://am:9093").unwrap();
        let mut d = Discovery::start(&Routing::Static(url.clone()), r);
        assert_eq!(d.targets().snapshot(), vec![url]);
        d.stop().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dns_routing_refreshes_on_timer() {
        let (r, calls) = resolver(&["10.1.1.1"]);
        let routing = Routing::Dns {
            url: Url::parse("http://am:9093").unwrap(),
            refresh: Duration::from_secs(60),
        };
        let mut d = Discovery::start(&routing, r);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(d.targets().snapshot().len(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        d.stop().await;
    }
}
