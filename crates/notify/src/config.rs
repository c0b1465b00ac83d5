//! Process-wide Alertmanager routing applied to every tenant's notifier.

use std::time::Duration;

use url::Url;

use ruler_core::config::RulerConfig;

use crate::error::NotifyError;

/// Where a notifier sends its alerts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// No Alertmanager configured; alerts are queued and then discarded.
    Disabled,
    Static(Url),
    /// Resolve the URL's host on a timer and send to every address found.
    Dns { url: Url, refresh: Duration },
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub routing: Routing,
    pub queue_capacity: usize,
    pub timeout: Duration,
}

impl NotifierConfig {
    pub fn from_ruler(cfg: &RulerConfig) -> Result<Self, NotifyError> {
        let routing = match cfg.alertmanager_url.as_deref().filter(|u| !u.is_empty()) {
            None if cfg.alertmanager_discovery => {
                return Err(NotifyError::Config(
                    "alertmanager discovery requires an alertmanager url".into(),
                ))
            }
            None => Routing::Disabled,
            Some(raw) => {
                let url = parse_alertmanager_url(raw)?;
                if cfg.alertmanager_discovery {
                    // Discovered targets are addressed by IP, which cannot
                    // match the certificate of an https alertmanager.
                    if url.scheme() == "https" {
                        return Err(NotifyError::Config(
                            "alertmanager discovery only supports http urls".into(),
                        ));
                    }
                    Routing::Dns {
                        url,
                        refresh: cfg.alertmanager_refresh_interval,
                    }
                } else {
                    Routing::Static(url)
                }
            }
        };

        if cfg.notification_queue_capacity == 0 {
            return Err(NotifyError::Config(
                "notification queue capacity must be at least 1".into(),
            ));
        }

        Ok(Self {
            routing,
            queue_capacity: cfg.notification_queue_capacity,
            timeout: cfg.notification_timeout,
        })
    }
}

fn parse_alertmanager_url(raw: &str) -> Result<Url, NotifyError> {
    let invalid = |reason: String| NotifyError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }
    Ok(url)
}
