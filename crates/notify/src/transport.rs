//! Tenant-aware delivery of alert batches to one Alertmanager.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use tracing::{debug, info_span, Instrument};
use url::Url;

use ruler_core::{TenantId, ORG_ID_HEADER};

use crate::error::NotifyError;
use crate::payload::NotificationAlert;

const ALERTS_API_PATH: &str = "api/v1/alerts";

#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn send(
        &self,
        tenant: &TenantId,
        target: &Url,
        alerts: &[NotificationAlert],
    ) -> Result<(), NotifyError>;
}

/// Builds the transport for a newly created notifier.
pub trait TransportFactory: Send + Sync {
    fn build(
        &self,
        tenant: &TenantId,
        timeout: Duration,
    ) -> Result<Arc<dyn AlertTransport>, NotifyError>;
}

/// `<target>/api/v1/alerts`, keeping any path prefix on the target.
pub fn alerts_endpoint(target: &Url) -> Result<Url, NotifyError> {
    let mut base = target.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(ALERTS_API_PATH).map_err(|e| NotifyError::InvalidUrl {
        url: target.to_string(),
        reason: e.to_string(),
    })
}

/// Stamp the tenant id on an already built request.
pub fn inject_org_id(req: &mut reqwest::Request, tenant: &TenantId) -> Result<(), NotifyError> {
    let name = HeaderName::from_bytes(ORG_ID_HEADER.as_bytes())
        .map_err(|e| NotifyError::Config(format!("invalid header name: {e}")))?;
    let value = HeaderValue::from_str(tenant.as_str())
        .map_err(|e| NotifyError::Config(format!("tenant id is not a valid header: {e}")))?;
    req.headers_mut().insert(name, value);
    Ok(())
}

/// JSON over HTTP with one client per notifier.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AlertTransport for HttpTransport {
    async fn send(
        &self,
        tenant: &TenantId,
        target: &Url,
        alerts: &[NotificationAlert],
    ) -> Result<(), NotifyError> {
        let endpoint = alerts_endpoint(target)?;
        let span = info_span!("alertmanager_send", tenant = %tenant, url = %endpoint);

        async {
            let mut req = self.client.post(endpoint.clone()).json(alerts).build()?;
            inject_org_id(&mut req, tenant)?;

            let response = self.client.execute(req).await?;
            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                return Err(NotifyError::Status {
                    url: endpoint.to_string(),
                    status,
                    body,
                });
            }
            debug!(count = alerts.len(), %status, "alerts delivered");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn build(
        &self,
        _tenant: &TenantId,
        timeout: Duration,
    ) -> Result<Arc<dyn AlertTransport>, NotifyError> {
        Ok(Arc::new(HttpTransport::new(timeout)?))
    }
}
