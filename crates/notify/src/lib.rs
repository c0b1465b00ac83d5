//! Alert delivery to the Alertmanager, one pipeline per tenant.
//!
//! This crate provides:
//! - Alertmanager payloads and the transform from rule alerts (pending ones dropped)
//! - A per-tenant [`Notifier`] with a bounded queue and a background send loop
//! - Static or DNS-discovered Alertmanager targets
//! - A transport that stamps the tenant id on every outbound request
//! - [`NotifierManager`], the tenant → notifier cache

pub mod config;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod notifier;
pub mod payload;
pub mod transport;

pub use config::{NotifierConfig, Routing};
pub use discovery::{DnsResolver, Resolver};
pub use error::NotifyError;
pub use manager::NotifierManager;
pub use metrics::NotifierMetrics;
pub use notifier::{send_alerts, Notifier};
pub use payload::{build_notifications, table_link_for_expression, NotificationAlert};
pub use transport::{AlertTransport, HttpTransport, HttpTransportFactory, TransportFactory};
