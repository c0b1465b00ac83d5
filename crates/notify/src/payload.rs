//! Alertmanager alert payloads and the transform from rule alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ruler_rules::{Alert, AlertState, Labels};

/// One alert as posted to the Alertmanager `/api/v1/alerts` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAlert {
    pub labels: Labels,
    pub annotations: Labels,
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    /// Unset while the alert is still firing.
    #[serde(rename = "endsAt", default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "generatorURL")]
    pub generator_url: String,
}

/// Relative link to the expression browser showing `expr` in table view.
pub fn table_link_for_expression(expr: &str) -> String {
    let escaped: String = url::form_urlencoded::byte_serialize(expr.as_bytes()).collect();
    format!("/graph?g0.expr={escaped}&g0.tab=1")
}

/// Convert rule alerts into notifications, dropping pending ones.
pub fn build_notifications(
    alerts: &[Alert],
    external_url: &str,
    expr: &str,
) -> Vec<NotificationAlert> {
    let generator_url = format!("{external_url}{}", table_link_for_expression(expr));
    alerts
        .iter()
        .filter(|a| a.state != AlertState::Pending)
        .map(|a| NotificationAlert {
            labels: a.labels.clone(),
            annotations: a.annotations.clone(),
            starts_at: a.fired_at.unwrap_or(a.active_at),
            ends_at: a.resolved_at,
            generator_url: generator_url.clone(),
        })
        .collect()
}
