//! Errors raised while building or driving a tenant's notifier.

/// Errors that can occur during notifier construction or alert delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("alertmanager {url} returned {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid alertmanager url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("resolving {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("notifier is stopped")]
    Stopped,
}
