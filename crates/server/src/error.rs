use thiserror::Error;

#[derive(Error, Debug)]
pub enum RulerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ruler_core::CoreError),

    #[error("notifier error: {0}")]
    Notify(#[from] ruler_notify::NotifyError),

    #[error("ring error: {0}")]
    Ring(#[from] ruler_ring::RingError),

    #[error("storage error: {0}")]
    Storage(#[from] ruler_storage::StorageError),

    #[error("rule error: {0}")]
    Rule(#[from] ruler_rules::RuleError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("ruler is {0:?}, cannot {1}")]
    InvalidState(crate::ruler::RulerState, &'static str),
}
