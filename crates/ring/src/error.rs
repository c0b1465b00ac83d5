use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("ring is empty")]
    Empty,

    #[error("at least {required} live replicas required, could only find {found}")]
    InsufficientHealthy { required: usize, found: usize },

    #[error("instance '{0}' is not registered in the ring")]
    UnknownInstance(String),

    #[error("membership store error: {0}")]
    Store(String),
}
