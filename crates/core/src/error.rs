use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid tenant id: {0}")]
    InvalidTenant(String),

    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
