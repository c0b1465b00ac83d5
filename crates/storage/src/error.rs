use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("rule group error: {0}")]
    Rule(#[from] ruler_rules::RuleError),

    #[error("alert config encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("group does not exist: {tenant}/{namespace}/{name}")]
    GroupNotFound {
        tenant: String,
        namespace: String,
        name: String,
    },

    #[error("invalid {kind} '{value}'")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("{0}")]
    Other(String),
}
