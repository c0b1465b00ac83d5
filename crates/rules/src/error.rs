//! Error types for rule decoding, validation and evaluation.

/// Errors raised while decoding, validating or evaluating rule groups.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Binary group blob could not be encoded.
    #[error("encode rule group: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Binary group blob could not be decoded.
    #[error("decode rule group: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// One or more validation errors; each entry is `path: message`.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("template error in {name}: {message}")]
    Template { name: String, message: String },

    /// Result vector is unusable for the rule (e.g. duplicate series after relabeling).
    #[error("rule '{rule}': {message}")]
    InvalidResult { rule: String, message: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Errors returned by evaluation engines and result pushers.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("query returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}
