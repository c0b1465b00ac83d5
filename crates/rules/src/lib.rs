//! Rule groups and their evaluation.
//!
//! This crate provides:
//! - The persisted rule group model ([`RuleGroupDesc`]) and its binary encoding
//! - The Prometheus-style YAML rule file format with validation
//! - The [`EvaluationEngine`] and [`Pusher`] seams plus HTTP adapters
//! - Alerting and recording rules, with alert state kept across cycles
//! - Per-tenant metrics and the [`WrappedGroup`] evaluation unit

pub mod alert;
pub mod engine;
pub mod error;
pub mod format;
pub mod group;
pub mod metrics;
pub mod recording;
pub mod schema;
pub mod state;
pub mod templating;
pub mod validation;

pub use alert::{Alert, AlertState, AlertingRule};
pub use engine::{
    DiscardPusher, EvaluationEngine, HttpPusher, HttpQueryEngine, Labels, Pusher, Sample, Vector,
};
pub use error::{EngineError, RuleError};
pub use format::{RuleFormat, RuleGroupFormat, RuleGroupsFile};
pub use group::{EvalOutcome, GroupDeps, NotifyFn, WrappedGroup};
pub use metrics::TenantMetrics;
pub use recording::RecordingRule;
pub use schema::{RuleDesc, RuleGroupDesc};
pub use state::{AlertStateStore, RuleKey};
