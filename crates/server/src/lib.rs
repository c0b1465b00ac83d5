//! Multi-tenant rule evaluation service.
//!
//! - [`ownership`]: which replica evaluates a rule group
//! - [`scheduler`]: polls the rule store and dispatches due groups
//! - [`worker`]: fixed pool evaluating dispatched groups
//! - [`ruler`]: wires everything together and owns the lifecycle
//! - [`http`]: ring status, metrics, and the rules and alert-config APIs

pub mod error;
pub mod http;
pub mod metrics;
pub mod ownership;
pub mod ruler;
pub mod scheduler;
pub mod worker;

pub use error::RulerError;
pub use ownership::Ownership;
pub use ruler::{Ruler, RulerDeps, RulerState};
pub use scheduler::{GroupFactory, Scheduler};
pub use worker::WorkerPool;
