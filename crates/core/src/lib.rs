pub mod config;
pub mod duration;
pub mod error;
pub mod tenant;

pub use config::Config;
pub use duration::{format_duration, parse_duration};
pub use error::*;
pub use tenant::{TenantId, ORG_ID_HEADER};
