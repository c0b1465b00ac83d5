use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::duration::parse_duration;
use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    profiled_env_opt(profile, key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn profiled_env_duration(profile: &str, key: &str, default: Duration) -> Duration {
    match profiled_env_opt(profile, key) {
        Some(raw) => match parse_duration(&raw) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring unparseable duration, using default");
                default
            }
        },
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub ruler: RulerConfig,
    pub ring: RingConfig,
    pub store: StoreConfig,
    pub engine: EngineConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RULER_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RULER_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            ruler: RulerConfig::from_env_profiled(p),
            ring: RingConfig::from_env_profiled(p),
            store: StoreConfig::from_env_profiled(p),
            engine: EngineConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.ruler.validate()?;
        if self.ruler.enable_sharding {
            self.ring.validate()?;
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:   {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  ruler:    interval={:?}, workers={}, sharding={}",
            self.ruler.evaluation_interval,
            self.ruler.num_workers,
            self.ruler.enable_sharding
        );
        tracing::info!(
            "  notify:   alertmanager={}, discovery={}",
            self.ruler.alertmanager_url.as_deref().unwrap_or("(none)"),
            self.ruler.alertmanager_discovery
        );
        tracing::info!("  store:    backend={:?}", self.store.backend);
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "RULER_HOST", "0.0.0.0"),
            port: profiled_env_parse(p, "RULER_PORT", 9009),
        }
    }
}

// ── Ruler ─────────────────────────────────────────────────────

/// Configuration for rule evaluation and alert delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulerConfig {
    /// Prefix for alert generator URLs; must be a valid URL when set.
    pub external_url: String,
    /// How frequently to poll the rule store, and the default group cadence.
    pub evaluation_interval: Duration,
    /// Number of concurrent group evaluators.
    pub num_workers: usize,
    /// Capacity of the scheduler → worker channel.
    pub work_queue_capacity: usize,
    /// URL of the Alertmanager to send notifications to.
    pub alertmanager_url: Option<String>,
    /// Resolve the Alertmanager host through DNS instead of using it verbatim.
    pub alertmanager_discovery: bool,
    /// How long to wait between DNS refreshes of the Alertmanager targets.
    pub alertmanager_refresh_interval: Duration,
    /// Capacity of each tenant's notification queue.
    pub notification_queue_capacity: usize,
    /// HTTP timeout when sending notifications to the Alertmanager.
    pub notification_timeout: Duration,
    /// Timeout for a single rule group evaluation.
    pub group_timeout: Duration,
    /// Distribute rule evaluation using the ring.
    pub enable_sharding: bool,
}

impl Default for RulerConfig {
    fn default() -> Self {
        Self {
            external_url: String::new(),
            evaluation_interval: Duration::from_secs(15),
            num_workers: 1,
            work_queue_capacity: 1,
            alertmanager_url: None,
            alertmanager_discovery: false,
            alertmanager_refresh_interval: Duration::from_secs(60),
            notification_queue_capacity: 10_000,
            notification_timeout: Duration::from_secs(10),
            group_timeout: Duration::from_secs(10),
            enable_sharding: false,
        }
    }
}

impl RulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        let num_workers = profiled_env_parse(p, "RULER_NUM_WORKERS", d.num_workers);
        Self {
            external_url: profiled_env_or(p, "RULER_EXTERNAL_URL", ""),
            evaluation_interval: profiled_env_duration(
                p,
                "RULER_EVALUATION_INTERVAL",
                d.evaluation_interval,
            ),
            num_workers,
            work_queue_capacity: profiled_env_parse(p, "RULER_WORK_QUEUE_CAPACITY", num_workers),
            alertmanager_url: profiled_env_opt(p, "RULER_ALERTMANAGER_URL"),
            alertmanager_discovery: profiled_env_bool(
                p,
                "RULER_ALERTMANAGER_DISCOVERY",
                d.alertmanager_discovery,
            ),
            alertmanager_refresh_interval: profiled_env_duration(
                p,
                "RULER_ALERTMANAGER_REFRESH_INTERVAL",
                d.alertmanager_refresh_interval,
            ),
            notification_queue_capacity: profiled_env_parse(
                p,
                "RULER_NOTIFICATION_QUEUE_CAPACITY",
                d.notification_queue_capacity,
            ),
            notification_timeout: profiled_env_duration(
                p,
                "RULER_NOTIFICATION_TIMEOUT",
                d.notification_timeout,
            ),
            group_timeout: profiled_env_duration(p, "RULER_GROUP_TIMEOUT", d.group_timeout),
            enable_sharding: profiled_env_bool(p, "RULER_ENABLE_SHARDING", d.enable_sharding),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.num_workers == 0 {
            return Err(CoreError::InvalidConfig(format!(
                "must have at least 1 worker, got {}",
                self.num_workers
            )));
        }
        if self.work_queue_capacity == 0 {
            return Err(CoreError::InvalidConfig(
                "work queue capacity must be at least 1".into(),
            ));
        }
        if self.notification_queue_capacity == 0 {
            return Err(CoreError::InvalidConfig(
                "notification queue capacity must be at least 1".into(),
            ));
        }
        for (name, d) in [
            ("evaluation interval", self.evaluation_interval),
            ("group timeout", self.group_timeout),
            ("alertmanager refresh interval", self.alertmanager_refresh_interval),
            ("notification timeout", self.notification_timeout),
        ] {
            if d.is_zero() {
                return Err(CoreError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if !self.external_url.is_empty() {
            Url::parse(&self.external_url).map_err(|e| {
                CoreError::InvalidConfig(format!("external url '{}': {e}", self.external_url))
            })?;
        }
        if let Some(ref am) = self.alertmanager_url {
            Url::parse(am)
                .map_err(|e| CoreError::InvalidConfig(format!("alertmanager url '{am}': {e}")))?;
        }
        Ok(())
    }
}

// ── Ring ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingConfig {
    /// Unique id of this replica in the ring.
    pub instance_id: String,
    /// Address this replica advertises to its peers.
    pub instance_addr: String,
    pub heartbeat_period: Duration,
    /// Members whose heartbeat is older than this are unhealthy.
    pub heartbeat_timeout: Duration,
    pub replication_factor: usize,
    pub num_tokens: usize,
    /// How often the local ring snapshot is refreshed from the membership store.
    pub refresh_period: Duration,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            instance_id: "ruler-0".to_string(),
            instance_addr: "127.0.0.1:9009".to_string(),
            heartbeat_period: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(60),
            replication_factor: 1,
            num_tokens: 128,
            refresh_period: Duration::from_secs(5),
        }
    }
}

impl RingConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            instance_id: profiled_env_or(p, "RULER_RING_INSTANCE_ID", &d.instance_id),
            instance_addr: profiled_env_or(p, "RULER_RING_INSTANCE_ADDR", &d.instance_addr),
            heartbeat_period: profiled_env_duration(
                p,
                "RULER_RING_HEARTBEAT_PERIOD",
                d.heartbeat_period,
            ),
            heartbeat_timeout: profiled_env_duration(
                p,
                "RULER_RING_HEARTBEAT_TIMEOUT",
                d.heartbeat_timeout,
            ),
            replication_factor: profiled_env_parse(
                p,
                "RULER_RING_REPLICATION_FACTOR",
                d.replication_factor,
            ),
            num_tokens: profiled_env_parse(p, "RULER_RING_NUM_TOKENS", d.num_tokens),
            refresh_period: profiled_env_duration(p, "RULER_RING_REFRESH_PERIOD", d.refresh_period),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.instance_addr.is_empty() {
            return Err(CoreError::InvalidConfig("ring instance address is empty".into()));
        }
        if self.replication_factor == 0 || self.num_tokens == 0 {
            return Err(CoreError::InvalidConfig(
                "ring replication factor and token count must be positive".into(),
            ));
        }
        if self.heartbeat_period.is_zero() || self.refresh_period.is_zero() {
            return Err(CoreError::InvalidConfig(
                "ring heartbeat and refresh periods must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ── Rule store ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    Memory,
    Local,
    S3,
}

impl std::str::FromStr for StoreBackendKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "inmemory" => Ok(Self::Memory),
            "local" | "filesystem" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => Err(CoreError::InvalidConfig(format!("unknown store backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackendKind,
    pub data_dir: PathBuf,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
    pub endpoint_url: Option<String>,
}

impl StoreConfig {
    fn from_env_profiled(p: &str) -> Self {
        let backend = profiled_env_or(p, "RULER_STORE_BACKEND", "local")
            .parse()
            .unwrap_or(StoreBackendKind::Local);
        Self {
            backend,
            data_dir: PathBuf::from(profiled_env_or(p, "RULER_DATA_DIR", "data")),
            region: profiled_env_or(p, "AWS_REGION", "us-east-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            s3_bucket: profiled_env_opt(p, "RULER_S3_BUCKET"),
            s3_prefix: profiled_env_opt(p, "RULER_S3_PREFIX"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }
}

// ── Evaluation engine ─────────────────────────────────────────

/// Where expressions are evaluated and where recorded series are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of a Prometheus-compatible query API.
    pub query_url: String,
    /// Endpoint receiving recorded samples as JSON.
    pub push_url: Option<String>,
    pub query_timeout: Duration,
}

impl EngineConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            query_url: profiled_env_or(p, "RULER_QUERY_URL", "http://localhost:9090"),
            push_url: profiled_env_opt(p, "RULER_PUSH_URL"),
            query_timeout: profiled_env_duration(
                p,
                "RULER_QUERY_TIMEOUT",
                Duration::from_secs(30),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = RulerConfig::default();
        assert_eq!(c.evaluation_interval, Duration::from_secs(15));
        assert_eq!(c.num_workers, 1);
        assert_eq!(c.notification_queue_capacity, 10_000);
        assert_eq!(c.notification_timeout, Duration::from_secs(10));
        assert_eq!(c.alertmanager_refresh_interval, Duration::from_secs(60));
        assert!(!c.enable_sharding);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let c = RulerConfig {
            num_workers: 0,
            ..RulerConfig::default()
        };
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("at least 1 worker"));
    }

    #[test]
    fn zero_durations_are_rejected() {
        let zeroed = [
            RulerConfig { evaluation_interval: Duration::ZERO, ..RulerConfig::default() },
            RulerConfig { group_timeout: Duration::ZERO, ..RulerConfig::default() },
            RulerConfig { alertmanager_refresh_interval: Duration::ZERO, ..RulerConfig::default() },
            RulerConfig { notification_timeout: Duration::ZERO, ..RulerConfig::default() },
        ];
        for c in zeroed {
            let err = c.validate().unwrap_err();
            assert!(err.to_string().contains("must be positive"), "{err}");
        }

        for ring in [
            RingConfig { heartbeat_period: Duration::ZERO, ..RingConfig::default() },
            RingConfig { refresh_period: Duration::ZERO, ..RingConfig::default() },
        ] {
            assert!(ring.validate().is_err());
        }
    }

    #[test]
    fn malformed_alertmanager_url_is_rejected() {
        let c = RulerConfig {
            alertmanager_url: Some("not a url".into()),
            ..RulerConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn ring_validation() {
        assert!(RingConfig::default().validate().is_ok());
        let bad = RingConfig {
            replication_factor: 0,
            ..RingConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn store_backend_parses() {
        assert_eq!("S3".parse::<StoreBackendKind>().unwrap(), StoreBackendKind::S3);
        assert_eq!("memory".parse::<StoreBackendKind>().unwrap(), StoreBackendKind::Memory);
        assert!("gcs".parse::<StoreBackendKind>().is_err());
    }
}
