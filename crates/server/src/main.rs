//! ruler: evaluates tenants' recording and alerting rules on a schedule.
//!
//! # Usage
//!
//! ```bash
//! # Single replica, rules on local disk
//! ruler --query-url http://localhost:9090 --alertmanager-url http://localhost:9093
//!
//! # Sharded replica
//! RULER_ENABLE_SHARDING=true RULER_RING_INSTANCE_ADDR=10.0.0.1:9009 ruler
//! ```
//!
//! Every flag falls back to its environment variable, and any setting without
//! a flag is read from `RULER_*` variables (a `.env` file is loaded first).

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use ruler_core::config::{load_dotenv, Config};
use ruler_core::parse_duration;
use ruler_rules::{DiscardPusher, HttpPusher, HttpQueryEngine, Pusher};
use ruler_server::http::{self, AppState};
use ruler_server::{Ruler, RulerDeps};
use ruler_storage::RulerStorage;

/// Multi-tenant rule evaluation service.
#[derive(Parser, Debug)]
#[command(name = "ruler", version, about)]
struct Cli {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "RULER_HOST")]
    host: Option<String>,

    /// Port for the HTTP server.
    #[arg(long, env = "RULER_PORT")]
    port: Option<u16>,

    /// Configuration profile (prefix for every `RULER_*` variable).
    #[arg(long, env = "RULER_PROFILE", default_value = "")]
    profile: String,

    /// Number of concurrent group evaluators.
    #[arg(long, env = "RULER_NUM_WORKERS")]
    num_workers: Option<usize>,

    /// Rule store poll interval and default group interval, e.g. `15s`.
    #[arg(long, env = "RULER_EVALUATION_INTERVAL")]
    evaluation_interval: Option<String>,

    /// Alertmanager base URL.
    #[arg(long, env = "RULER_ALERTMANAGER_URL")]
    alertmanager_url: Option<String>,

    /// Base URL of the Prometheus-compatible query API.
    #[arg(long, env = "RULER_QUERY_URL")]
    query_url: Option<String>,

    /// Shard rule groups across replicas using the ring.
    #[arg(long, env = "RULER_ENABLE_SHARDING")]
    enable_sharding: Option<bool>,
}

impl Cli {
    fn apply(self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(n) = self.num_workers {
            config.ruler.num_workers = n;
            config.ruler.work_queue_capacity = n;
        }
        if let Some(raw) = self.evaluation_interval {
            config.ruler.evaluation_interval = parse_duration(&raw)?;
        }
        if let Some(url) = self.alertmanager_url {
            config.ruler.alertmanager_url = Some(url);
        }
        if let Some(url) = self.query_url {
            config.engine.query_url = url;
        }
        if let Some(enabled) = self.enable_sharding {
            config.ruler.enable_sharding = enabled;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let mut config = Config::for_profile(&cli.profile);
    cli.apply(&mut config)?;
    config.validate().context("invalid configuration")?;
    config.log_summary();

    let storage = RulerStorage::from_config(&config.store).context("failed to open rule store")?;
    let engine = Arc::new(
        HttpQueryEngine::new(&config.engine.query_url, config.engine.query_timeout)
            .context("failed to build query client")?,
    );
    let pusher: Arc<dyn Pusher> = match &config.engine.push_url {
        Some(url) => Arc::new(
            HttpPusher::new(url, config.engine.query_timeout)
                .context("failed to build push client")?,
        ),
        None => Arc::new(DiscardPusher),
    };

    let ruler = Arc::new(Ruler::new(
        config.ruler.clone(),
        config.ring.clone(),
        RulerDeps {
            store: storage.rules.clone(),
            engine,
            pusher,
            membership: None,
            transport: None,
        },
    )?);
    ruler.start().await?;

    let app = http::router(AppState {
        ruler: Arc::clone(&ruler),
        alerts: storage.alerts.clone(),
    });
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown signal received");
    ruler.stop().await;
    info!("ruler exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
