//! Fixed pool of group evaluators fed by the scheduler's work channel.
//!
//! Each group runs in its own task under the group timeout, so a panic or a
//! hung evaluation is recorded as a failure without taking the worker down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use ruler_rules::WrappedGroup;

use crate::metrics::RulerMetrics;

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        num_workers: usize,
        rx: mpsc::Receiver<WrappedGroup>,
        group_timeout: Duration,
        metrics: RulerMetrics,
    ) -> Self {
        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..num_workers)
            .map(|id| {
                let rx = Arc::clone(&rx);
                let metrics = metrics.clone();
                tokio::spawn(async move { run_worker(id, rx, group_timeout, metrics).await })
            })
            .collect();
        info!(workers = num_workers, "worker pool started");
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to drain the channel and exit.
    ///
    /// Only returns once the channel's sender side has been dropped.
    pub async fn wait(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task failed");
            }
        }
        info!("all workers exited");
    }
}

async fn run_worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<WrappedGroup>>>,
    group_timeout: Duration,
    metrics: RulerMetrics,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(group) = next else {
            break;
        };
        evaluate(id, group, group_timeout, &metrics).await;
    }
    debug!(worker = id, "worker exiting");
}

/// Evaluate one group in its own task, bounded by `timeout`.
pub(crate) async fn evaluate(
    worker: usize,
    group: WrappedGroup,
    timeout: Duration,
    metrics: &RulerMetrics,
) {
    let tenant = group.tenant().clone();
    let key = group.key();
    let start = Instant::now();

    let mut task = tokio::spawn(async move { group.eval(Utc::now()).await });
    let failed = match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(outcome)) => {
            debug!(worker, tenant = %tenant, group = %key, rules = outcome.rules, failed_rules = outcome.failed, "group evaluation finished");
            false
        }
        Ok(Err(e)) if e.is_panic() => {
            error!(worker, tenant = %tenant, group = %key, "rule group evaluation panicked");
            true
        }
        Ok(Err(e)) => {
            warn!(worker, tenant = %tenant, group = %key, error = %e, "rule group evaluation cancelled");
            true
        }
        Err(_) => {
            task.abort();
            warn!(worker, tenant = %tenant, group = %key, timeout = ?timeout, "rule group evaluation timed out");
            true
        }
    };

    if failed {
        metrics
            .group_evaluation_failures
            .with_label_values(&[tenant.as_str()])
            .inc();
    }
    metrics
        .group_evaluation_duration
        .observe(start.elapsed().as_secs_f64());
}
