//! Registers this replica in the ring and keeps its entry alive.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ruler_core::config::RingConfig;

use crate::desc::{InstanceDesc, InstanceState};
use crate::error::RingError;
use crate::membership::MembershipStore;

pub struct Lifecycler {
    id: String,
    addr: String,
    num_tokens: usize,
    heartbeat_period: Duration,
    store: Arc<dyn MembershipStore>,
    shutdown: Arc<Notify>,
    heartbeat_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Lifecycler {
    pub fn new(cfg: &RingConfig, store: Arc<dyn MembershipStore>) -> Self {
        Self {
            id: cfg.instance_id.clone(),
            addr: cfg.instance_addr.clone(),
            num_tokens: cfg.num_tokens,
            heartbeat_period: cfg.heartbeat_period,
            store,
            shutdown: Arc::new(Notify::new()),
            heartbeat_handle: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Address advertised to the ring; ownership compares against it.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Claim tokens, register as ACTIVE and start heartbeating.
    ///
    /// Tokens already held by this id are reused so a restart keeps its shards.
    pub async fn join(&self) -> Result<(), RingError> {
        let desc = self.store.snapshot().await?;
        let tokens = match desc.instances.get(&self.id) {
            Some(existing) if !existing.tokens.is_empty() => existing.tokens.clone(),
            _ => generate_tokens(self.num_tokens, &desc.taken_tokens()),
        };

        self.store
            .register(
                &self.id,
                InstanceDesc {
                    addr: self.addr.clone(),
                    tokens,
                    state: InstanceState::Active,
                    heartbeat: Utc::now(),
                },
            )
            .await?;

        let store = Arc::clone(&self.store);
        let shutdown = Arc::clone(&self.shutdown);
        let id = self.id.clone();
        let period = self.heartbeat_period;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = store.heartbeat(&id, Utc::now()).await {
                            warn!(instance = %id, error = %e, "ring heartbeat failed");
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
            debug!(instance = %id, "heartbeat loop stopped");
        });
        if let Ok(mut slot) = self.heartbeat_handle.lock() {
            *slot = Some(handle);
        }

        info!(instance = %self.id, addr = %self.addr, tokens = self.num_tokens, "joined ring");
        Ok(())
    }

    /// Stop heartbeating, mark the entry LEAVING, then remove it.
    pub async fn shutdown(&self) -> Result<(), RingError> {
        self.shutdown.notify_one();
        let handle = self.heartbeat_handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "heartbeat task ended abnormally");
            }
        }

        match self.store.set_state(&self.id, InstanceState::Leaving).await {
            Ok(()) | Err(RingError::UnknownInstance(_)) => {}
            Err(e) => return Err(e),
        }
        self.store.remove(&self.id).await?;
        info!(instance = %self.id, "left ring");
        Ok(())
    }
}

/// `n` random tokens not present in `taken`, sorted.
fn generate_tokens(n: usize, taken: &HashSet<u32>) -> Vec<u32> {
    let mut rng = rand::thread_rng();
    let mut out: HashSet<u32> = HashSet::with_capacity(n);
    while out.len() < n {
        let candidate: u32 = rng.gen();
        if !taken.contains(&candidate) {
            out.insert(candidate);
        }
    }
    let mut tokens: Vec<u32> = out.into_iter().collect();
    tokens.sort_unstable();
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::InMemoryMembership;

    fn cfg(id: &str, addr: &str) -> RingConfig {
        RingConfig {
            instance_id: id.to_string(),
            instance_addr: addr.to_string(),
            num_tokens: 16,
            heartbeat_period: Duration::from_secs(1),
            ..RingConfig::default()
        }
    }

    #[test]
    fn generated_tokens_avoid_taken_ones() {
        let taken: HashSet<u32> = generate_tokens(64, &HashSet::new()).into_iter().collect();
        let fresh = generate_tokens(64, &taken);
        assert_eq!(fresh.len(), 64);
        assert!(fresh.iter().all(|t| !taken.contains(t)));
        assert!(fresh.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn join_registers_active_with_tokens() {
        let store = Arc::new(InMemoryMembership::new());
        let lc = Lifecycler::new(&cfg("r1", "10.0.0.1:9009"), store.clone());
        lc.join().await.unwrap();

        let desc = store.snapshot().await.unwrap();
        let me = &desc.instances["r1"];
        assert_eq!(me.addr, "10.0.0.1:9009");
        assert_eq!(me.state, InstanceState::Active);
        assert_eq!(me.tokens.len(), 16);

        lc.shutdown().await.unwrap();
        assert!(store.snapshot().await.unwrap().instances.is_empty());
    }

    #[tokio::test]
    async fn rejoin_keeps_existing_tokens() {
        let store = Arc::new(InMemoryMembership::new());
        let first = Lifecycler::new(&cfg("r1", "10.0.0.1:9009"), store.clone());
        first.join().await.unwrap();
        let tokens = store.snapshot().await.unwrap().instances["r1"].tokens.clone();

        let second = Lifecycler::new(&cfg("r1", "10.0.0.1:9009"), store.clone());
        second.join().await.unwrap();
        assert_eq!(store.snapshot().await.unwrap().instances["r1"].tokens, tokens);

        first.shutdown.notify_one();
        second.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_advances_timestamp() {
        let store = Arc::new(InMemoryMembership::new());
        let lc = Lifecycler::new(&cfg("r1", "a:1"), store.clone());
        lc.join().await.unwrap();
        let before = store.snapshot().await.unwrap().instances["r1"].heartbeat;

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let after = store.snapshot().await.unwrap().instances["r1"].heartbeat;
        assert!(after >= before);

        lc.shutdown().await.unwrap();
    }
}
