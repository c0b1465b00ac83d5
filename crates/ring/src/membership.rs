//! Storage for the ring membership table.
//!
//! The ring only reads membership through [`MembershipStore::snapshot`]; the
//! [`Lifecycler`](crate::Lifecycler) is the only writer for its own entry.
//! External KV stores (Consul, etcd, memberlist) plug in behind the trait.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::desc::{InstanceDesc, InstanceState, RingDesc};
use crate::error::RingError;

#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Current membership table.
    async fn snapshot(&self) -> Result<RingDesc, RingError>;

    /// Insert or replace an instance entry.
    async fn register(&self, id: &str, desc: InstanceDesc) -> Result<(), RingError>;

    /// Refresh an instance's heartbeat timestamp.
    async fn heartbeat(&self, id: &str, at: DateTime<Utc>) -> Result<(), RingError>;

    /// Change an instance's lifecycle state.
    async fn set_state(&self, id: &str, state: InstanceState) -> Result<(), RingError>;

    /// Remove an instance entry. Removing an unknown id is not an error.
    async fn remove(&self, id: &str) -> Result<(), RingError>;
}

/// Process-local membership table, shared by every ring and lifecycler holding it.
#[derive(Debug, Default)]
pub struct InMemoryMembership {
    desc: Mutex<RingDesc>,
}

impl InMemoryMembership {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_desc<T>(&self, f: impl FnOnce(&mut RingDesc) -> T) -> Result<T, RingError> {
        let mut guard = self
            .desc
            .lock()
            .map_err(|e| RingError::Store(format!("membership lock poisoned: {e}")))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl MembershipStore for InMemoryMembership {
    async fn snapshot(&self) -> Result<RingDesc, RingError> {
        self.with_desc(|d| d.clone())
    }

    async fn register(&self, id: &str, desc: InstanceDesc) -> Result<(), RingError> {
        self.with_desc(|d| {
            d.instances.insert(id.to_string(), desc);
        })
    }

    async fn heartbeat(&self, id: &str, at: DateTime<Utc>) -> Result<(), RingError> {
        self.with_desc(|d| match d.instances.get_mut(id) {
            Some(inst) => {
                inst.heartbeat = at;
                Ok(())
            }
            None => Err(RingError::UnknownInstance(id.to_string())),
        })?
    }

    async fn set_state(&self, id: &str, state: InstanceState) -> Result<(), RingError> {
        self.with_desc(|d| match d.instances.get_mut(id) {
            Some(inst) => {
                inst.state = state;
                Ok(())
            }
            None => Err(RingError::UnknownInstance(id.to_string())),
        })?
    }

    async fn remove(&self, id: &str) -> Result<(), RingError> {
        self.with_desc(|d| {
            d.instances.remove(id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(addr: &str) -> InstanceDesc {
        InstanceDesc {
            addr: addr.to_string(),
            tokens: vec![1, 2, 3],
            state: InstanceState::Active,
            heartbeat: Utc::now(),
        }
    }

    #[tokio::test]
    async fn register_then_remove() {
        let store = InMemoryMembership::new();
        store.register("a", desc("10.0.0.1:9009")).await.unwrap();
        assert_eq!(store.snapshot().await.unwrap().instances.len(), 1);

        store.set_state("a", InstanceState::Leaving).await.unwrap();
        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.instances["a"].state, InstanceState::Leaving);

        store.remove("a").await.unwrap();
        assert!(store.snapshot().await.unwrap().instances.is_empty());
        // Removing twice is fine.
        store.remove("a").await.unwrap();
    }

    #[tokio::test]
    async fn heartbeat_unknown_instance_fails() {
        let store = InMemoryMembership::new();
        let err = store.heartbeat("ghost", Utc::now()).await.unwrap_err();
        assert_eq!(err, RingError::UnknownInstance("ghost".into()));
    }
}
