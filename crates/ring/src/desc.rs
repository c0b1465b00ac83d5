//! Ring membership descriptors.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a ring member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Pending,
    Joining,
    Active,
    Leaving,
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstanceState::Pending => "PENDING",
            InstanceState::Joining => "JOINING",
            InstanceState::Active => "ACTIVE",
            InstanceState::Leaving => "LEAVING",
        };
        f.write_str(s)
    }
}

/// A single replica as it reports itself to the ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDesc {
    pub addr: String,
    pub tokens: Vec<u32>,
    pub state: InstanceState,
    pub heartbeat: DateTime<Utc>,
}

impl InstanceDesc {
    /// Whether the instance has heartbeated within `timeout` of `now`.
    pub fn is_alive(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let age = now.signed_duration_since(self.heartbeat);
        age <= chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX)
    }
}

/// The full membership table, keyed by instance id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RingDesc {
    pub instances: BTreeMap<String, InstanceDesc>,
}

impl RingDesc {
    /// All tokens in the ring, sorted, paired with their owning instance id.
    pub fn sorted_tokens(&self) -> Vec<(u32, String)> {
        let mut tokens: Vec<(u32, String)> = self
            .instances
            .iter()
            .flat_map(|(id, inst)| inst.tokens.iter().map(move |t| (*t, id.clone())))
            .collect();
        tokens.sort();
        tokens
    }

    /// Every token currently claimed by some member.
    pub fn taken_tokens(&self) -> std::collections::HashSet<u32> {
        self.instances
            .values()
            .flat_map(|i| i.tokens.iter().copied())
            .collect()
    }
}

/// Ordered replicas responsible for a token; the first entry is the primary.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationSet {
    pub instances: Vec<InstanceDesc>,
}

impl ReplicationSet {
    pub fn primary(&self) -> Option<&InstanceDesc> {
        self.instances.first()
    }
}
