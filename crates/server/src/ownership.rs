//! Which replica evaluates a rule group.
//!
//! With sharding enabled a group belongs to the primary (first) replica the
//! ring returns for the group's token. A failed ring lookup counts as owned:
//! evaluating a group twice is tolerable, silently skipping it is not.

use std::sync::Arc;

use prometheus::IntCounter;
use tracing::{debug, warn};

use ruler_ring::{group_token, Operation, ReadRing};
use ruler_rules::RuleGroupDesc;

pub enum Ownership {
    /// Every group is owned.
    Unsharded,
    Sharded {
        ring: Arc<dyn ReadRing>,
        /// Address this replica advertises in the ring.
        addr: String,
        ring_check_errors: IntCounter,
    },
}

impl Ownership {
    pub fn sharded(ring: Arc<dyn ReadRing>, addr: impl Into<String>, ring_check_errors: IntCounter) -> Self {
        Ownership::Sharded {
            ring,
            addr: addr.into(),
            ring_check_errors,
        }
    }

    pub fn is_sharded(&self) -> bool {
        matches!(self, Ownership::Sharded { .. })
    }

    pub fn owns(&self, token: u32) -> bool {
        let Ownership::Sharded {
            ring,
            addr,
            ring_check_errors,
        } = self
        else {
            return true;
        };

        let set = match ring.get(token, Operation::Read) {
            Ok(set) => set,
            Err(e) => {
                warn!(token, error = %e, "error reading ring to verify rule group ownership");
                ring_check_errors.inc();
                return true;
            }
        };

        match set.primary() {
            Some(primary) if primary.addr == *addr => {
                debug!(token, owner_addr = %primary.addr, "rule group owned");
                true
            }
            Some(primary) => {
                debug!(token, owner_addr = %primary.addr, addr = %addr, "rule group not owned");
                false
            }
            None => {
                warn!(token, "ring returned an empty replication set");
                ring_check_errors.inc();
                true
            }
        }
    }

    pub fn owns_group(&self, desc: &RuleGroupDesc) -> bool {
        self.owns(group_token(desc.tenant.as_str(), &desc.namespace, &desc.name))
    }
}
