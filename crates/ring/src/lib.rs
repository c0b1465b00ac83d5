//! Hash ring used to shard rule groups across ruler replicas.
//!
//! This crate provides:
//! - Group tokens (FNV-1a over the group identity)
//! - A membership table ([`RingDesc`]) behind a pluggable [`MembershipStore`]
//! - The read path ([`Ring::get`]) returning the ordered replica set for a token
//! - A [`Lifecycler`] that joins, heartbeats and leaves the ring
//! - An HTML status page listing the members

pub mod desc;
pub mod error;
pub mod lifecycler;
pub mod membership;
pub mod ring;
pub mod status;
pub mod token;

pub use desc::{InstanceDesc, InstanceState, ReplicationSet, RingDesc};
pub use error::RingError;
pub use lifecycler::Lifecycler;
pub use membership::{InMemoryMembership, MembershipStore};
pub use ring::{Operation, ReadRing, Ring};
pub use token::group_token;
