//! Cluster location subsystem.
//!
//! A [`Cluster`] turns a logical `(name, kind)` into the [`Pid`] of a live
//! actor somewhere in the cluster:
//!
//! ```text
//!   Cluster::get(name, kind)
//!        │
//!        ├─ LocationCache hit ──────────────────────────────► (pid, Ok)
//!        │
//!        ├─ MemberList::get_partition ── no member ─────────► (None, Unavailable)
//!        │        (MemberStrategy per kind, Rendezvous by default)
//!        │
//!        └─ request ActivationRequest to partition-{kind} on the owner
//!                 │
//!                 ├─ Ok ─► LocationCache::try_add ──────────► (pid, Ok)
//!                 ├─ other status ──────────────────────────► passed through
//!                 ├─ timed out / cancelled ─────────────────► (None, Timeout)
//!                 └─ anything else ─────────────────────────► (None, Error)
//! ```
//!
//! Membership comes from a [`ClusterProvider`], which publishes topology
//! snapshots on the cluster's event stream. The [`MemberList`] diffs them
//! into join/leave events, and the [`LocationCache`] drops every entry of
//! a member that left or rejoined.
//!
//! [`Pid`]: crate::actor::Pid

mod activator;
mod config;
mod in_memory;
mod location_cache;
mod member;
mod member_list;
mod member_strategy;
mod provider;
mod rendezvous;
mod runtime;

pub use activator::{
    activator_name, activator_pid, ActivationRequest, ActivationResponse, ResponseStatusCode,
};
pub use config::{ClusterConfig, ClusterConfigBuilder, ClusterConfigError, DEFAULT_REQUEST_TIMEOUT};
pub use in_memory::{InMemoryClusterProvider, InMemoryProviderOptions, MembershipTable};
pub use location_cache::{LocationCache, WATCHER_NAME};
pub use member::{ClusterEvent, MemberStatus, MemberStatusValue};
pub use member_list::MemberList;
pub use member_strategy::{MemberStrategy, MemberStrategyBuilder};
pub use provider::{ClusterProvider, ClusterProviderError};
pub use rendezvous::Rendezvous;
pub use runtime::{Cluster, ClusterError};
