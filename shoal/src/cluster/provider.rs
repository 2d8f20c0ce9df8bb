//! Membership backend boundary.

use std::fmt;

use super::member::{ClusterEvent, MemberStatusValue};
use crate::actor::EventStream;

/// Failures reported by a [`ClusterProvider`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterProviderError {
    /// An operation needing registration ran before `register_member`.
    #[error("member is not registered")]
    NotRegistered,

    /// The member was already registered by this provider.
    #[error("member {0} is already registered")]
    AlreadyRegistered(String),

    /// The provider was shut down.
    #[error("provider is shut down")]
    Shutdown,

    /// The backend rejected or failed the operation.
    #[error("backend error: {0}")]
    Backend(String),
}

/// A pluggable membership backend.
///
/// A provider registers the local member, keeps it alive, and pushes
/// [`ClusterEvent::TopologyChanged`] snapshots onto the event stream handed
/// to [`ClusterProvider::monitor_member_status_changes`].
#[async_trait::async_trait]
pub trait ClusterProvider: Send + Sync + fmt::Debug {
    /// Announce this member and start keeping it alive.
    async fn register_member(
        &self,
        cluster_name: &str,
        host: &str,
        port: u16,
        kinds: &[String],
        status_value: Option<MemberStatusValue>,
    ) -> Result<(), ClusterProviderError>;

    /// Replace this member's status value.
    async fn update_member_status_value(
        &self,
        status_value: Option<MemberStatusValue>,
    ) -> Result<(), ClusterProviderError>;

    /// Remove this member from the cluster.
    async fn deregister_member(&self) -> Result<(), ClusterProviderError>;

    /// Start publishing topology snapshots on `events`.
    fn monitor_member_status_changes(&self, events: EventStream<ClusterEvent>);

    /// Addresses of the currently alive members.
    async fn cluster_addresses(&self) -> Result<Vec<String>, ClusterProviderError>;

    /// Stop background work.
    async fn shutdown(&self) -> Result<(), ClusterProviderError>;
}
