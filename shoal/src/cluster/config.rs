//! Cluster configuration.
//!
//! [`ClusterConfig`] names the cluster, gives the local member's address,
//! the membership provider and the kinds this member can activate.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ClusterConfig::builder()
//!     .name("game")
//!     .address("127.0.0.1", 4000)
//!     .provider(Arc::new(InMemoryClusterProvider::new(table)))
//!     .kind("Player", Props::from_producer(Player::default))
//!     .build()?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use super::member::MemberStatusValue;
use super::member_strategy::MemberStrategyBuilder;
use super::provider::ClusterProvider;
use crate::actor::Props;

/// Default bound of an activation round-trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration of one cluster member.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    name: String,
    host: String,
    port: u16,
    provider: Arc<dyn ClusterProvider>,
    kinds: Vec<(String, Props)>,
    request_timeout: Duration,
    status_value: Option<MemberStatusValue>,
    member_strategy: MemberStrategyBuilder,
}

impl ClusterConfig {
    /// Start building a cluster configuration.
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder {
            name: None,
            address: None,
            provider: None,
            kinds: Vec::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            status_value: None,
            member_strategy: MemberStrategyBuilder::default(),
        }
    }

    /// Cluster name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host of the local member.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port of the local member.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` of the local member.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The membership provider.
    pub fn provider(&self) -> &Arc<dyn ClusterProvider> {
        &self.provider
    }

    /// Kinds this member can activate, in registration order.
    pub fn kinds(&self) -> &[(String, Props)] {
        &self.kinds
    }

    /// Names of the kinds this member can activate.
    pub fn kind_names(&self) -> Vec<String> {
        self.kinds.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Bound of an activation round-trip.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Status value announced at registration.
    pub fn status_value(&self) -> Option<&MemberStatusValue> {
        self.status_value.as_ref()
    }

    /// Placement strategy builder, rendezvous unless overridden.
    pub fn member_strategy(&self) -> &MemberStrategyBuilder {
        &self.member_strategy
    }
}

/// Builder for [`ClusterConfig`].
pub struct ClusterConfigBuilder {
    name: Option<String>,
    address: Option<(String, u16)>,
    provider: Option<Arc<dyn ClusterProvider>>,
    kinds: Vec<(String, Props)>,
    request_timeout: Duration,
    status_value: Option<MemberStatusValue>,
    member_strategy: MemberStrategyBuilder,
}

impl ClusterConfigBuilder {
    /// Set the cluster name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the local member's address. Must match the actor system's.
    pub fn address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.address = Some((host.into(), port));
        self
    }

    /// Set the membership provider.
    pub fn provider(mut self, provider: Arc<dyn ClusterProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Make `kind` activatable on this member with `props`.
    ///
    /// Registering a kind twice keeps the last props.
    pub fn kind(mut self, kind: impl Into<String>, props: Props) -> Self {
        let kind = kind.into();
        self.kinds.retain(|(existing, _)| *existing != kind);
        self.kinds.push((kind, props));
        self
    }

    /// Bound activation round-trips. Defaults to [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Status value announced at registration.
    pub fn status_value(mut self, value: MemberStatusValue) -> Self {
        self.status_value = Some(value);
        self
    }

    /// Place kinds with `strategy` instead of rendezvous hashing.
    ///
    /// Every member of a cluster must use the same strategy.
    pub fn member_strategy(mut self, strategy: MemberStrategyBuilder) -> Self {
        self.member_strategy = strategy;
        self
    }

    /// Build the cluster configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the name, the address or the provider is missing.
    pub fn build(self) -> Result<ClusterConfig, ClusterConfigError> {
        let name = self.name.ok_or(ClusterConfigError::MissingName)?;
        let (host, port) = self.address.ok_or(ClusterConfigError::MissingAddress)?;
        let provider = self.provider.ok_or(ClusterConfigError::MissingProvider)?;
        Ok(ClusterConfig {
            name,
            host,
            port,
            provider,
            kinds: self.kinds,
            request_timeout: self.request_timeout,
            status_value: self.status_value,
            member_strategy: self.member_strategy,
        })
    }
}

/// Errors from building a [`ClusterConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterConfigError {
    /// No cluster name.
    #[error("cluster config requires a name")]
    MissingName,
    /// No member address.
    #[error("cluster config requires the member address (call address())")]
    MissingAddress,
    /// No membership provider.
    #[error("cluster config requires a cluster provider")]
    MissingProvider,
}
