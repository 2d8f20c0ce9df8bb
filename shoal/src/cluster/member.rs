//! Cluster members and topology events.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Application-defined opaque member status, compared bytewise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberStatusValue(pub Vec<u8>);

impl From<&str> for MemberStatusValue {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

/// One member as reported by the cluster provider.
#[derive(Debug, Clone)]
pub struct MemberStatus {
    member_id: String,
    host: String,
    port: u16,
    address: String,
    kinds: Vec<String>,
    alive: bool,
    status_value: Option<MemberStatusValue>,
    last_seen: Instant,
}

impl MemberStatus {
    /// Build a member status. `member_id` changes whenever the member
    /// re-registers, which is how rejoins are told apart from updates.
    pub fn new(
        member_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        kinds: Vec<String>,
        alive: bool,
    ) -> Self {
        let host = host.into();
        let address = format!("{host}:{port}");
        Self {
            member_id: member_id.into(),
            host,
            port,
            address,
            kinds,
            alive,
            status_value: None,
            last_seen: Instant::now(),
        }
    }

    /// Attach a status value.
    pub fn with_status_value(mut self, value: Option<MemberStatusValue>) -> Self {
        self.status_value = value;
        self
    }

    /// Set the last time the member was heard from.
    pub fn with_last_seen(mut self, last_seen: Instant) -> Self {
        self.last_seen = last_seen;
        self
    }

    /// Registration identity.
    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    /// Host name or IP.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, the address used in pids.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Kinds this member can activate.
    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    /// Whether the member supports `kind`.
    pub fn supports(&self, kind: &str) -> bool {
        self.kinds.iter().any(|k| k == kind)
    }

    /// Whether the member is considered alive.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Application status value.
    pub fn status_value(&self) -> Option<&MemberStatusValue> {
        self.status_value.as_ref()
    }

    /// Last time the member was heard from.
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.alive { "alive" } else { "dead" };
        write!(f, "{} ({}, {})", self.address, self.member_id, state)
    }
}

/// Topology notifications published on the cluster event stream.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    /// Full member snapshot pushed by the provider.
    TopologyChanged(Vec<MemberStatus>),
    /// A member became alive.
    MemberJoined(MemberStatus),
    /// A member died or disappeared.
    MemberLeft(MemberStatus),
    /// A member re-registered at the same address with a new identity.
    MemberRejoined(MemberStatus),
    /// A member's status value changed.
    MemberStatusValueChanged(MemberStatus),
}

impl ClusterEvent {
    /// The member a per-member event is about.
    pub fn member(&self) -> Option<&MemberStatus> {
        match self {
            ClusterEvent::TopologyChanged(_) => None,
            ClusterEvent::MemberJoined(member)
            | ClusterEvent::MemberLeft(member)
            | ClusterEvent::MemberRejoined(member)
            | ClusterEvent::MemberStatusValueChanged(member) => Some(member),
        }
    }
}
