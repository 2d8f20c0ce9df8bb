//! In-process membership backend.
//!
//! [`MembershipTable`] plays the role of the shared registry (a Consul or
//! etcd stand-in); every [`InMemoryClusterProvider`] sharing the same table
//! sees the same cluster. Members heartbeat on a timer and are reported dead
//! once their last heartbeat is older than the TTL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::member::{ClusterEvent, MemberStatus, MemberStatusValue};
use super::provider::{ClusterProvider, ClusterProviderError};
use crate::actor::EventStream;

/// Timing of an [`InMemoryClusterProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InMemoryProviderOptions {
    /// A member without heartbeat for this long is reported dead.
    pub ttl: Duration,
    /// Interval of heartbeats and topology polls.
    pub refresh_interval: Duration,
    /// A dead member is removed from the table after this much more time.
    pub deregister_critical: Duration,
}

impl Default for InMemoryProviderOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3),
            refresh_interval: Duration::from_secs(1),
            deregister_critical: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    status: MemberStatus,
    last_heartbeat: Instant,
}

/// Shared registry of members, keyed by cluster name then address.
#[derive(Debug, Default)]
pub struct MembershipTable {
    clusters: Mutex<HashMap<String, HashMap<String, Record>>>,
    next_member_id: AtomicU64,
}

impl MembershipTable {
    /// An empty table.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert or replace the member at `status.address()`.
    pub fn register(&self, cluster_name: &str, status: MemberStatus) {
        let record = Record {
            status,
            last_heartbeat: Instant::now(),
        };
        self.clusters
            .lock()
            .entry(cluster_name.to_string())
            .or_default()
            .insert(record.status.address().to_string(), record);
    }

    /// Refresh a member's heartbeat. False if that registration is gone.
    pub fn heartbeat(&self, cluster_name: &str, address: &str, member_id: &str) -> bool {
        let mut clusters = self.clusters.lock();
        match clusters
            .get_mut(cluster_name)
            .and_then(|members| members.get_mut(address))
        {
            Some(record) if record.status.member_id() == member_id => {
                record.last_heartbeat = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Replace a member's status value. False if that registration is gone.
    pub fn update_status_value(
        &self,
        cluster_name: &str,
        address: &str,
        member_id: &str,
        value: Option<MemberStatusValue>,
    ) -> bool {
        let mut clusters = self.clusters.lock();
        match clusters
            .get_mut(cluster_name)
            .and_then(|members| members.get_mut(address))
        {
            Some(record) if record.status.member_id() == member_id => {
                record.status = record.status.clone().with_status_value(value);
                true
            }
            _ => false,
        }
    }

    /// Remove a registration. Newer registrations at the same address stay.
    pub fn remove(&self, cluster_name: &str, address: &str, member_id: &str) {
        let mut clusters = self.clusters.lock();
        if let Some(members) = clusters.get_mut(cluster_name) {
            if members
                .get(address)
                .is_some_and(|record| record.status.member_id() == member_id)
            {
                members.remove(address);
            }
        }
    }

    /// Current members of `cluster_name`, alive if heard from within `ttl`.
    /// Members silent for longer than `ttl + deregister_critical` are purged.
    pub fn snapshot(
        &self,
        cluster_name: &str,
        ttl: Duration,
        deregister_critical: Duration,
    ) -> Vec<MemberStatus> {
        let mut clusters = self.clusters.lock();
        let Some(members) = clusters.get_mut(cluster_name) else {
            return Vec::new();
        };
        members.retain(|_, record| record.last_heartbeat.elapsed() <= ttl + deregister_critical);
        let mut snapshot: Vec<MemberStatus> = members
            .values()
            .map(|record| {
                let status = &record.status;
                MemberStatus::new(
                    status.member_id(),
                    status.host(),
                    status.port(),
                    status.kinds().to_vec(),
                    record.last_heartbeat.elapsed() <= ttl,
                )
                .with_status_value(status.status_value().cloned())
                .with_last_seen(record.last_heartbeat)
            })
            .collect();
        snapshot.sort_by(|a, b| a.address().cmp(b.address()));
        snapshot
    }

    fn next_member_id(&self, address: &str) -> String {
        let n = self.next_member_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{address}#{n}")
    }
}

#[derive(Debug, Clone)]
struct Registration {
    cluster_name: String,
    address: String,
    member_id: String,
    token: CancellationToken,
}

/// [`ClusterProvider`] over a shared [`MembershipTable`].
#[derive(Debug)]
pub struct InMemoryClusterProvider {
    table: Arc<MembershipTable>,
    options: InMemoryProviderOptions,
    registration: Mutex<Option<Registration>>,
    token: CancellationToken,
}

impl InMemoryClusterProvider {
    /// A provider using default timings.
    pub fn new(table: Arc<MembershipTable>) -> Self {
        Self::with_options(table, InMemoryProviderOptions::default())
    }

    /// A provider using `options`.
    pub fn with_options(table: Arc<MembershipTable>, options: InMemoryProviderOptions) -> Self {
        Self {
            table,
            options,
            registration: Mutex::new(None),
            token: CancellationToken::new(),
        }
    }

    /// The shared table.
    pub fn table(&self) -> &Arc<MembershipTable> {
        &self.table
    }

    /// Timings in use.
    pub fn options(&self) -> InMemoryProviderOptions {
        self.options
    }

    fn current(&self) -> Result<Registration, ClusterProviderError> {
        if self.token.is_cancelled() {
            return Err(ClusterProviderError::Shutdown);
        }
        self.registration
            .lock()
            .clone()
            .ok_or(ClusterProviderError::NotRegistered)
    }

    fn spawn_heartbeat(&self, registration: Registration) {
        let table = Arc::clone(&self.table);
        let interval = self.options.refresh_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = registration.token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if !table.heartbeat(
                    &registration.cluster_name,
                    &registration.address,
                    &registration.member_id,
                ) {
                    tracing::warn!(member = %registration.address, "registration lost, heartbeat stopped");
                    break;
                }
            }
        });
    }
}

#[async_trait::async_trait]
impl ClusterProvider for InMemoryClusterProvider {
    async fn register_member(
        &self,
        cluster_name: &str,
        host: &str,
        port: u16,
        kinds: &[String],
        status_value: Option<MemberStatusValue>,
    ) -> Result<(), ClusterProviderError> {
        if self.token.is_cancelled() {
            return Err(ClusterProviderError::Shutdown);
        }
        let address = format!("{host}:{port}");
        let registration = {
            let mut current = self.registration.lock();
            if current.is_some() {
                return Err(ClusterProviderError::AlreadyRegistered(address));
            }
            let registration = Registration {
                cluster_name: cluster_name.to_string(),
                member_id: self.table.next_member_id(&address),
                address,
                token: self.token.child_token(),
            };
            *current = Some(registration.clone());
            registration
        };

        let status = MemberStatus::new(
            registration.member_id.clone(),
            host,
            port,
            kinds.to_vec(),
            true,
        )
        .with_status_value(status_value);
        self.table.register(cluster_name, status);
        tracing::info!(cluster = %cluster_name, member = %registration.address, id = %registration.member_id, "member registered");
        self.spawn_heartbeat(registration);
        Ok(())
    }

    async fn update_member_status_value(
        &self,
        status_value: Option<MemberStatusValue>,
    ) -> Result<(), ClusterProviderError> {
        let registration = self.current()?;
        if self.table.update_status_value(
            &registration.cluster_name,
            &registration.address,
            &registration.member_id,
            status_value,
        ) {
            Ok(())
        } else {
            Err(ClusterProviderError::NotRegistered)
        }
    }

    async fn deregister_member(&self) -> Result<(), ClusterProviderError> {
        let registration = self
            .registration
            .lock()
            .take()
            .ok_or(ClusterProviderError::NotRegistered)?;
        registration.token.cancel();
        self.table.remove(
            &registration.cluster_name,
            &registration.address,
            &registration.member_id,
        );
        tracing::info!(member = %registration.address, "member deregistered");
        Ok(())
    }

    fn monitor_member_status_changes(&self, events: EventStream<ClusterEvent>) {
        let Ok(registration) = self.current() else {
            tracing::warn!("cannot monitor membership before registering");
            return;
        };
        let table = Arc::clone(&self.table);
        let options = self.options;
        let token = self.token.clone();
        tokio::spawn(async move {
            let mut last: Option<Vec<MemberStatus>> = None;
            loop {
                let snapshot = table.snapshot(
                    &registration.cluster_name,
                    options.ttl,
                    options.deregister_critical,
                );
                if last.as_ref().map_or(true, |last| changed(last, &snapshot)) {
                    events.publish(&ClusterEvent::TopologyChanged(snapshot.clone()));
                    last = Some(snapshot);
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(options.refresh_interval) => {}
                }
            }
        });
    }

    async fn cluster_addresses(&self) -> Result<Vec<String>, ClusterProviderError> {
        let registration = self.current()?;
        Ok(self
            .table
            .snapshot(
                &registration.cluster_name,
                self.options.ttl,
                self.options.deregister_critical,
            )
            .into_iter()
            .filter(MemberStatus::is_alive)
            .map(|m| m.address().to_string())
            .collect())
    }

    async fn shutdown(&self) -> Result<(), ClusterProviderError> {
        self.token.cancel();
        Ok(())
    }
}

fn changed(old: &[MemberStatus], new: &[MemberStatus]) -> bool {
    old.len() != new.len()
        || old.iter().zip(new).any(|(a, b)| {
            a.address() != b.address()
                || a.member_id() != b.member_id()
                || a.is_alive() != b.is_alive()
                || a.status_value() != b.status_value()
        })
}
