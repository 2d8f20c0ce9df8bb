//! The locally known cluster topology.
//!
//! Each provider snapshot is diffed against the current one; the result is
//! swapped in as a whole and the differences are published as
//! [`ClusterEvent`]s. Readers clone an `Arc` to the snapshot and never
//! observe a half-applied update.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::member::{ClusterEvent, MemberStatus};
use super::member_strategy::{MemberStrategy, MemberStrategyBuilder};
use crate::actor::{EventStream, Subscription};

#[derive(Debug, Default)]
struct MemberSnapshot {
    /// Alive members by address, ordered so every node iterates alike.
    members: BTreeMap<String, MemberStatus>,
    partitions: HashMap<String, Box<dyn MemberStrategy>>,
}

impl MemberSnapshot {
    fn new(members: BTreeMap<String, MemberStatus>, strategy: &MemberStrategyBuilder) -> Self {
        let mut partitions: HashMap<String, Vec<&MemberStatus>> = HashMap::new();
        for member in members.values() {
            for kind in member.kinds() {
                partitions.entry(kind.clone()).or_default().push(member);
            }
        }
        let partitions = partitions
            .into_iter()
            .map(|(kind, members)| {
                let placement = strategy.build(&kind, &members);
                (kind, placement)
            })
            .collect();
        Self {
            members,
            partitions,
        }
    }
}

/// Current membership and per-kind placement.
#[derive(Debug)]
pub struct MemberList {
    snapshot: RwLock<Arc<MemberSnapshot>>,
    strategy: MemberStrategyBuilder,
    events: EventStream<ClusterEvent>,
    subscription: Mutex<Option<Subscription>>,
}

impl MemberList {
    /// An empty member list publishing on `events`, placing by rendezvous.
    pub fn new(events: EventStream<ClusterEvent>) -> Arc<Self> {
        Self::with_strategy(events, MemberStrategyBuilder::default())
    }

    /// An empty member list placing each kind with `strategy`.
    pub fn with_strategy(
        events: EventStream<ClusterEvent>,
        strategy: MemberStrategyBuilder,
    ) -> Arc<Self> {
        Arc::new(Self {
            snapshot: RwLock::new(Arc::new(MemberSnapshot::default())),
            strategy,
            events,
            subscription: Mutex::new(None),
        })
    }

    /// Follow [`ClusterEvent::TopologyChanged`] on the event stream.
    pub fn subscribe(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let subscription = self.events.subscribe(move |event| {
            if let (ClusterEvent::TopologyChanged(members), Some(list)) = (event, weak.upgrade()) {
                list.update_topology(members);
            }
        });
        if let Some(previous) = self.subscription.lock().replace(subscription) {
            self.events.unsubscribe(previous);
        }
    }

    /// Stop following topology changes.
    pub fn unsubscribe(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            self.events.unsubscribe(subscription);
        }
    }

    /// Apply a full member snapshot and publish the differences.
    pub fn update_topology(&self, statuses: &[MemberStatus]) {
        let alive: BTreeMap<String, MemberStatus> = statuses
            .iter()
            .filter(|m| m.is_alive())
            .map(|m| (m.address().to_string(), m.clone()))
            .collect();

        let events = {
            let mut snapshot = self.snapshot.write();
            let events = diff(&snapshot.members, &alive);
            if events.is_empty() && same_members(&snapshot.members, &alive) {
                return;
            }
            *snapshot = Arc::new(MemberSnapshot::new(alive, &self.strategy));
            events
        };

        for event in &events {
            match event {
                ClusterEvent::MemberJoined(m) => tracing::info!(member = %m, "member joined"),
                ClusterEvent::MemberLeft(m) => tracing::info!(member = %m, "member left"),
                ClusterEvent::MemberRejoined(m) => tracing::info!(member = %m, "member rejoined"),
                _ => {}
            }
            self.events.publish(event);
        }
    }

    /// Address of the member owning `name` for `kind`.
    pub fn get_partition(&self, name: &str, kind: &str) -> Option<String> {
        let snapshot = Arc::clone(&self.snapshot.read());
        snapshot
            .partitions
            .get(kind)
            .and_then(|placement| placement.get_partition(name))
    }

    /// Alive members, ordered by address.
    pub fn members(&self) -> Vec<MemberStatus> {
        self.snapshot.read().members.values().cloned().collect()
    }

    /// Whether `address` is an alive member.
    pub fn contains(&self, address: &str) -> bool {
        self.snapshot.read().members.contains_key(address)
    }
}

fn same_members(old: &BTreeMap<String, MemberStatus>, new: &BTreeMap<String, MemberStatus>) -> bool {
    old.len() == new.len()
        && old
            .iter()
            .zip(new.iter())
            .all(|((a, m), (b, n))| a == b && m.kinds() == n.kinds())
}

fn diff(
    old: &BTreeMap<String, MemberStatus>,
    new: &BTreeMap<String, MemberStatus>,
) -> Vec<ClusterEvent> {
    let mut events = Vec::new();
    for (address, member) in old {
        if !new.contains_key(address) {
            let left = MemberStatus::new(
                member.member_id(),
                member.host(),
                member.port(),
                member.kinds().to_vec(),
                false,
            )
            .with_status_value(member.status_value().cloned())
            .with_last_seen(member.last_seen());
            events.push(ClusterEvent::MemberLeft(left));
        }
    }
    for (address, member) in new {
        match old.get(address) {
            None => events.push(ClusterEvent::MemberJoined(member.clone())),
            Some(previous) if previous.member_id() != member.member_id() => {
                events.push(ClusterEvent::MemberRejoined(member.clone()));
            }
            Some(previous) if previous.status_value() != member.status_value() => {
                events.push(ClusterEvent::MemberStatusValueChanged(member.clone()));
            }
            Some(_) => {}
        }
    }
    events
}
