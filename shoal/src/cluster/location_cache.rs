//! Name to pid cache for resolved cluster activations.
//!
//! Entries go away in two ways: the whole member's entries when it leaves
//! or rejoins, and a single entry when its actor terminates. The latter is
//! observed by a small watcher actor that watches every cached pid.

use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::member::ClusterEvent;
use crate::actor::{
    ActorError, ActorSystem, Context, EventStream, Message, Pid, Props, RootContext, SpawnError,
    Subscription, SupervisorStrategy, Terminated,
};

/// Registered name of the cache's watcher actor.
pub const WATCHER_NAME: &str = "location-cache-watcher";

#[derive(Debug)]
struct WatchLocation(Pid);

#[derive(Debug)]
struct UnwatchLocation(Pid);

#[derive(Debug)]
struct Watcher {
    root: RootContext,
    pid: Pid,
}

#[derive(Debug, Default)]
struct CacheInner {
    by_name: DashMap<String, Pid>,
    by_pid: DashMap<Pid, String>,
    watcher: Mutex<Option<Watcher>>,
    subscription: Mutex<Option<(EventStream<ClusterEvent>, Subscription)>>,
}

/// Process-wide cache of resolved activations. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct LocationCache {
    inner: Arc<CacheInner>,
}

impl LocationCache {
    /// A cache without termination watching.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache whose entries are evicted when their actor terminates.
    pub fn start(system: &ActorSystem) -> Result<Self, SpawnError> {
        let cache = Self::new();
        let weak = Arc::downgrade(&cache.inner);
        let props = Props::from_fn(move |ctx: &mut dyn Context| {
            watcher_receive(&weak, ctx);
            Ok::<(), ActorError>(())
        })
        .with_guardian_strategy(SupervisorStrategy::AlwaysRestart);
        let root = system.root();
        let pid = root.spawn_named(props, WATCHER_NAME)?;
        *cache.inner.watcher.lock() = Some(Watcher { root, pid });
        Ok(cache)
    }

    /// Evict a member's entries when it leaves or rejoins.
    pub fn subscribe(&self, events: &EventStream<ClusterEvent>) {
        let weak = Arc::downgrade(&self.inner);
        let subscription = events.subscribe(move |event| {
            let member = match event {
                ClusterEvent::MemberLeft(member) | ClusterEvent::MemberRejoined(member) => member,
                _ => return,
            };
            if let Some(inner) = weak.upgrade() {
                let removed = LocationCache { inner }.remove_all_for_member(member.address());
                tracing::debug!(member = %member, removed, "evicted member from location cache");
            }
        });
        if let Some((stream, previous)) = self
            .inner
            .subscription
            .lock()
            .replace((events.clone(), subscription))
        {
            stream.unsubscribe(previous);
        }
    }

    /// Stop watching, stop following topology events and drop all entries.
    pub fn shutdown(&self) {
        if let Some((stream, subscription)) = self.inner.subscription.lock().take() {
            stream.unsubscribe(subscription);
        }
        if let Some(watcher) = self.inner.watcher.lock().take() {
            watcher.root.stop(&watcher.pid);
        }
        self.inner.by_name.clear();
        self.inner.by_pid.clear();
    }

    /// Cached pid for `name`.
    pub fn try_get(&self, name: &str) -> Option<Pid> {
        self.inner.by_name.get(name).map(|pid| pid.value().clone())
    }

    /// Cache `pid` under `name` unless the name is already cached.
    pub fn try_add(&self, name: &str, pid: Pid) -> bool {
        match self.inner.by_name.entry(name.to_string()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(entry) => {
                entry.insert(pid.clone());
            }
        }
        self.inner.by_pid.insert(pid.clone(), name.to_string());
        self.notify_watcher(Message::new(WatchLocation(pid)));
        true
    }

    /// Forget `name`.
    pub fn remove_by_name(&self, name: &str) -> Option<Pid> {
        let (_, pid) = self.inner.by_name.remove(name)?;
        self.inner.by_pid.remove_if(&pid, |_, cached| cached == name);
        self.notify_watcher(Message::new(UnwatchLocation(pid.clone())));
        Some(pid)
    }

    /// Forget the entry resolving to `pid`.
    pub fn remove_by_address(&self, pid: &Pid) -> Option<String> {
        let (_, name) = self.inner.by_pid.remove(pid)?;
        self.inner.by_name.remove_if(&name, |_, cached| cached == pid);
        Some(name)
    }

    /// Forget every entry living on `member_address` and stop watching it.
    /// Returns how many names were dropped.
    pub fn remove_all_for_member(&self, member_address: &str) -> usize {
        let mut removed = Vec::new();
        self.inner.by_name.retain(|_, pid| {
            let keep = pid.address() != member_address;
            if !keep {
                removed.push(pid.clone());
            }
            keep
        });
        self.inner
            .by_pid
            .retain(|pid, _| pid.address() != member_address);
        let count = removed.len();
        for pid in removed {
            self.notify_watcher(Message::new(UnwatchLocation(pid)));
        }
        count
    }

    /// Number of cached names.
    pub fn len(&self) -> usize {
        self.inner.by_name.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.by_name.is_empty()
    }

    fn notify_watcher(&self, message: Message) {
        if let Some(watcher) = self.inner.watcher.lock().as_ref() {
            watcher.root.send(&watcher.pid, message);
        }
    }
}

fn watcher_receive(cache: &Weak<CacheInner>, ctx: &mut dyn Context) {
    let Some(message) = ctx.message() else {
        return;
    };
    if let Some(WatchLocation(pid)) = message.downcast_ref::<WatchLocation>() {
        let pid = pid.clone();
        ctx.watch(&pid);
    } else if let Some(UnwatchLocation(pid)) = message.downcast_ref::<UnwatchLocation>() {
        let pid = pid.clone();
        ctx.unwatch(&pid);
    } else if let Some(terminated) = message.downcast_ref::<Terminated>() {
        let who = terminated.who().clone();
        if let Some(inner) = cache.upgrade() {
            if let Some(name) = (LocationCache { inner }).remove_by_address(&who) {
                tracing::debug!(pid = %who, name = %name, "cached activation terminated");
            }
        }
    }
}
