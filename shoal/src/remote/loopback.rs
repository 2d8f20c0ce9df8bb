//! In-process transport between actor systems.
//!
//! Every attached system is reachable by its address. Messages are handed
//! over without serialization. Remote watches are remembered per target
//! member so that [`LoopbackNetwork::detach`] can report every watched actor
//! on the departed member as terminated, the way a real transport reports
//! an unreachable endpoint.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::{install, RemoteDelivery, Transport};
use crate::actor::{ActorSystem, Pid, SystemMessage, WeakActorSystem};

#[derive(Default)]
struct Network {
    members: RwLock<HashMap<String, WeakActorSystem>>,
    /// Target member address to `(watcher, target)` pairs.
    watches: Mutex<HashMap<String, HashSet<(Pid, Pid)>>>,
}

/// A set of actor systems connected in memory.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    network: Arc<Network>,
}

impl LoopbackNetwork {
    /// An empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `system` and route its non-local pids through this network.
    pub fn attach(&self, system: &ActorSystem) {
        self.network
            .members
            .write()
            .insert(system.address().to_string(), system.downgrade());
        let transport = LoopbackTransport {
            network: self.clone(),
            local: system.downgrade(),
        };
        install(system, Arc::new(transport));
    }

    /// Disconnect the member at `address`.
    ///
    /// Every watcher of an actor on that member receives `Terminated`.
    pub fn detach(&self, address: &str) {
        self.network.members.write().remove(address);
        let watches = self
            .network
            .watches
            .lock()
            .remove(address)
            .unwrap_or_default();
        for (watcher, target) in watches {
            if let Some(system) = self.system(watcher.address()) {
                system
                    .process_for(&watcher)
                    .send_system_message(&watcher, SystemMessage::Terminated { who: target });
            }
        }
    }

    /// Addresses of attached members.
    pub fn addresses(&self) -> Vec<String> {
        self.network.members.read().keys().cloned().collect()
    }

    fn system(&self, address: &str) -> Option<ActorSystem> {
        self.network
            .members
            .read()
            .get(address)
            .and_then(WeakActorSystem::upgrade)
    }

    fn forget_watch(&self, watcher: &Pid, target: &Pid) {
        let mut watches = self.network.watches.lock();
        if let Some(pairs) = watches.get_mut(target.address()) {
            pairs.remove(&(watcher.clone(), target.clone()));
        }
    }
}

impl fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackNetwork")
            .field("members", &self.addresses())
            .finish()
    }
}

/// The [`Transport`] of one system attached to a [`LoopbackNetwork`].
pub struct LoopbackTransport {
    network: LoopbackNetwork,
    local: WeakActorSystem,
}

impl LoopbackTransport {
    fn report_terminated(&self, watcher: &Pid, target: &Pid) {
        if let Some(local) = self.local.upgrade() {
            local.process_for(watcher).send_system_message(
                watcher,
                SystemMessage::Terminated {
                    who: target.clone(),
                },
            );
        }
    }
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackTransport").finish_non_exhaustive()
    }
}

impl Transport for LoopbackTransport {
    fn send_to_remote(&self, target: &Pid, delivery: RemoteDelivery, _serializer_id: Option<u32>) {
        let Some(system) = self.network.system(target.address()) else {
            tracing::debug!(target = %target, "member unreachable, dropping message");
            return;
        };
        let process = system.process_for(target);
        match delivery {
            RemoteDelivery::User(envelope) => process.send_user_message(target, envelope),
            RemoteDelivery::System(message) => {
                if let SystemMessage::Terminated { who } = &message {
                    self.network.forget_watch(target, who);
                }
                process.send_system_message(target, message);
            }
        }
    }

    fn remote_watch(&self, watcher: &Pid, target: &Pid) {
        let Some(system) = self.network.system(target.address()) else {
            self.report_terminated(watcher, target);
            return;
        };
        self.network
            .network
            .watches
            .lock()
            .entry(target.address().to_string())
            .or_default()
            .insert((watcher.clone(), target.clone()));
        system.process_for(target).send_system_message(
            target,
            SystemMessage::Watch {
                watcher: watcher.clone(),
            },
        );
    }

    fn remote_unwatch(&self, watcher: &Pid, target: &Pid) {
        self.network.forget_watch(watcher, target);
        if let Some(system) = self.network.system(target.address()) {
            system.process_for(target).send_system_message(
                target,
                SystemMessage::Unwatch {
                    watcher: watcher.clone(),
                },
            );
        }
    }
}
