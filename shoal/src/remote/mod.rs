//! Addressing actors on other cluster members.
//!
//! The wire transport is an external collaborator behind the [`Transport`]
//! trait. [`install`] teaches an [`ActorSystem`]'s registry to resolve
//! non-local pids to a [`RemoteProcess`], so senders never need to know
//! whether a target is local.
//!
//! [`LoopbackNetwork`] is an in-process transport connecting several
//! actor systems, used to run multi-member clusters inside one process.

use std::fmt;
use std::sync::Arc;

use crate::actor::{ActorSystem, MessageEnvelope, Pid, Process, SystemMessage};

mod loopback;
mod process;

pub use loopback::{LoopbackNetwork, LoopbackTransport};
pub use process::RemoteProcess;

/// Something handed to the transport for delivery to another member.
#[derive(Debug)]
pub enum RemoteDelivery {
    /// A user message.
    User(MessageEnvelope),
    /// A control message other than watch/unwatch.
    System(SystemMessage),
}

/// The wire transport as seen by the remote proxy.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Serialize and send `delivery` to `target`'s member.
    ///
    /// `serializer_id` selects a serializer; `None` uses the default.
    fn send_to_remote(&self, target: &Pid, delivery: RemoteDelivery, serializer_id: Option<u32>);

    /// Ask `target`'s member to notify `watcher` when `target` stops.
    fn remote_watch(&self, watcher: &Pid, target: &Pid);

    /// Cancel a [`Transport::remote_watch`].
    fn remote_unwatch(&self, watcher: &Pid, target: &Pid);
}

/// Route every non-local pid of `system` through `transport`.
pub fn install(system: &ActorSystem, transport: Arc<dyn Transport>) {
    tracing::debug!(address = %system.address(), transport = ?transport, "installing remote transport");
    system
        .registry()
        .register_host_resolver(Arc::new(move |pid: &Pid| {
            Some(Arc::new(RemoteProcess::new(pid.clone(), Arc::clone(&transport))) as Arc<dyn Process>)
        }));
}
