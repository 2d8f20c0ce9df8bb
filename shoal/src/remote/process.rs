//! Local stand-in for an actor on another member.

use std::sync::Arc;

use super::{RemoteDelivery, Transport};
use crate::actor::{MessageEnvelope, Pid, Process, SystemMessage};

/// Forwards everything addressed to a remote pid to the transport.
///
/// Watch and unwatch are not tracked locally: they become remote-watch
/// requests, and the remote member (or the transport, when the member
/// becomes unreachable) sends the `Terminated` notice back.
#[derive(Debug)]
pub struct RemoteProcess {
    pid: Pid,
    transport: Arc<dyn Transport>,
}

impl RemoteProcess {
    /// Proxy for `pid` over `transport`.
    pub fn new(pid: Pid, transport: Arc<dyn Transport>) -> Self {
        Self { pid, transport }
    }

    /// The remote pid.
    pub fn pid(&self) -> &Pid {
        &self.pid
    }
}

impl Process for RemoteProcess {
    fn send_user_message(&self, pid: &Pid, envelope: MessageEnvelope) {
        self.transport
            .send_to_remote(pid, RemoteDelivery::User(envelope), None);
    }

    fn send_system_message(&self, pid: &Pid, message: SystemMessage) {
        match message {
            SystemMessage::Watch { watcher } => self.transport.remote_watch(&watcher, pid),
            SystemMessage::Unwatch { watcher } => self.transport.remote_unwatch(&watcher, pid),
            other => self
                .transport
                .send_to_remote(pid, RemoteDelivery::System(other), None),
        }
    }
}
