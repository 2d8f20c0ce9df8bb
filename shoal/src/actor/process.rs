//! Message sinks addressed by pids.
//!
//! Everything a pid can point at implements [`Process`]: local actors
//! ([`LocalProcess`]), request futures, guardians, remote stand-ins and the
//! dead-letter sink.

use tokio::sync::mpsc;

use super::event_stream::DeadLetterEvent;
use super::message::{MessageEnvelope, SystemMessage};
use super::system::{ActorSystem, WeakActorSystem};
use super::Pid;

/// A sendable target.
pub trait Process: Send + Sync {
    /// Deliver a user message to `pid`.
    fn send_user_message(&self, pid: &Pid, envelope: MessageEnvelope);

    /// Deliver a control message to `pid`.
    fn send_system_message(&self, pid: &Pid, message: SystemMessage);

    /// Ask `pid` to stop.
    fn stop(&self, pid: &Pid) {
        self.send_system_message(pid, SystemMessage::Stop);
    }
}

/// Receiving half of an actor mailbox.
pub(crate) struct Mailbox {
    pub(crate) user: mpsc::UnboundedReceiver<MessageEnvelope>,
    pub(crate) system: mpsc::UnboundedReceiver<SystemMessage>,
}

impl Mailbox {
    pub(crate) fn close(&mut self) {
        self.user.close();
        self.system.close();
    }
}

/// Sending half of an actor mailbox.
pub struct LocalProcess {
    user: mpsc::UnboundedSender<MessageEnvelope>,
    system: mpsc::UnboundedSender<SystemMessage>,
    owner: WeakActorSystem,
}

impl LocalProcess {
    pub(crate) fn new(owner: WeakActorSystem) -> (Self, Mailbox) {
        let (user_tx, user_rx) = mpsc::unbounded_channel();
        let (system_tx, system_rx) = mpsc::unbounded_channel();
        let process = Self {
            user: user_tx,
            system: system_tx,
            owner,
        };
        let mailbox = Mailbox {
            user: user_rx,
            system: system_rx,
        };
        (process, mailbox)
    }
}

impl Process for LocalProcess {
    fn send_user_message(&self, pid: &Pid, envelope: MessageEnvelope) {
        if let Err(rejected) = self.user.send(envelope) {
            if let Some(system) = self.owner.upgrade() {
                DeadLetterProcess::new(system).send_user_message(pid, rejected.0);
            }
        }
    }

    fn send_system_message(&self, pid: &Pid, message: SystemMessage) {
        if let Err(rejected) = self.system.send(message) {
            if let Some(system) = self.owner.upgrade() {
                DeadLetterProcess::new(system).send_system_message(pid, rejected.0);
            }
        }
    }
}

/// Sink for messages whose target is gone or unknown.
///
/// User messages are logged and published as [`DeadLetterEvent`]s. A watch
/// registered against a dead pid answers immediately with `Terminated`.
pub struct DeadLetterProcess {
    system: ActorSystem,
}

impl DeadLetterProcess {
    /// Dead letters of `system`.
    pub fn new(system: ActorSystem) -> Self {
        Self { system }
    }
}

impl Process for DeadLetterProcess {
    fn send_user_message(&self, pid: &Pid, envelope: MessageEnvelope) {
        let message_type = envelope.message().type_name();
        tracing::debug!(pid = %pid, message_type, "dead letter");
        self.system.dead_letters().publish(&DeadLetterEvent {
            pid: pid.clone(),
            message_type,
            sender: envelope.sender().cloned(),
        });
    }

    fn send_system_message(&self, pid: &Pid, message: SystemMessage) {
        match message {
            SystemMessage::Watch { watcher } => {
                tracing::debug!(pid = %pid, watcher = %watcher, "watch on dead pid, reporting termination");
                self.system
                    .process_for(&watcher)
                    .send_system_message(&watcher, SystemMessage::Terminated { who: pid.clone() });
            }
            other => {
                tracing::debug!(pid = %pid, message = other.name(), "dead letter system message");
                self.system.dead_letters().publish(&DeadLetterEvent {
                    pid: pid.clone(),
                    message_type: other.name(),
                    sender: None,
                });
            }
        }
    }
}
