//! Guardians: supervisors for top-level actors spawned with a guardian
//! strategy.
//!
//! A guardian is a bare [`Process`], not an actor. It applies its strategy
//! to failures reported by its single child and unregisters itself once that
//! child terminates.

use std::sync::Arc;

use parking_lot::Mutex;

use super::message::{MessageEnvelope, SystemMessage};
use super::process::Process;
use super::supervision::{Supervisor, SupervisorStrategy};
use super::system::{ActorSystem, WeakActorSystem};
use super::{ActorError, Pid};

pub(crate) struct GuardianProcess {
    pid: Pid,
    strategy: SupervisorStrategy,
    system: WeakActorSystem,
    child: Mutex<Option<Pid>>,
}

impl GuardianProcess {
    /// Register a new guardian applying `strategy`.
    pub(crate) fn register(system: &ActorSystem, strategy: SupervisorStrategy) -> Arc<Self> {
        let registry = system.registry();
        loop {
            let id = format!("guardian{}", registry.next_id());
            let guardian = Arc::new(Self {
                pid: Pid::new(system.address(), id.clone()),
                strategy: strategy.clone(),
                system: system.downgrade(),
                child: Mutex::new(None),
            });
            if registry.try_register(&id, guardian.clone()) {
                return guardian;
            }
        }
    }

    pub(crate) fn pid(&self) -> &Pid {
        &self.pid
    }

    pub(crate) fn adopt(&self, child: Pid) {
        *self.child.lock() = Some(child);
    }

    pub(crate) fn release(&self) {
        if let Some(system) = self.system.upgrade() {
            system.registry().remove(self.pid.id());
        }
    }
}

impl Process for GuardianProcess {
    fn send_user_message(&self, pid: &Pid, envelope: MessageEnvelope) {
        tracing::warn!(
            guardian = %pid,
            message_type = envelope.message().type_name(),
            "guardian does not accept user messages"
        );
    }

    fn send_system_message(&self, pid: &Pid, message: SystemMessage) {
        let Some(system) = self.system.upgrade() else {
            return;
        };
        match message {
            SystemMessage::Failure(failure) => {
                let mut supervisor = GuardianSupervisor {
                    system: &system,
                    child: self.child.lock().clone(),
                    failed: failure.who().clone(),
                };
                self.strategy.handle_failure(&mut supervisor, &failure);
            }
            SystemMessage::Terminated { who } => {
                tracing::trace!(guardian = %pid, child = %who, "guardian child terminated");
                self.release();
            }
            other => {
                tracing::debug!(guardian = %pid, message = other.name(), "guardian ignores system message");
            }
        }
    }
}

struct GuardianSupervisor<'a> {
    system: &'a ActorSystem,
    child: Option<Pid>,
    failed: Pid,
}

impl GuardianSupervisor<'_> {
    fn send_all(&self, children: &[Pid], message: impl Fn() -> SystemMessage) {
        for child in children {
            self.system
                .process_for(child)
                .send_system_message(child, message());
        }
    }
}

impl Supervisor for GuardianSupervisor<'_> {
    fn children(&self) -> Vec<Pid> {
        self.child.iter().cloned().collect()
    }

    fn restart_children(&mut self, reason: Arc<ActorError>, children: &[Pid]) {
        self.send_all(children, || SystemMessage::Restart {
            reason: Arc::clone(&reason),
        });
    }

    fn stop_children(&mut self, children: &[Pid]) {
        self.send_all(children, || SystemMessage::Stop);
    }

    fn resume_children(&mut self, children: &[Pid]) {
        self.send_all(children, || SystemMessage::ResumeMailbox);
    }

    fn escalate_failure(&mut self, reason: Arc<ActorError>) {
        tracing::error!(child = %self.failed, error = %reason, "guardian cannot escalate, stopping child");
        let failed = self.failed.clone();
        self.stop_children(&[failed]);
    }
}
