//! The per-actor execution context and its processing loop.
//!
//! Every spawned actor is driven by one [`ActorContext`] running as a tokio
//! task. The task owns the actor instance and its mailbox and is the only
//! code that touches them, so handlers never run concurrently for the same
//! actor even though many actors share the runtime's worker threads.
//!
//! # Lifecycle
//!
//! ```text
//!            ┌──────────── restart done ────────────┐
//!            ▼                                      │
//!   spawn → Alive ── Restart ──► Restarting ── children gone
//!            │                      │
//!            └──── Stop ──► Stopping ◄── Stop
//!                              │
//!                        children gone
//!                              ▼
//!                           Stopped
//! ```
//!
//! # Mailbox
//!
//! System messages and user messages travel on separate queues. The loop
//! always drains pending system messages first, and stops taking user
//! messages while the mailbox is suspended after a failure.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::future::{RequestBound, RequestFuture};
use super::message::{
    Message, MessageEnvelope, MessageHeader, PoisonPill, ReceiveTimeout, Restarting, Started,
    Stopped, Stopping, SystemMessage, Terminated,
};
use super::process::{DeadLetterProcess, LocalProcess, Mailbox, Process};
use super::props::{compose_senders, Actor, ActorError, Props, Sender, SpawnError};
use super::supervision::{Failure, RestartStatistics, Supervisor, SupervisorDirective};
use super::system::ActorSystem;
use super::Pid;

/// Errors from [`Context::set_receive_timeout`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveTimeoutError {
    /// The duration must be greater than zero.
    #[error("invalid receive timeout {0:?}: must be greater than zero")]
    InvalidArgument(Duration),
}

/// Everything an actor can do while handling a message.
///
/// Actors receive a `&mut dyn Context`; it is either the [`ActorContext`]
/// itself or a chain of [`ContextDecorator`]s wrapping it.
pub trait Context: Send {
    /// The actor system.
    fn system(&self) -> &ActorSystem;
    /// This actor's address.
    fn self_pid(&self) -> &Pid;
    /// The parent, `None` for top-level actors.
    fn parent(&self) -> Option<&Pid>;
    /// Live children.
    fn children(&self) -> Vec<Pid>;
    /// The message being handled.
    fn message(&self) -> Option<&Message>;
    /// The sender of the message being handled.
    fn sender(&self) -> Option<&Pid>;
    /// Headers of the message being handled.
    fn headers(&self) -> Option<&MessageHeader>;
    /// The armed receive timeout.
    fn receive_timeout(&self) -> Option<Duration>;

    /// Send `message` to `target`. Never blocks, at most once.
    fn send(&mut self, target: &Pid, message: Message);
    /// Send `message` to `target` with this actor as the sender.
    fn request(&mut self, target: &Pid, message: Message);
    /// Send `message` and await the first reply within `timeout`.
    fn request_async(&mut self, target: &Pid, message: Message, timeout: Duration)
        -> RequestFuture;
    /// Send `message` and await the first reply until `token` is cancelled.
    fn request_async_cancellable(
        &mut self,
        target: &Pid,
        message: Message,
        token: CancellationToken,
    ) -> RequestFuture;
    /// Reply to the sender of the current message. No-op without a sender.
    fn respond(&mut self, message: Message);
    /// Pass the current message to `target`, keeping its sender.
    fn forward(&mut self, target: &Pid);

    /// Spawn a child with a generated name.
    fn spawn(&mut self, props: Props) -> Result<Pid, SpawnError>;
    /// Spawn a child called `name`.
    fn spawn_named(&mut self, props: Props, name: &str) -> Result<Pid, SpawnError>;
    /// Spawn a child whose name starts with `prefix`.
    fn spawn_prefix(&mut self, props: Props, prefix: &str) -> Result<Pid, SpawnError>;

    /// Get a [`Terminated`] message when `target` stops.
    fn watch(&mut self, target: &Pid);
    /// Undo [`Context::watch`].
    fn unwatch(&mut self, target: &Pid);
    /// Ask `target` to stop.
    fn stop(&mut self, target: &Pid);

    /// Defer the current message until the next restart.
    fn stash(&mut self);
    /// Arm the idle timer.
    fn set_receive_timeout(&mut self, duration: Duration) -> Result<(), ReceiveTimeoutError>;
    /// Disarm the idle timer.
    fn cancel_receive_timeout(&mut self);
}

/// A context wrapper that forwards to an inner context.
///
/// Implement [`inner`](Self::inner) and [`inner_mut`](Self::inner_mut), then
/// override only the operations to intercept. Every decorator is a
/// [`Context`] and can wrap another decorator.
///
/// ```ignore
/// struct Audited<'a> {
///     inner: Box<dyn Context + 'a>,
/// }
///
/// impl ContextDecorator for Audited<'_> {
///     fn inner(&self) -> &dyn Context { &*self.inner }
///     fn inner_mut(&mut self) -> &mut dyn Context { &mut *self.inner }
///
///     fn send(&mut self, target: &Pid, message: Message) {
///         tracing::info!(target = %target, "send");
///         self.inner_mut().send(target, message);
///     }
/// }
///
/// let props = props.with_context_decorator(|inner| Box::new(Audited { inner }));
/// ```
#[allow(missing_docs)]
pub trait ContextDecorator: Send {
    /// The wrapped context.
    fn inner(&self) -> &dyn Context;
    /// The wrapped context, mutably.
    fn inner_mut(&mut self) -> &mut dyn Context;

    fn system(&self) -> &ActorSystem {
        self.inner().system()
    }
    fn self_pid(&self) -> &Pid {
        self.inner().self_pid()
    }
    fn parent(&self) -> Option<&Pid> {
        self.inner().parent()
    }
    fn children(&self) -> Vec<Pid> {
        self.inner().children()
    }
    fn message(&self) -> Option<&Message> {
        self.inner().message()
    }
    fn sender(&self) -> Option<&Pid> {
        self.inner().sender()
    }
    fn headers(&self) -> Option<&MessageHeader> {
        self.inner().headers()
    }
    fn receive_timeout(&self) -> Option<Duration> {
        self.inner().receive_timeout()
    }
    fn send(&mut self, target: &Pid, message: Message) {
        self.inner_mut().send(target, message)
    }
    fn request(&mut self, target: &Pid, message: Message) {
        self.inner_mut().request(target, message)
    }
    fn request_async(&mut self, target: &Pid, message: Message, timeout: Duration) -> RequestFuture {
        self.inner_mut().request_async(target, message, timeout)
    }
    fn request_async_cancellable(
        &mut self,
        target: &Pid,
        message: Message,
        token: CancellationToken,
    ) -> RequestFuture {
        self.inner_mut()
            .request_async_cancellable(target, message, token)
    }
    fn respond(&mut self, message: Message) {
        self.inner_mut().respond(message)
    }
    fn forward(&mut self, target: &Pid) {
        self.inner_mut().forward(target)
    }
    fn spawn(&mut self, props: Props) -> Result<Pid, SpawnError> {
        self.inner_mut().spawn(props)
    }
    fn spawn_named(&mut self, props: Props, name: &str) -> Result<Pid, SpawnError> {
        self.inner_mut().spawn_named(props, name)
    }
    fn spawn_prefix(&mut self, props: Props, prefix: &str) -> Result<Pid, SpawnError> {
        self.inner_mut().spawn_prefix(props, prefix)
    }
    fn watch(&mut self, target: &Pid) {
        self.inner_mut().watch(target)
    }
    fn unwatch(&mut self, target: &Pid) {
        self.inner_mut().unwatch(target)
    }
    fn stop(&mut self, target: &Pid) {
        self.inner_mut().stop(target)
    }
    fn stash(&mut self) {
        self.inner_mut().stash()
    }
    fn set_receive_timeout(&mut self, duration: Duration) -> Result<(), ReceiveTimeoutError> {
        self.inner_mut().set_receive_timeout(duration)
    }
    fn cancel_receive_timeout(&mut self) {
        self.inner_mut().cancel_receive_timeout()
    }
}

impl<T: ContextDecorator> Context for T {
    fn system(&self) -> &ActorSystem {
        ContextDecorator::system(self)
    }
    fn self_pid(&self) -> &Pid {
        ContextDecorator::self_pid(self)
    }
    fn parent(&self) -> Option<&Pid> {
        ContextDecorator::parent(self)
    }
    fn children(&self) -> Vec<Pid> {
        ContextDecorator::children(self)
    }
    fn message(&self) -> Option<&Message> {
        ContextDecorator::message(self)
    }
    fn sender(&self) -> Option<&Pid> {
        ContextDecorator::sender(self)
    }
    fn headers(&self) -> Option<&MessageHeader> {
        ContextDecorator::headers(self)
    }
    fn receive_timeout(&self) -> Option<Duration> {
        ContextDecorator::receive_timeout(self)
    }
    fn send(&mut self, target: &Pid, message: Message) {
        ContextDecorator::send(self, target, message)
    }
    fn request(&mut self, target: &Pid, message: Message) {
        ContextDecorator::request(self, target, message)
    }
    fn request_async(&mut self, target: &Pid, message: Message, timeout: Duration) -> RequestFuture {
        ContextDecorator::request_async(self, target, message, timeout)
    }
    fn request_async_cancellable(
        &mut self,
        target: &Pid,
        message: Message,
        token: CancellationToken,
    ) -> RequestFuture {
        ContextDecorator::request_async_cancellable(self, target, message, token)
    }
    fn respond(&mut self, message: Message) {
        ContextDecorator::respond(self, message)
    }
    fn forward(&mut self, target: &Pid) {
        ContextDecorator::forward(self, target)
    }
    fn spawn(&mut self, props: Props) -> Result<Pid, SpawnError> {
        ContextDecorator::spawn(self, props)
    }
    fn spawn_named(&mut self, props: Props, name: &str) -> Result<Pid, SpawnError> {
        ContextDecorator::spawn_named(self, props, name)
    }
    fn spawn_prefix(&mut self, props: Props, prefix: &str) -> Result<Pid, SpawnError> {
        ContextDecorator::spawn_prefix(self, props, prefix)
    }
    fn watch(&mut self, target: &Pid) {
        ContextDecorator::watch(self, target)
    }
    fn unwatch(&mut self, target: &Pid) {
        ContextDecorator::unwatch(self, target)
    }
    fn stop(&mut self, target: &Pid) {
        ContextDecorator::stop(self, target)
    }
    fn stash(&mut self) {
        ContextDecorator::stash(self)
    }
    fn set_receive_timeout(&mut self, duration: Duration) -> Result<(), ReceiveTimeoutError> {
        ContextDecorator::set_receive_timeout(self, duration)
    }
    fn cancel_receive_timeout(&mut self) {
        ContextDecorator::cancel_receive_timeout(self)
    }
}

/// Wraps a context into a decorated one.
pub type ContextDecoratorFn =
    Arc<dyn for<'a> Fn(Box<dyn Context + 'a>) -> Box<dyn Context + 'a> + Send + Sync>;

/// Innermost link of a decorator chain.
struct Undecorated<'a> {
    inner: &'a mut (dyn Context + 'a),
}

impl ContextDecorator for Undecorated<'_> {
    fn inner(&self) -> &dyn Context {
        &*self.inner
    }

    fn inner_mut(&mut self) -> &mut dyn Context {
        &mut *self.inner
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ContextState {
    Alive,
    Restarting,
    Stopping,
    Stopped,
}

/// Execution state of one actor: lifecycle, children, watchers, stash,
/// receive timeout and restart statistics.
///
/// Owned by the actor's processing task; actors see it as `&mut dyn
/// Context`.
pub struct ActorContext {
    system: ActorSystem,
    props: Props,
    self_pid: Pid,
    self_process: Arc<dyn Process>,
    parent: Option<Pid>,
    actor: Option<Box<dyn Actor>>,
    state: ContextState,
    children: HashSet<Pid>,
    watchers: HashSet<Pid>,
    current: Option<MessageEnvelope>,
    stash: Vec<MessageEnvelope>,
    restart_statistics: RestartStatistics,
    receive_timeout: Option<Duration>,
    receive_timer: Option<JoinHandle<()>>,
    timer_generation: u64,
    mailbox_suspended: bool,
    sender: Option<Sender>,
}

/// Register and start an actor under `id`.
pub(crate) fn spawn(
    system: &ActorSystem,
    props: Props,
    id: &str,
    parent: Option<Pid>,
) -> Result<Pid, SpawnError> {
    let pid = Pid::new(system.address(), id);
    let (process, mailbox) = LocalProcess::new(system.downgrade());
    let process: Arc<dyn Process> = Arc::new(process);
    if !system.registry().try_register(id, Arc::clone(&process)) {
        return Err(SpawnError::NameExists(pid));
    }
    let context = ActorContext::new(system.clone(), props, pid.clone(), process, parent);
    tokio::spawn(context.run(mailbox));
    Ok(pid)
}

/// The sender used when no middleware is configured.
pub(crate) fn direct_sender(system: ActorSystem) -> Sender {
    Arc::new(move |_: &MessageHeader, target: &Pid, envelope: MessageEnvelope| {
        system.process_for(target).send_user_message(target, envelope);
    })
}

impl ActorContext {
    fn new(
        system: ActorSystem,
        props: Props,
        self_pid: Pid,
        self_process: Arc<dyn Process>,
        parent: Option<Pid>,
    ) -> Self {
        let sender = if props.sender_middleware().is_empty() {
            None
        } else {
            Some(compose_senders(
                props.sender_middleware(),
                direct_sender(system.clone()),
            ))
        };
        let mut context = Self {
            system,
            props,
            self_pid,
            self_process,
            parent,
            actor: None,
            state: ContextState::Alive,
            children: HashSet::new(),
            watchers: HashSet::new(),
            current: None,
            stash: Vec::new(),
            restart_statistics: RestartStatistics::default(),
            receive_timeout: None,
            receive_timer: None,
            timer_generation: 0,
            mailbox_suspended: false,
            sender,
        };
        context.incarnate();
        context
    }

    fn incarnate(&mut self) {
        self.actor = Some(self.props.produce());
        self.state = ContextState::Alive;
    }

    async fn run(mut self, mut mailbox: Mailbox) {
        let shutdown = self.system.shutdown_token().clone();
        tracing::trace!(pid = %self.self_pid, "actor started");
        self.invoke_user(MessageEnvelope::signal(Started)).await;

        while self.state != ContextState::Stopped {
            let suspended = self.mailbox_suspended;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(message) = mailbox.system.recv() => self.invoke_system(message).await,
                Some(envelope) = mailbox.user.recv(), if !suspended => self.invoke_user(envelope).await,
                else => break,
            }
        }

        self.stop_receive_timer();
        mailbox.close();
        if self.state == ContextState::Stopped {
            self.drain(&mut mailbox);
        }
    }

    /// Answer what was queued after the final transition.
    fn drain(&mut self, mailbox: &mut Mailbox) {
        while let Ok(message) = mailbox.system.try_recv() {
            if let SystemMessage::Watch { watcher } = message {
                self.notify_terminated(&watcher);
            }
        }
        let dead_letters = DeadLetterProcess::new(self.system.clone());
        while let Ok(envelope) = mailbox.user.try_recv() {
            dead_letters.send_user_message(&self.self_pid, envelope);
        }
    }

    async fn invoke_system(&mut self, message: SystemMessage) {
        match message {
            SystemMessage::Stop => self.initiate_stop().await,
            SystemMessage::Watch { watcher } => self.handle_watch(watcher),
            SystemMessage::Unwatch { watcher } => {
                self.watchers.remove(&watcher);
            }
            SystemMessage::Terminated { who } => self.handle_terminated(who).await,
            SystemMessage::Failure(failure) => self.handle_child_failure(failure),
            SystemMessage::Restart { .. } => self.handle_restart().await,
            SystemMessage::SuspendMailbox => self.mailbox_suspended = true,
            SystemMessage::ResumeMailbox => self.mailbox_suspended = false,
            SystemMessage::ReceiveTimeoutElapsed { generation } => {
                self.handle_receive_timeout(generation).await
            }
        }
    }

    async fn invoke_user(&mut self, envelope: MessageEnvelope) {
        if self.state == ContextState::Stopped {
            tracing::debug!(
                pid = %self.self_pid,
                message_type = envelope.message().type_name(),
                "actor stopped, dropping message"
            );
            return;
        }

        let influences =
            self.receive_timeout.is_some() && envelope.message().influences_receive_timeout();
        if influences {
            self.stop_receive_timer();
        }

        let message_type = envelope.message().type_name();
        if let Err(reason) = self.process_message(envelope).await {
            if self.state == ContextState::Alive {
                tracing::error!(pid = %self.self_pid, message_type, error = %reason, "actor failed");
                self.escalate(Arc::new(reason));
            } else {
                tracing::warn!(pid = %self.self_pid, message_type, error = %reason, "actor failed while shutting down");
            }
        }

        if influences && self.receive_timeout.is_some() {
            self.start_receive_timer();
        }
    }

    async fn process_message(&mut self, envelope: MessageEnvelope) -> Result<(), ActorError> {
        if envelope.message().is::<PoisonPill>() {
            self.self_process.stop(&self.self_pid);
            return Ok(());
        }

        let Some(mut actor) = self.actor.take() else {
            return Ok(());
        };
        self.current = Some(envelope);
        let decorators = self.props.context_decorators().to_vec();
        let outcome = AssertUnwindSafe(receive_decorated(actor.as_mut(), self, &decorators))
            .catch_unwind()
            .await;
        self.actor = Some(actor);
        self.current = None;

        match outcome {
            Ok(result) => result,
            Err(panic) => Err(ActorError::Panicked(panic_message(panic.as_ref()))),
        }
    }

    fn send_envelope(&self, target: &Pid, envelope: MessageEnvelope) {
        match &self.sender {
            Some(sender) => {
                let empty = MessageHeader::default();
                let header = self
                    .current
                    .as_ref()
                    .map(MessageEnvelope::header)
                    .unwrap_or(&empty);
                sender(header, target, envelope);
            }
            None => self
                .system
                .process_for(target)
                .send_user_message(target, envelope),
        }
    }

    fn send_system(&self, target: &Pid, message: SystemMessage) {
        self.system
            .process_for(target)
            .send_system_message(target, message);
    }

    fn notify_terminated(&self, watcher: &Pid) {
        self.send_system(
            watcher,
            SystemMessage::Terminated {
                who: self.self_pid.clone(),
            },
        );
    }

    fn handle_watch(&mut self, watcher: Pid) {
        if self.state >= ContextState::Stopping {
            self.notify_terminated(&watcher);
        } else {
            self.watchers.insert(watcher);
        }
    }

    async fn handle_terminated(&mut self, who: Pid) {
        self.children.remove(&who);
        self.invoke_user(MessageEnvelope::signal(Terminated::new(who)))
            .await;
        if matches!(
            self.state,
            ContextState::Stopping | ContextState::Restarting
        ) {
            self.try_restart_or_stop().await;
        }
    }

    fn handle_child_failure(&mut self, failure: Failure) {
        let strategy = self
            .actor
            .as_ref()
            .and_then(|actor| actor.supervisor_strategy())
            .or_else(|| self.props.supervisor_strategy().cloned())
            .unwrap_or_else(|| self.system.config().default_supervisor_strategy().clone());
        strategy.handle_failure(self, &failure);
    }

    fn handle_root_failure(&mut self, failure: &Failure) {
        let strategy = self.system.config().default_supervisor_strategy().clone();
        if strategy.directive(failure) == SupervisorDirective::Escalate {
            tracing::error!(pid = %self.self_pid, error = %failure.reason(), "top-level actor cannot escalate, stopping it");
            let me = self.self_pid.clone();
            self.stop_children(&[me]);
            return;
        }
        strategy.handle_failure(self, failure);
    }

    /// Suspend the mailbox and report the failure upwards.
    fn escalate(&mut self, reason: Arc<ActorError>) {
        self.mailbox_suspended = true;
        let failure = Failure::new(
            self.self_pid.clone(),
            reason,
            self.restart_statistics.clone(),
        );
        match self.parent.clone() {
            Some(parent) => self.send_system(&parent, SystemMessage::Failure(failure)),
            None => self.handle_root_failure(&failure),
        }
    }

    async fn handle_restart(&mut self) {
        if self.state >= ContextState::Stopping {
            tracing::debug!(pid = %self.self_pid, "ignoring restart of a stopping actor");
            return;
        }
        self.state = ContextState::Restarting;
        self.cancel_timer_and_timeout();
        self.invoke_user(MessageEnvelope::signal(Restarting)).await;
        self.stop_all_children();
        self.try_restart_or_stop().await;
    }

    async fn initiate_stop(&mut self) {
        if self.state >= ContextState::Stopping {
            return;
        }
        self.state = ContextState::Stopping;
        self.cancel_timer_and_timeout();
        self.invoke_user(MessageEnvelope::signal(Stopping)).await;
        self.stop_all_children();
        self.try_restart_or_stop().await;
    }

    fn stop_all_children(&self) {
        for child in &self.children {
            self.send_system(child, SystemMessage::Stop);
        }
    }

    async fn try_restart_or_stop(&mut self) {
        if !self.children.is_empty() {
            return;
        }
        match self.state {
            ContextState::Restarting => self.restart().await,
            ContextState::Stopping => self.finalize_stop().await,
            _ => {}
        }
    }

    async fn restart(&mut self) {
        self.actor = None;
        self.incarnate();
        self.mailbox_suspended = false;
        tracing::debug!(pid = %self.self_pid, "actor restarted");
        self.invoke_user(MessageEnvelope::signal(Started)).await;

        let mut stashed = std::mem::take(&mut self.stash).into_iter();
        while let Some(envelope) = stashed.next() {
            self.invoke_user(envelope).await;
            if self.mailbox_suspended || self.state != ContextState::Alive {
                let remaining: Vec<_> = stashed.collect();
                let newer = std::mem::replace(&mut self.stash, remaining);
                self.stash.extend(newer);
                break;
            }
        }
    }

    async fn finalize_stop(&mut self) {
        self.system.registry().remove(self.self_pid.id());
        self.invoke_user(MessageEnvelope::signal(Stopped)).await;
        self.actor = None;

        let watchers = std::mem::take(&mut self.watchers);
        for watcher in &watchers {
            self.notify_terminated(watcher);
        }
        // A parent that also watches has already been told.
        if let Some(parent) = self.parent.as_ref().filter(|p| !watchers.contains(*p)) {
            self.notify_terminated(parent);
        }
        self.state = ContextState::Stopped;
        tracing::trace!(pid = %self.self_pid, "actor stopped");
    }

    async fn handle_receive_timeout(&mut self, generation: u64) {
        if generation != self.timer_generation
            || self.receive_timer.is_none()
            || self.state != ContextState::Alive
        {
            return;
        }
        self.receive_timer = None;
        if self.mailbox_suspended {
            return;
        }
        self.invoke_user(MessageEnvelope::signal(ReceiveTimeout))
            .await;
    }

    fn start_receive_timer(&mut self) {
        self.stop_receive_timer();
        let Some(duration) = self.receive_timeout else {
            return;
        };
        self.timer_generation += 1;
        let generation = self.timer_generation;
        let process = Arc::clone(&self.self_process);
        let pid = self.self_pid.clone();
        let shutdown = self.system.shutdown_token().clone();
        self.receive_timer = Some(tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    process.send_system_message(&pid, SystemMessage::ReceiveTimeoutElapsed { generation });
                }
                _ = shutdown.cancelled() => {}
            }
        }));
    }

    fn stop_receive_timer(&mut self) {
        if let Some(timer) = self.receive_timer.take() {
            timer.abort();
        }
    }

    fn cancel_timer_and_timeout(&mut self) {
        self.receive_timeout = None;
        self.stop_receive_timer();
    }

    fn spawn_child(&mut self, props: Props, name: &str) -> Result<Pid, SpawnError> {
        if props.guardian_strategy().is_some() {
            return Err(SpawnError::Configuration(
                "a guardian strategy can only be used by top-level actors".to_string(),
            ));
        }
        let id = format!("{}/{}", self.self_pid.id(), name);
        let pid = props.spawn(&self.system, &id, Some(self.self_pid.clone()))?;
        self.children.insert(pid.clone());
        Ok(pid)
    }
}

impl Context for ActorContext {
    fn system(&self) -> &ActorSystem {
        &self.system
    }

    fn self_pid(&self) -> &Pid {
        &self.self_pid
    }

    fn parent(&self) -> Option<&Pid> {
        self.parent.as_ref()
    }

    fn children(&self) -> Vec<Pid> {
        self.children.iter().cloned().collect()
    }

    fn message(&self) -> Option<&Message> {
        self.current.as_ref().map(MessageEnvelope::message)
    }

    fn sender(&self) -> Option<&Pid> {
        self.current.as_ref().and_then(MessageEnvelope::sender)
    }

    fn headers(&self) -> Option<&MessageHeader> {
        self.current.as_ref().map(MessageEnvelope::header)
    }

    fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout
    }

    fn send(&mut self, target: &Pid, message: Message) {
        self.send_envelope(target, MessageEnvelope::new(message));
    }

    fn request(&mut self, target: &Pid, message: Message) {
        let envelope = MessageEnvelope::new(message).with_sender(self.self_pid.clone());
        self.send_envelope(target, envelope);
    }

    fn request_async(
        &mut self,
        target: &Pid,
        message: Message,
        timeout: Duration,
    ) -> RequestFuture {
        let (reply_to, future) =
            RequestFuture::register(&self.system, RequestBound::Timeout(timeout));
        self.send_envelope(target, MessageEnvelope::new(message).with_sender(reply_to));
        future
    }

    fn request_async_cancellable(
        &mut self,
        target: &Pid,
        message: Message,
        token: CancellationToken,
    ) -> RequestFuture {
        let (reply_to, future) =
            RequestFuture::register(&self.system, RequestBound::Cancellation(token));
        self.send_envelope(target, MessageEnvelope::new(message).with_sender(reply_to));
        future
    }

    fn respond(&mut self, message: Message) {
        match self.sender().cloned() {
            Some(sender) => self.send_envelope(&sender, MessageEnvelope::new(message)),
            None => {
                tracing::debug!(pid = %self.self_pid, "respond without sender, dropping reply")
            }
        }
    }

    fn forward(&mut self, target: &Pid) {
        match self.current.take() {
            Some(envelope) if envelope.message().is_signal() => {
                tracing::warn!(
                    pid = %self.self_pid,
                    message_type = envelope.message().type_name(),
                    "system message cannot be forwarded"
                );
                self.current = Some(envelope);
            }
            Some(envelope) => self.send_envelope(target, envelope),
            None => tracing::warn!(pid = %self.self_pid, "no message to forward"),
        }
    }

    fn spawn(&mut self, props: Props) -> Result<Pid, SpawnError> {
        let name = self.system.registry().next_id();
        self.spawn_child(props, &name)
    }

    fn spawn_named(&mut self, props: Props, name: &str) -> Result<Pid, SpawnError> {
        self.spawn_child(props, name)
    }

    fn spawn_prefix(&mut self, props: Props, prefix: &str) -> Result<Pid, SpawnError> {
        let name = format!("{prefix}{}", self.system.registry().next_id());
        self.spawn_child(props, &name)
    }

    fn watch(&mut self, target: &Pid) {
        let watcher = self.self_pid.clone();
        self.send_system(target, SystemMessage::Watch { watcher });
    }

    fn unwatch(&mut self, target: &Pid) {
        let watcher = self.self_pid.clone();
        self.send_system(target, SystemMessage::Unwatch { watcher });
    }

    fn stop(&mut self, target: &Pid) {
        self.system.process_for(target).stop(target);
    }

    fn stash(&mut self) {
        match self.current.take() {
            Some(envelope) if envelope.message().is_signal() => {
                tracing::warn!(pid = %self.self_pid, "lifecycle signals cannot be stashed");
                self.current = Some(envelope);
            }
            Some(envelope) => self.stash.push(envelope),
            None => tracing::warn!(pid = %self.self_pid, "no message to stash"),
        }
    }

    fn set_receive_timeout(&mut self, duration: Duration) -> Result<(), ReceiveTimeoutError> {
        if duration.is_zero() {
            return Err(ReceiveTimeoutError::InvalidArgument(duration));
        }
        if self.receive_timeout == Some(duration) {
            return Ok(());
        }
        self.receive_timeout = Some(duration);
        self.start_receive_timer();
        Ok(())
    }

    fn cancel_receive_timeout(&mut self) {
        self.cancel_timer_and_timeout();
    }
}

impl Supervisor for ActorContext {
    fn children(&self) -> Vec<Pid> {
        Context::children(self)
    }

    fn restart_children(&mut self, reason: Arc<ActorError>, children: &[Pid]) {
        for child in children {
            self.send_system(
                child,
                SystemMessage::Restart {
                    reason: Arc::clone(&reason),
                },
            );
        }
    }

    fn stop_children(&mut self, children: &[Pid]) {
        for child in children {
            self.send_system(child, SystemMessage::Stop);
        }
    }

    fn resume_children(&mut self, children: &[Pid]) {
        for child in children {
            self.send_system(child, SystemMessage::ResumeMailbox);
        }
    }

    fn escalate_failure(&mut self, reason: Arc<ActorError>) {
        self.escalate(reason);
    }
}

async fn receive_decorated(
    actor: &mut dyn Actor,
    context: &mut ActorContext,
    decorators: &[ContextDecoratorFn],
) -> Result<(), ActorError> {
    if decorators.is_empty() {
        return actor.receive(context).await;
    }
    let base: Box<dyn Context + '_> = Box::new(Undecorated { inner: context });
    let mut decorated = decorators
        .iter()
        .rev()
        .fold(base, |inner, decorate| decorate(inner));
    actor.receive(decorated.as_mut()).await
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
