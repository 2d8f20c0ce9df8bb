//! Entry point for code running outside any actor.

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::context::direct_sender;
use super::future::{RequestBound, RequestFuture};
use super::guardian::GuardianProcess;
use super::message::{Message, MessageEnvelope, MessageHeader, PoisonPill, SystemMessage};
use super::props::{compose_senders, Props, Sender, SenderMiddleware, SpawnError};
use super::system::ActorSystem;
use super::Pid;

/// Sends, requests and spawns on behalf of non-actor callers.
///
/// Holds no state besides its headers and sender middleware, so it is cheap
/// to clone and safe to share across threads.
#[derive(Clone)]
pub struct RootContext {
    system: ActorSystem,
    headers: MessageHeader,
    middleware: Vec<SenderMiddleware>,
    sender: Sender,
}

impl RootContext {
    pub(crate) fn new(system: ActorSystem) -> Self {
        let sender = direct_sender(system.clone());
        Self {
            system,
            headers: MessageHeader::default(),
            middleware: Vec::new(),
            sender,
        }
    }

    /// Headers handed to the sender middleware.
    pub fn with_headers(mut self, headers: MessageHeader) -> Self {
        self.headers = headers;
        self
    }

    /// Wrap every send. The first middleware added is the outermost.
    pub fn with_sender_middleware<F>(mut self, middleware: F) -> Self
    where
        F: Fn(Sender) -> Sender + Send + Sync + 'static,
    {
        self.middleware.push(std::sync::Arc::new(middleware));
        self.sender = compose_senders(&self.middleware, direct_sender(self.system.clone()));
        self
    }

    /// The actor system.
    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    /// Headers of this context.
    pub fn headers(&self) -> &MessageHeader {
        &self.headers
    }

    /// Spawn a top-level actor with a generated name.
    pub fn spawn(&self, props: Props) -> Result<Pid, SpawnError> {
        let name = self.system.registry().next_id();
        self.spawn_named(props, &name)
    }

    /// Spawn a top-level actor whose name starts with `prefix`.
    pub fn spawn_prefix(&self, props: Props, prefix: &str) -> Result<Pid, SpawnError> {
        let name = format!("{prefix}{}", self.system.registry().next_id());
        self.spawn_named(props, &name)
    }

    /// Spawn a top-level actor called `name`.
    ///
    /// Props carrying a guardian strategy get a dedicated guardian as
    /// parent; otherwise the actor has no parent and failures use the
    /// system default strategy.
    pub fn spawn_named(&self, props: Props, name: &str) -> Result<Pid, SpawnError> {
        let Some(strategy) = props.guardian_strategy().cloned() else {
            return props.spawn(&self.system, name, None);
        };
        let guardian = GuardianProcess::register(&self.system, strategy);
        match props.spawn(&self.system, name, Some(guardian.pid().clone())) {
            Ok(pid) => {
                guardian.adopt(pid.clone());
                Ok(pid)
            }
            Err(err) => {
                guardian.release();
                Err(err)
            }
        }
    }

    /// Send `message` to `target`.
    pub fn send(&self, target: &Pid, message: Message) {
        self.deliver(target, MessageEnvelope::new(message));
    }

    /// Send `message` to `target` with an explicit reply address.
    pub fn request(&self, target: &Pid, message: Message, reply_to: Pid) {
        self.deliver(target, MessageEnvelope::new(message).with_sender(reply_to));
    }

    /// Send `message` and await the first reply within `timeout`.
    pub fn request_async(&self, target: &Pid, message: Message, timeout: Duration) -> RequestFuture {
        self.request_with(target, message, RequestBound::Timeout(timeout))
    }

    /// Send `message` and await the first reply until `token` is cancelled.
    pub fn request_async_cancellable(
        &self,
        target: &Pid,
        message: Message,
        token: CancellationToken,
    ) -> RequestFuture {
        self.request_with(target, message, RequestBound::Cancellation(token))
    }

    /// Ask `target` to stop.
    pub fn stop(&self, target: &Pid) {
        self.system.process_for(target).stop(target);
    }

    /// Stop `target` after the messages already queued for it.
    pub fn poison(&self, target: &Pid) {
        self.send(target, Message::new(PoisonPill));
    }

    /// Stop `target` and resolve once it has terminated.
    pub fn stop_future(&self, target: &Pid) -> RequestFuture {
        let (watcher, future) = RequestFuture::register(&self.system, RequestBound::Unbounded);
        let process = self.system.process_for(target);
        process.send_system_message(target, SystemMessage::Watch { watcher });
        process.stop(target);
        future
    }

    fn request_with(&self, target: &Pid, message: Message, bound: RequestBound) -> RequestFuture {
        let (reply_to, future) = RequestFuture::register(&self.system, bound);
        self.deliver(target, MessageEnvelope::new(message).with_sender(reply_to));
        future
    }

    fn deliver(&self, target: &Pid, envelope: MessageEnvelope) {
        (self.sender)(&self.headers, target, envelope);
    }
}

impl fmt::Debug for RootContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootContext")
            .field("address", &self.system.address())
            .field("headers", &self.headers)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}
