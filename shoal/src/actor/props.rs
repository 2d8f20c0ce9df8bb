//! Actor behavior and spawn configuration.

use std::fmt;
use std::sync::Arc;

use super::context::{self, ContextDecoratorFn};
use super::future::RequestError;
use super::message::{MessageEnvelope, MessageHeader};
use super::supervision::SupervisorStrategy;
use super::system::ActorSystem;
use super::{Context, Pid, ReceiveTimeoutError};

/// Actor behavior.
///
/// `receive` is called for one message at a time; the next message is not
/// dequeued before the returned future completes. Returning an error (or
/// panicking) hands the failure to the supervisor.
#[async_trait::async_trait]
pub trait Actor: Send + 'static {
    /// Handle the current message, available through [`Context::message`].
    async fn receive(&mut self, ctx: &mut dyn Context) -> Result<(), ActorError>;

    /// Policy for failures of this actor's children. `None` falls back to
    /// the props, then to the system default.
    fn supervisor_strategy(&self) -> Option<SupervisorStrategy> {
        None
    }
}

/// Reason an actor handler failed.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    /// Application failure.
    #[error("{0}")]
    Failed(String),
    /// The handler panicked.
    #[error("actor panicked: {0}")]
    Panicked(String),
    /// A request issued by the handler failed.
    #[error(transparent)]
    Request(#[from] RequestError),
    /// A spawn issued by the handler failed.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// An invalid receive timeout was requested.
    #[error(transparent)]
    ReceiveTimeout(#[from] ReceiveTimeoutError),
}

impl ActorError {
    /// Application failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        ActorError::Failed(message.into())
    }
}

/// Errors from spawning an actor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    /// The props cannot be used for this spawn.
    #[error("invalid spawn configuration: {0}")]
    Configuration(String),
    /// The identity is already registered.
    #[error("process name already exists: {0}")]
    NameExists(Pid),
}

/// Delivers an envelope to a target, given the sending context's headers.
pub type Sender = Arc<dyn Fn(&MessageHeader, &Pid, MessageEnvelope) + Send + Sync>;

/// Wraps a [`Sender`] into another one.
pub type SenderMiddleware = Arc<dyn Fn(Sender) -> Sender + Send + Sync>;

type Producer = Arc<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

/// How to create and supervise an actor.
#[derive(Clone)]
pub struct Props {
    producer: Producer,
    supervisor_strategy: Option<SupervisorStrategy>,
    guardian_strategy: Option<SupervisorStrategy>,
    sender_middleware: Vec<SenderMiddleware>,
    context_decorators: Vec<ContextDecoratorFn>,
}

impl Props {
    /// Props creating each incarnation with `producer`.
    pub fn from_producer<A, F>(producer: F) -> Self
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self {
            producer: Arc::new(move || Box::new(producer()) as Box<dyn Actor>),
            supervisor_strategy: None,
            guardian_strategy: None,
            sender_middleware: Vec::new(),
            context_decorators: Vec::new(),
        }
    }

    /// Props for a stateless actor defined by a closure.
    pub fn from_fn<F>(receive: F) -> Self
    where
        F: Fn(&mut dyn Context) -> Result<(), ActorError> + Send + Sync + 'static,
    {
        let receive = Arc::new(receive);
        Self::from_producer(move || FnActor {
            receive: Arc::clone(&receive),
        })
    }

    /// Policy for failures of the spawned actor's children.
    pub fn with_supervisor_strategy(mut self, strategy: SupervisorStrategy) -> Self {
        self.supervisor_strategy = Some(strategy);
        self
    }

    /// Supervise the spawned top-level actor with a dedicated guardian.
    ///
    /// Only valid for spawns from the root context.
    pub fn with_guardian_strategy(mut self, strategy: SupervisorStrategy) -> Self {
        self.guardian_strategy = Some(strategy);
        self
    }

    /// Wrap every send made by the spawned actor. The first middleware
    /// added is the outermost.
    pub fn with_sender_middleware<F>(mut self, middleware: F) -> Self
    where
        F: Fn(Sender) -> Sender + Send + Sync + 'static,
    {
        self.sender_middleware.push(Arc::new(middleware));
        self
    }

    /// Decorate the context handed to the actor. The first decorator added
    /// is the outermost.
    pub fn with_context_decorator<F>(mut self, decorator: F) -> Self
    where
        F: for<'a> Fn(Box<dyn Context + 'a>) -> Box<dyn Context + 'a> + Send + Sync + 'static,
    {
        self.context_decorators.push(Arc::new(decorator));
        self
    }

    /// Policy for failures of children, if set.
    pub fn supervisor_strategy(&self) -> Option<&SupervisorStrategy> {
        self.supervisor_strategy.as_ref()
    }

    /// Guardian policy, if set.
    pub fn guardian_strategy(&self) -> Option<&SupervisorStrategy> {
        self.guardian_strategy.as_ref()
    }

    pub(crate) fn produce(&self) -> Box<dyn Actor> {
        (self.producer)()
    }

    pub(crate) fn sender_middleware(&self) -> &[SenderMiddleware] {
        &self.sender_middleware
    }

    pub(crate) fn context_decorators(&self) -> &[ContextDecoratorFn] {
        &self.context_decorators
    }

    pub(crate) fn spawn(
        &self,
        system: &ActorSystem,
        id: &str,
        parent: Option<Pid>,
    ) -> Result<Pid, SpawnError> {
        context::spawn(system, self.clone(), id, parent)
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("supervisor_strategy", &self.supervisor_strategy)
            .field("guardian_strategy", &self.guardian_strategy)
            .field("sender_middleware", &self.sender_middleware.len())
            .field("context_decorators", &self.context_decorators.len())
            .finish()
    }
}

/// Compose `middleware` around `last`, first entry outermost.
pub(crate) fn compose_senders(middleware: &[SenderMiddleware], last: Sender) -> Sender {
    middleware
        .iter()
        .rev()
        .fold(last, |inner, wrap| wrap(inner))
}

struct FnActor<F> {
    receive: Arc<F>,
}

#[async_trait::async_trait]
impl<F> Actor for FnActor<F>
where
    F: Fn(&mut dyn Context) -> Result<(), ActorError> + Send + Sync + 'static,
{
    async fn receive(&mut self, ctx: &mut dyn Context) -> Result<(), ActorError> {
        (self.receive)(ctx)
    }
}
