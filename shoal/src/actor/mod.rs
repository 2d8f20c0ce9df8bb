//! Actor execution core.
//!
//! Actors are isolated units of state that communicate only through
//! messages. Each one is driven by an [`ActorContext`] that processes one
//! message at a time, supervises children and propagates termination to
//! watchers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  send   ┌────────────────┐  resolve  ┌──────────────┐
//! │ RootContext  │────────►│ ActorSystem    │──────────►│ Process      │
//! │ or Context   │         │ ProcessRegistry│           │ Local/Remote │
//! └──────────────┘         └────────────────┘           └──────┬───────┘
//!                                                              │ mailbox
//!                                                       ┌──────▼───────┐
//!                                                       │ ActorContext │
//!                                                       │ → Actor      │
//!                                                       └──────────────┘
//! ```
//!
//! # Supervision
//!
//! A handler error or panic suspends the failing actor's mailbox and sends a
//! [`Failure`] to its parent. Top-level actors fall back to the system's
//! default strategy (always restart unless configured otherwise).

mod context;
mod event_stream;
mod future;
mod guardian;
mod message;
mod pid;
mod process;
mod props;
mod registry;
mod root;
mod supervision;
mod system;

pub use context::{ActorContext, Context, ContextDecorator, ContextDecoratorFn, ReceiveTimeoutError};
pub use event_stream::{DeadLetterEvent, EventStream, Subscription};
pub use future::{FutureProcess, RequestError, RequestFuture};
pub use message::{
    Message, MessageEnvelope, MessageHeader, PoisonPill, ReceiveTimeout, Restarting, Started,
    Stopped, Stopping, SystemMessage, Terminated,
};
pub use pid::{Pid, NO_HOST};
pub use process::{DeadLetterProcess, LocalProcess, Process};
pub use props::{Actor, ActorError, Props, Sender, SenderMiddleware, SpawnError};
pub use registry::{HostResolver, ProcessRegistry, PARTITION_COUNT};
pub use root::RootContext;
pub use supervision::{
    Decider, Failure, RestartStatistics, Supervisor, SupervisorDirective, SupervisorStrategy,
};
pub use system::{ActorSystem, SystemConfig, SystemConfigBuilder, WeakActorSystem};
