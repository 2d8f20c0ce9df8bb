//! Messages, envelopes and the lifecycle signals delivered to actors.
//!
//! User payloads are type-erased into a [`Message`]. Actors inspect them with
//! [`Message::downcast_ref`]. Lifecycle signals ([`Started`], [`Stopping`],
//! [`Stopped`], [`Restarting`], [`ReceiveTimeout`], [`Terminated`]) arrive
//! through the same path but are flagged as system signals: they cannot be
//! forwarded or stashed and never reset the receive timeout.
//!
//! Control traffic between contexts travels as [`SystemMessage`] on a
//! separate queue that the mailbox drains first.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::supervision::Failure;
use super::{ActorError, Pid};

/// A type-erased message payload.
pub struct Message {
    payload: Box<dyn Any + Send>,
    type_name: &'static str,
    signal: bool,
    influences_receive_timeout: bool,
}

impl Message {
    /// Wrap a user payload.
    pub fn new<M: Any + Send>(payload: M) -> Self {
        Self {
            payload: Box::new(payload),
            type_name: std::any::type_name::<M>(),
            signal: false,
            influences_receive_timeout: true,
        }
    }

    /// Wrap a payload that does not reset the receiver's receive timeout.
    pub fn not_influencing_receive_timeout<M: Any + Send>(payload: M) -> Self {
        Self {
            influences_receive_timeout: false,
            ..Self::new(payload)
        }
    }

    pub(crate) fn signal<M: Any + Send>(payload: M) -> Self {
        Self {
            signal: true,
            influences_receive_timeout: false,
            ..Self::new(payload)
        }
    }

    /// Whether the payload is of type `M`.
    pub fn is<M: Any>(&self) -> bool {
        self.payload.is::<M>()
    }

    /// Borrow the payload as `M`.
    pub fn downcast_ref<M: Any>(&self) -> Option<&M> {
        self.payload.downcast_ref::<M>()
    }

    /// Take the payload as `M`, or get the message back unchanged.
    pub fn downcast<M: Any>(self) -> Result<M, Message> {
        if self.payload.is::<M>() {
            match self.payload.downcast::<M>() {
                Ok(payload) => Ok(*payload),
                Err(payload) => Err(Self { payload, ..self }),
            }
        } else {
            Err(self)
        }
    }

    /// Name of the payload type, for logging.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether this is a lifecycle signal produced by the runtime.
    pub fn is_signal(&self) -> bool {
        self.signal
    }

    /// Whether processing this message resets the receive timeout.
    pub fn influences_receive_timeout(&self) -> bool {
        self.influences_receive_timeout
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.type_name)
            .field("signal", &self.signal)
            .finish()
    }
}

/// String headers attached to a message or a root context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeader(HashMap<String, String>);

impl MessageHeader {
    /// An empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy with `key` set to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a header value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether no headers are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A message plus its routing metadata.
#[derive(Debug)]
pub struct MessageEnvelope {
    message: Message,
    sender: Option<Pid>,
    header: MessageHeader,
}

impl MessageEnvelope {
    /// Envelope without sender or headers.
    pub fn new(message: Message) -> Self {
        Self {
            message,
            sender: None,
            header: MessageHeader::default(),
        }
    }

    pub(crate) fn signal<M: Any + Send>(payload: M) -> Self {
        Self::new(Message::signal(payload))
    }

    /// Set the reply address.
    pub fn with_sender(mut self, sender: Pid) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Set the headers.
    pub fn with_header(mut self, header: MessageHeader) -> Self {
        self.header = header;
        self
    }

    /// The payload.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The reply address, if any.
    pub fn sender(&self) -> Option<&Pid> {
        self.sender.as_ref()
    }

    /// The headers.
    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    /// Discard the metadata and keep the payload.
    pub fn into_message(self) -> Message {
        self.message
    }
}

/// First message every incarnation receives.
#[derive(Debug, Clone, Copy)]
pub struct Started;

/// The actor is about to stop; release resources here.
#[derive(Debug, Clone, Copy)]
pub struct Stopping;

/// Last message the actor receives; all children are gone.
#[derive(Debug, Clone, Copy)]
pub struct Stopped;

/// The actor is about to be replaced by a fresh incarnation.
#[derive(Debug, Clone, Copy)]
pub struct Restarting;

/// No influencing message arrived within the receive timeout.
#[derive(Debug, Clone, Copy)]
pub struct ReceiveTimeout;

/// Stops the receiving actor once every message queued before it is handled.
#[derive(Debug, Clone, Copy)]
pub struct PoisonPill;

/// A watched actor (or a child) has terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminated {
    who: Pid,
}

impl Terminated {
    /// Termination notice for `who`.
    pub fn new(who: Pid) -> Self {
        Self { who }
    }

    /// The terminated actor.
    pub fn who(&self) -> &Pid {
        &self.who
    }
}

/// Control messages exchanged between contexts and processes.
#[derive(Debug, Clone)]
pub enum SystemMessage {
    /// Begin the stop sequence.
    Stop,
    /// `watcher` wants a [`Terminated`] notice when the target stops.
    Watch {
        /// The actor to notify.
        watcher: Pid,
    },
    /// `watcher` is no longer interested.
    Unwatch {
        /// The actor that registered the watch.
        watcher: Pid,
    },
    /// `who` has terminated.
    Terminated {
        /// The terminated actor.
        who: Pid,
    },
    /// A child failed and asks its supervisor for a directive.
    Failure(Failure),
    /// Replace the actor instance with a fresh incarnation.
    Restart {
        /// Why the restart was ordered.
        reason: Arc<ActorError>,
    },
    /// Stop dequeuing user messages.
    SuspendMailbox,
    /// Resume dequeuing user messages.
    ResumeMailbox,
    /// A receive timer armed with `generation` has elapsed.
    ReceiveTimeoutElapsed {
        /// Timer generation, stale generations are ignored.
        generation: u64,
    },
}

impl SystemMessage {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            SystemMessage::Stop => "Stop",
            SystemMessage::Watch { .. } => "Watch",
            SystemMessage::Unwatch { .. } => "Unwatch",
            SystemMessage::Terminated { .. } => "Terminated",
            SystemMessage::Failure(_) => "Failure",
            SystemMessage::Restart { .. } => "Restart",
            SystemMessage::SuspendMailbox => "SuspendMailbox",
            SystemMessage::ResumeMailbox => "ResumeMailbox",
            SystemMessage::ReceiveTimeoutElapsed { .. } => "ReceiveTimeoutElapsed",
        }
    }
}
