//! Synchronous publish/subscribe.
//!
//! Handlers run inline on the publishing thread, in subscription order. The
//! subscriber list is copied before dispatch so a handler may publish or
//! (un)subscribe without deadlocking.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Pid;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Subscribers<E> {
    next_id: u64,
    handlers: Vec<(u64, Handler<E>)>,
}

/// A typed event stream shared by cloning.
pub struct EventStream<E> {
    subscribers: Arc<Mutex<Subscribers<E>>>,
}

/// Handle returned by [`EventStream::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

impl<E> EventStream<E> {
    /// An empty stream.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Subscribers {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Register a handler for every published event.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut subscribers = self.subscribers.lock();
        subscribers.next_id += 1;
        let id = subscribers.next_id;
        subscribers.handlers.push((id, Arc::new(handler)));
        Subscription(id)
    }

    /// Remove a handler. Unknown subscriptions are ignored.
    pub fn unsubscribe(&self, subscription: Subscription) {
        self.subscribers
            .lock()
            .handlers
            .retain(|(id, _)| *id != subscription.0);
    }

    /// Deliver `event` to every handler.
    pub fn publish(&self, event: &E) {
        let handlers: Vec<Handler<E>> = self
            .subscribers
            .lock()
            .handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().handlers.len()
    }
}

impl<E> Clone for EventStream<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<E> Default for EventStream<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// A message that could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterEvent {
    /// The intended recipient.
    pub pid: Pid,
    /// Payload type, or the system message name.
    pub message_type: &'static str,
    /// The sender recorded on the message, if any.
    pub sender: Option<Pid>,
}
