//! Request/response correlation.
//!
//! A request registers a short-lived [`FutureProcess`] in the registry and
//! sends the request with that process as the sender. The first reply (or a
//! `Terminated` notice, for stop futures) completes it; anything arriving
//! later is logged and dropped. The registration is removed as soon as the
//! [`RequestFuture`] resolves or is dropped.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::message::{Message, MessageEnvelope, SystemMessage, Terminated};
use super::process::Process;
use super::system::ActorSystem;
use super::Pid;

/// Errors surfaced to the caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// No reply arrived within the bound.
    #[error("Request didn't receive any Response within the expected time.")]
    Timeout,
    /// The caller's cancellation token fired first.
    #[error("request was cancelled")]
    Cancelled,
    /// The reply endpoint went away without a reply (system shutdown).
    #[error("request was abandoned before a response arrived")]
    Abandoned,
    /// The reply had another type than the one awaited.
    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// Type the caller asked for.
        expected: &'static str,
        /// Type that arrived.
        actual: &'static str,
    },
}

/// How long a request may wait.
#[derive(Debug, Clone)]
pub(crate) enum RequestBound {
    Unbounded,
    Timeout(Duration),
    Cancellation(CancellationToken),
}

/// Reply endpoint of a pending request.
pub struct FutureProcess {
    reply: Mutex<Option<oneshot::Sender<Message>>>,
}

impl FutureProcess {
    fn complete(&self, pid: &Pid, message: Message) {
        match self.reply.lock().take() {
            Some(reply) => {
                if reply.send(message).is_err() {
                    tracing::debug!(pid = %pid, "request abandoned before its reply arrived");
                }
            }
            None => {
                tracing::debug!(pid = %pid, message_type = message.type_name(), "late reply dropped");
            }
        }
    }
}

impl Process for FutureProcess {
    fn send_user_message(&self, pid: &Pid, envelope: MessageEnvelope) {
        self.complete(pid, envelope.into_message());
    }

    fn send_system_message(&self, pid: &Pid, message: SystemMessage) {
        match message {
            SystemMessage::Terminated { who } => {
                self.complete(pid, Message::signal(Terminated::new(who)));
            }
            other => {
                tracing::debug!(pid = %pid, message = other.name(), "future ignores system message");
            }
        }
    }
}

/// Removes the future from the registry when dropped.
struct Registration {
    system: ActorSystem,
    id: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.system.registry().remove(&self.id);
    }
}

/// Pending reply of a request.
#[must_use = "a request future does nothing unless awaited"]
pub struct RequestFuture {
    inner: BoxFuture<'static, Result<Message, RequestError>>,
}

impl RequestFuture {
    /// Register a reply endpoint. Returns its pid and the future.
    pub(crate) fn register(system: &ActorSystem, bound: RequestBound) -> (Pid, Self) {
        let registry = system.registry();
        let (tx, rx) = oneshot::channel();
        let process = std::sync::Arc::new(FutureProcess {
            reply: Mutex::new(Some(tx)),
        });
        let mut id = format!("future{}", registry.next_id());
        while !registry.try_register(&id, process.clone()) {
            id = format!("future{}", registry.next_id());
        }
        let pid = Pid::new(system.address(), id.clone());
        let registration = Registration {
            system: system.clone(),
            id,
        };
        // The bound runs from registration, not from the first poll.
        let deadline = match &bound {
            RequestBound::Timeout(timeout) => Some(tokio::time::Instant::now() + *timeout),
            _ => None,
        };
        let inner = async move {
            let _registration = registration;
            let reply = async { rx.await.map_err(|_| RequestError::Abandoned) };
            match (bound, deadline) {
                (RequestBound::Cancellation(token), _) => {
                    tokio::select! {
                        result = reply => result,
                        _ = token.cancelled() => Err(RequestError::Cancelled),
                    }
                }
                (_, Some(deadline)) => tokio::time::timeout_at(deadline, reply)
                    .await
                    .unwrap_or(Err(RequestError::Timeout)),
                _ => reply.await,
            }
        }
        .boxed();
        (pid, Self { inner })
    }

    /// Await the reply and take it as `T`.
    pub async fn downcast<T: Any>(self) -> Result<T, RequestError> {
        let message = self.await?;
        message
            .downcast::<T>()
            .map_err(|message| RequestError::UnexpectedResponse {
                expected: std::any::type_name::<T>(),
                actual: message.type_name(),
            })
    }
}

impl Future for RequestFuture {
    type Output = Result<Message, RequestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}
