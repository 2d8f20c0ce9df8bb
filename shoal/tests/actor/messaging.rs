//! Send, request, respond, forward, middleware, decorators and dead letters.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use shoal::actor::{
    Actor, ActorError, ActorSystem, Context, ContextDecorator, DeadLetterEvent, Message,
    MessageEnvelope, MessageHeader, Pid, Props, RequestError, Sender, Started,
};

use crate::common::{init_tracing, wait_until, Recorder};

fn echo() -> Props {
    Props::from_fn(|ctx: &mut dyn Context| {
        if let Some(text) = ctx.message().and_then(|m| m.downcast_ref::<String>()) {
            let reply = text.clone();
            ctx.respond(Message::new(reply));
        }
        Ok(())
    })
}

#[tokio::test]
async fn test_fifo_between_one_sender_and_target() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let seen: Arc<Mutex<Vec<u32>>> = Default::default();

    let sink = seen.clone();
    let pid = root
        .spawn(Props::from_fn(move |ctx: &mut dyn Context| {
            if let Some(n) = ctx.message().and_then(|m| m.downcast_ref::<u32>()) {
                sink.lock().push(*n);
            }
            Ok(())
        }))
        .expect("spawn");

    for n in 0..1000u32 {
        root.send(&pid, Message::new(n));
    }
    wait_until("all messages", || seen.lock().len() == 1000).await;
    assert_eq!(*seen.lock(), (0..1000).collect::<Vec<u32>>());
}

#[tokio::test]
async fn test_request_to_silent_actor_times_out() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let silent = root.spawn(Props::from_fn(|_| Ok(()))).expect("spawn");

    let started = Instant::now();
    let result = root
        .request_async(&silent, Message::new("hello".to_string()), Duration::from_millis(20))
        .await;

    let err = result.expect_err("no reply expected");
    assert!(matches!(err, RequestError::Timeout));
    assert_eq!(
        err.to_string(),
        "Request didn't receive any Response within the expected time."
    );
    assert!(started.elapsed() >= Duration::from_millis(20));
}

#[tokio::test]
async fn test_request_to_replying_actor_resolves() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let pid = root
        .spawn(Props::from_fn(|ctx: &mut dyn Context| {
            if ctx.message().is_some_and(|m| m.is::<String>()) {
                ctx.respond(Message::new("hey".to_string()));
            }
            Ok(())
        }))
        .expect("spawn");

    let reply: String = root
        .request_async(&pid, Message::new("hello".to_string()), Duration::from_millis(100))
        .downcast()
        .await
        .expect("reply");
    assert_eq!(reply, "hey");
}

#[tokio::test]
async fn test_unexpected_reply_type() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let pid = root.spawn(echo()).expect("spawn");

    let result = root
        .request_async(&pid, Message::new("text".to_string()), Duration::from_secs(1))
        .downcast::<u64>()
        .await;
    assert!(matches!(result, Err(RequestError::UnexpectedResponse { .. })));
}

#[tokio::test]
async fn test_cancelled_request() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let silent = root.spawn(Props::from_fn(|_| Ok(()))).expect("spawn");

    let token = tokio_util::sync::CancellationToken::new();
    let future = root.request_async_cancellable(&silent, Message::new(1u8), token.clone());
    token.cancel();
    assert!(matches!(future.await, Err(RequestError::Cancelled)));
}

/// Awaits a request to another actor inside its handler.
struct Asker {
    target: Pid,
    replies: Recorder,
}

#[async_trait::async_trait]
impl Actor for Asker {
    async fn receive(&mut self, ctx: &mut dyn Context) -> Result<(), ActorError> {
        let question = ctx
            .message()
            .and_then(|m| m.downcast_ref::<String>())
            .cloned();
        let Some(question) = question else {
            return Ok(());
        };
        let reply = ctx.request_async(&self.target, Message::new(question), Duration::from_secs(1));
        let answer: String = reply.downcast().await?;
        self.replies.push(answer);
        Ok(())
    }
}

#[tokio::test]
async fn test_actor_awaits_requests_sequentially() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let target = root.spawn(echo()).expect("spawn echo");
    let replies = Recorder::default();

    let log = replies.clone();
    let asker = root
        .spawn(Props::from_producer(move || Asker {
            target: target.clone(),
            replies: log.clone(),
        }))
        .expect("spawn asker");

    for question in ["a", "b", "c"] {
        root.send(&asker, Message::new(question.to_string()));
    }
    wait_until("three replies", || replies.len() == 3).await;
    assert_eq!(replies.entries(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_forward_keeps_original_sender() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let target = root.spawn(echo()).expect("spawn echo");
    let proxy = root
        .spawn(Props::from_fn(move |ctx: &mut dyn Context| {
            if ctx.message().is_some_and(|m| m.is::<String>()) {
                ctx.forward(&target);
            }
            Ok(())
        }))
        .expect("spawn proxy");

    let reply: String = root
        .request_async(&proxy, Message::new("ping".to_string()), Duration::from_secs(1))
        .downcast()
        .await
        .expect("reply");
    assert_eq!(reply, "ping");
}

#[tokio::test]
async fn test_lifecycle_signal_cannot_be_forwarded() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let starts = Recorder::default();

    let log = starts.clone();
    let target = root
        .spawn(Props::from_fn(move |ctx: &mut dyn Context| {
            if ctx.message().is_some_and(|m| m.is::<Started>()) {
                log.push("started");
            }
            Ok(())
        }))
        .expect("spawn target");
    wait_until("target started", || starts.len() == 1).await;

    root.spawn(Props::from_fn(move |ctx: &mut dyn Context| {
        if ctx.message().is_some_and(|m| m.is::<Started>()) {
            ctx.forward(&target);
        }
        Ok(())
    }))
    .expect("spawn forwarder");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(starts.len(), 1);
}

#[tokio::test]
async fn test_root_sender_middleware_sees_headers() {
    init_tracing();
    let system = ActorSystem::new();
    let seen = Recorder::default();
    let log = seen.clone();
    let root = system
        .root()
        .with_headers(MessageHeader::new().with("trace", "abc"))
        .with_sender_middleware(move |next: Sender| -> Sender {
            let log = log.clone();
            Arc::new(move |header: &MessageHeader, target: &Pid, envelope: MessageEnvelope| {
                log.push(format!("{} -> {}", header.get("trace").unwrap_or("-"), target.id()));
                next(header, target, envelope);
            })
        });

    let pid = root.spawn_named(echo(), "echo").expect("spawn");
    let reply: String = root
        .request_async(&pid, Message::new("x".to_string()), Duration::from_secs(1))
        .downcast()
        .await
        .expect("reply");

    assert_eq!(reply, "x");
    assert_eq!(seen.entries(), vec!["abc -> echo"]);
}

#[tokio::test]
async fn test_actor_sender_middleware_wraps_sends() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let seen = Recorder::default();
    let target = root.spawn(Props::from_fn(|_| Ok(()))).expect("spawn target");

    let log = seen.clone();
    let forwarded_to = target.clone();
    let props = Props::from_fn(move |ctx: &mut dyn Context| {
        if ctx.message().is_some_and(|m| m.is::<String>()) {
            ctx.send(&forwarded_to, Message::new(1u8));
        }
        Ok(())
    })
    .with_sender_middleware(move |next: Sender| -> Sender {
        let log = log.clone();
        Arc::new(move |header: &MessageHeader, target: &Pid, envelope: MessageEnvelope| {
            log.push(envelope.message().type_name());
            next(header, target, envelope);
        })
    });
    let sender = root.spawn(props).expect("spawn sender");

    root.send(&sender, Message::new("go".to_string()));
    wait_until("middleware invoked", || seen.len() == 1).await;
    assert_eq!(seen.entries(), vec!["u8"]);
}

struct Tagging<'a> {
    inner: Box<dyn Context + 'a>,
}

impl ContextDecorator for Tagging<'_> {
    fn inner(&self) -> &dyn Context {
        &*self.inner
    }

    fn inner_mut(&mut self) -> &mut dyn Context {
        &mut *self.inner
    }

    fn respond(&mut self, message: Message) {
        match message.downcast::<String>() {
            Ok(text) => self.inner_mut().respond(Message::new(format!("[tagged] {text}"))),
            Err(message) => self.inner_mut().respond(message),
        }
    }
}

#[tokio::test]
async fn test_context_decorator_intercepts_operations() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let props = echo().with_context_decorator(|inner| Box::new(Tagging { inner }));
    let pid = root.spawn(props).expect("spawn");

    let reply: String = root
        .request_async(&pid, Message::new("hi".to_string()), Duration::from_secs(1))
        .downcast()
        .await
        .expect("reply");
    assert_eq!(reply, "[tagged] hi");
}

#[tokio::test]
async fn test_decorators_compose_first_outermost() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let props = echo()
        .with_context_decorator(|inner| Box::new(Tagging { inner }))
        .with_context_decorator(|inner| Box::new(Tagging { inner }));
    let pid = root.spawn(props).expect("spawn");

    let reply: String = root
        .request_async(&pid, Message::new("hi".to_string()), Duration::from_secs(1))
        .downcast()
        .await
        .expect("reply");
    assert_eq!(reply, "[tagged] [tagged] hi");
}

#[tokio::test]
async fn test_send_to_unknown_pid_is_a_dead_letter() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let letters: Arc<Mutex<Vec<DeadLetterEvent>>> = Default::default();

    let sink = letters.clone();
    system
        .dead_letters()
        .subscribe(move |event: &DeadLetterEvent| sink.lock().push(event.clone()));

    let missing = Pid::new(system.address(), "missing");
    root.send(&missing, Message::new(7u32));

    let letters = letters.lock();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].pid, missing);
    assert_eq!(letters[0].message_type, "u32");
}

#[tokio::test]
async fn test_send_to_stopped_actor_is_a_dead_letter() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let count = Recorder::default();

    let log = count.clone();
    system
        .dead_letters()
        .subscribe(move |_: &DeadLetterEvent| log.push("dead letter"));

    let pid = root.spawn(Props::from_fn(|_| Ok(()))).expect("spawn");
    root.stop_future(&pid).await.expect("stopped");
    root.send(&pid, Message::new("late"));

    wait_until("dead letter", || count.len() == 1).await;
}
