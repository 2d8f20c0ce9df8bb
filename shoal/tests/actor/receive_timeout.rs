//! Idle detection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use shoal::actor::{
    ActorSystem, Context, Message, Props, ReceiveTimeout, ReceiveTimeoutError, Started,
};

use crate::common::{init_tracing, wait_until, Recorder};

/// Sets `timeout` on start and records when each timeout signal arrives.
fn idle_actor(timeout: Duration, fired: Arc<Mutex<Vec<Instant>>>) -> Props {
    Props::from_fn(move |ctx: &mut dyn Context| {
        let Some(message) = ctx.message() else {
            return Ok(());
        };
        if message.is::<Started>() {
            ctx.set_receive_timeout(timeout)?;
        } else if message.is::<ReceiveTimeout>() {
            fired.lock().push(Instant::now());
        } else if message.is::<&'static str>() {
            if message.downcast_ref::<&'static str>() == Some(&"cancel") {
                ctx.cancel_receive_timeout();
            }
        }
        Ok(())
    })
}

#[tokio::test]
async fn test_idle_actor_gets_one_timeout() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let fired: Arc<Mutex<Vec<Instant>>> = Default::default();

    let spawned = Instant::now();
    root.spawn(idle_actor(Duration::from_millis(50), fired.clone()))
        .expect("spawn");

    tokio::time::sleep(Duration::from_millis(300)).await;
    let fired = fired.lock();
    assert_eq!(fired.len(), 1);
    assert!(fired[0].duration_since(spawned) >= Duration::from_millis(50));
}

#[tokio::test]
async fn test_messages_postpone_timeout() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let fired: Arc<Mutex<Vec<Instant>>> = Default::default();

    let pid = root
        .spawn(idle_actor(Duration::from_millis(150), fired.clone()))
        .expect("spawn");
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        root.send(&pid, Message::new(1u8));
    }
    assert!(fired.lock().is_empty());

    wait_until("timeout after going idle", || fired.lock().len() == 1).await;
}

#[tokio::test]
async fn test_non_influencing_messages_do_not_postpone() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let fired: Arc<Mutex<Vec<Instant>>> = Default::default();

    let spawned = Instant::now();
    let pid = root
        .spawn(idle_actor(Duration::from_millis(100), fired.clone()))
        .expect("spawn");
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        root.send(&pid, Message::not_influencing_receive_timeout(1u8));
    }

    let fired = fired.lock();
    assert_eq!(fired.len(), 1);
    assert!(fired[0].duration_since(spawned) >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_timeout_rearms_after_next_message() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let fired: Arc<Mutex<Vec<Instant>>> = Default::default();

    let pid = root
        .spawn(idle_actor(Duration::from_millis(30), fired.clone()))
        .expect("spawn");
    wait_until("first timeout", || fired.lock().len() == 1).await;

    root.send(&pid, Message::new(1u8));
    wait_until("second timeout", || fired.lock().len() == 2).await;
}

#[tokio::test]
async fn test_cancelled_timeout_never_fires() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let fired: Arc<Mutex<Vec<Instant>>> = Default::default();

    let pid = root
        .spawn(idle_actor(Duration::from_millis(60), fired.clone()))
        .expect("spawn");
    root.send(&pid, Message::new("cancel"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(fired.lock().is_empty());
}

#[tokio::test]
async fn test_zero_timeout_is_rejected() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let log = Recorder::default();

    let recorder = log.clone();
    root.spawn(Props::from_fn(move |ctx: &mut dyn Context| {
        if ctx.message().is_some_and(|m| m.is::<Started>()) {
            match ctx.set_receive_timeout(Duration::ZERO) {
                Err(ReceiveTimeoutError::InvalidArgument(_)) => recorder.push("rejected"),
                Ok(()) => recorder.push("accepted"),
            }
            recorder.push(format!("{:?}", ctx.receive_timeout()));
        }
        Ok(())
    }))
    .expect("spawn");

    wait_until("attempt recorded", || log.len() == 2).await;
    assert_eq!(log.entries(), vec!["rejected", "None"]);
}
