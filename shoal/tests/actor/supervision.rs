//! Failure handling, restarts and stash replay.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shoal::actor::{
    Actor, ActorError, ActorSystem, Context, Message, Pid, Props, Started, SupervisorDirective,
    SupervisorStrategy,
};

use crate::common::{init_tracing, signal_name, wait_until, Recorder};

/// Counts messages; fails on "fail", panics on "panic".
struct Counter {
    count: u32,
    log: Recorder,
}

#[async_trait::async_trait]
impl Actor for Counter {
    async fn receive(&mut self, ctx: &mut dyn Context) -> Result<(), ActorError> {
        let Some(message) = ctx.message() else {
            return Ok(());
        };
        if message.is::<Started>() {
            self.log.push("started");
            return Ok(());
        }
        match message.downcast_ref::<&'static str>().copied() {
            Some("fail") => Err(ActorError::failed("asked to fail")),
            Some("panic") => panic!("asked to panic"),
            Some(_) => {
                self.count += 1;
                self.log.push(format!("count {}", self.count));
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn counter(log: &Recorder) -> Props {
    let log = log.clone();
    Props::from_producer(move || Counter {
        count: 0,
        log: log.clone(),
    })
}

/// Spawns one child from `child` and publishes its pid.
fn parent(child: Props, strategy: SupervisorStrategy, slot: Arc<Mutex<Option<Pid>>>, log: Recorder) -> Props {
    Props::from_fn(move |ctx: &mut dyn Context| {
        match ctx.message().and_then(signal_name).as_deref() {
            Some("started") => {
                let pid = ctx.spawn(child.clone())?;
                *slot.lock() = Some(pid);
            }
            Some(other) if other.starts_with("terminated") => log.push("child terminated"),
            _ => {}
        }
        Ok(())
    })
    .with_supervisor_strategy(strategy)
}

async fn spawned_child(slot: &Arc<Mutex<Option<Pid>>>) -> Pid {
    wait_until("child spawned", || slot.lock().is_some()).await;
    slot.lock().clone().expect("child pid")
}

#[tokio::test]
async fn test_top_level_failure_restarts_with_fresh_state() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let log = Recorder::default();

    let pid = root.spawn(counter(&log)).expect("spawn");
    root.send(&pid, Message::new("inc"));
    root.send(&pid, Message::new("fail"));
    root.send(&pid, Message::new("inc"));

    wait_until("message after restart", || log.len() == 4).await;
    assert_eq!(
        log.entries(),
        vec!["started", "count 1", "started", "count 1"]
    );
}

#[tokio::test]
async fn test_panic_is_a_failure() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let log = Recorder::default();

    let pid = root.spawn(counter(&log)).expect("spawn");
    root.send(&pid, Message::new("panic"));
    root.send(&pid, Message::new("inc"));

    wait_until("message after restart", || log.count("count 1") == 1).await;
    assert_eq!(log.count("started"), 2);
}

#[tokio::test]
async fn test_resume_keeps_state() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let log = Recorder::default();
    let slot = Arc::new(Mutex::new(None));

    root.spawn(parent(
        counter(&log),
        SupervisorStrategy::Resume,
        slot.clone(),
        Recorder::default(),
    ))
    .expect("spawn parent");
    let child = spawned_child(&slot).await;

    root.send(&child, Message::new("inc"));
    root.send(&child, Message::new("fail"));
    root.send(&child, Message::new("inc"));

    wait_until("second count", || log.count("count 2") == 1).await;
    assert_eq!(log.count("started"), 1);
}

#[tokio::test]
async fn test_restart_limit_stops_child() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let log = Recorder::default();
    let parent_log = Recorder::default();
    let slot = Arc::new(Mutex::new(None));

    let strategy = SupervisorStrategy::Restart {
        max_retries: 1,
        within: None,
    };
    root.spawn(parent(counter(&log), strategy, slot.clone(), parent_log.clone()))
        .expect("spawn parent");
    let child = spawned_child(&slot).await;

    root.send(&child, Message::new("fail"));
    wait_until("restart", || log.count("started") == 2).await;
    root.send(&child, Message::new("fail"));

    wait_until("child terminated", || parent_log.count("child terminated") == 1).await;
    assert_eq!(log.count("started"), 2);
    assert!(system.registry().lookup(child.id()).is_none());
}

#[tokio::test]
async fn test_decider_picks_directive() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let log = Recorder::default();
    let parent_log = Recorder::default();
    let slot = Arc::new(Mutex::new(None));

    let strategy = SupervisorStrategy::Decide {
        decider: Arc::new(|_: &Pid, reason: &ActorError| {
            if reason.to_string().contains("panic") {
                SupervisorDirective::Stop
            } else {
                SupervisorDirective::Restart
            }
        }),
        max_retries: 10,
        within: Some(Duration::from_secs(10)),
    };
    root.spawn(parent(counter(&log), strategy, slot.clone(), parent_log.clone()))
        .expect("spawn parent");
    let child = spawned_child(&slot).await;

    root.send(&child, Message::new("fail"));
    wait_until("restart", || log.count("started") == 2).await;
    root.send(&child, Message::new("panic"));
    wait_until("child terminated", || parent_log.count("child terminated") == 1).await;
}

#[tokio::test]
async fn test_escalation_restarts_supervisor() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let log = Recorder::default();
    let starts = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<Pid>>> = Arc::new(Mutex::new(None));

    let child_props = counter(&log);
    let counted = starts.clone();
    let published = slot.clone();
    root.spawn(
        Props::from_fn(move |ctx: &mut dyn Context| {
            if ctx.message().is_some_and(|m| m.is::<Started>()) {
                counted.fetch_add(1, Ordering::SeqCst);
                let pid = ctx.spawn(child_props.clone())?;
                *published.lock() = Some(pid);
            }
            Ok(())
        })
        .with_supervisor_strategy(SupervisorStrategy::Escalate),
    )
    .expect("spawn parent");
    let first_child = spawned_child(&slot).await;

    root.send(&first_child, Message::new("fail"));
    wait_until("parent restarted", || starts.load(Ordering::SeqCst) == 2).await;
    wait_until("first child gone", || {
        system.registry().lookup(first_child.id()).is_none()
    })
    .await;
    let second_child = slot.lock().clone().expect("child pid");
    assert_ne!(first_child, second_child);
}

#[tokio::test]
async fn test_guardian_strategy_supervises_top_level_actor() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let log = Recorder::default();

    let pid = root
        .spawn(counter(&log).with_guardian_strategy(SupervisorStrategy::Stop))
        .expect("spawn");
    root.send(&pid, Message::new("fail"));

    wait_until("actor stopped", || system.registry().lookup(pid.id()).is_none()).await;
    assert_eq!(log.count("started"), 1);
}

/// First incarnation stashes everything; later ones record.
struct Stasher {
    incarnation: usize,
    log: Recorder,
}

#[async_trait::async_trait]
impl Actor for Stasher {
    async fn receive(&mut self, ctx: &mut dyn Context) -> Result<(), ActorError> {
        let Some(text) = ctx
            .message()
            .and_then(|m| m.downcast_ref::<&'static str>())
            .copied()
        else {
            return Ok(());
        };
        if text == "boom" {
            return Err(ActorError::failed("boom"));
        }
        if self.incarnation == 1 {
            ctx.stash();
        } else {
            self.log.push(text);
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_stash_replayed_in_order_before_later_messages() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let log = Recorder::default();
    let incarnations = Arc::new(AtomicUsize::new(0));

    let recorder = log.clone();
    let counter = incarnations.clone();
    let pid = root
        .spawn(Props::from_producer(move || Stasher {
            incarnation: counter.fetch_add(1, Ordering::SeqCst) + 1,
            log: recorder.clone(),
        }))
        .expect("spawn");

    for text in ["s1", "s2", "s3", "boom", "after"] {
        root.send(&pid, Message::new(text));
    }

    wait_until("all replayed", || log.len() == 4).await;
    assert_eq!(log.entries(), vec!["s1", "s2", "s3", "after"]);
}

#[tokio::test]
async fn test_stash_is_dropped_on_stop() {
    init_tracing();
    let system = ActorSystem::new();
    let root = system.root();
    let log = Recorder::default();

    let recorder = log.clone();
    let pid = root
        .spawn(Props::from_producer(move || Stasher {
            incarnation: 1,
            log: recorder.clone(),
        }))
        .expect("spawn");
    root.send(&pid, Message::new("s1"));
    root.stop_future(&pid).await.expect("stopped");

    assert!(log.entries().is_empty());
}
