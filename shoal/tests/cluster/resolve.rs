//! Placement and activation.

use std::time::Duration;

use parking_lot::Mutex;
use shoal::actor::Message;
use shoal::cluster::{
    ClusterEvent, MemberStatus, MemberStatusValue, MemberStrategy, MemberStrategyBuilder,
    Rendezvous, ResponseStatusCode,
};

use crate::common::{wait_until, Fixture, WhereAreYou, PLAYER};

#[tokio::test]
async fn test_resolution_is_deterministic_across_members() {
    let mut fixture = Fixture::new();
    for port in [5001, 5002, 5003] {
        fixture.start(port, &[PLAYER]).await;
    }
    fixture.converge(3).await;

    let mut resolved = Vec::new();
    for member in &fixture.members {
        let (pid, status) = member.cluster.get("player-42", PLAYER).await;
        assert_eq!(status, ResponseStatusCode::Ok);
        resolved.push(pid.expect("pid"));
    }
    assert!(resolved.windows(2).all(|pair| pair[0] == pair[1]));

    let mut addresses: Vec<String> = fixture
        .members
        .iter()
        .map(|m| m.address().to_string())
        .collect();
    addresses.sort();
    let expected = Rendezvous::from_addresses(addresses).owner("player-42").map(str::to_string);
    assert_eq!(Some(resolved[0].address().to_string()), expected);
    assert_eq!(resolved[0].id(), "player-42");
    assert_eq!(fixture.activations.count(), 1);
}

#[tokio::test]
async fn test_concurrent_resolves_activate_once() {
    let mut fixture = Fixture::new();
    for port in [5101, 5102, 5103] {
        fixture.start(port, &[PLAYER]).await;
    }
    fixture.converge(3).await;

    let mut tasks = Vec::new();
    for round in 0..30 {
        let cluster = fixture.member(round % 3).cluster.clone();
        tasks.push(tokio::spawn(async move { cluster.get("contended", PLAYER).await }));
    }
    let mut pids = Vec::new();
    for task in tasks {
        let (pid, status) = task.await.expect("task completes");
        assert_eq!(status, ResponseStatusCode::Ok);
        pids.push(pid.expect("pid"));
    }

    assert!(pids.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(fixture.activations.count(), 1);
}

#[tokio::test]
async fn test_unknown_kind_is_unavailable() {
    let mut fixture = Fixture::new();
    fixture.start(5201, &[PLAYER]).await;
    fixture.converge(1).await;

    let (pid, status) = fixture.member(0).cluster.get("lobby", "Room").await;
    assert_eq!(pid, None);
    assert_eq!(status, ResponseStatusCode::Unavailable);
}

#[tokio::test]
async fn test_only_members_supporting_the_kind_host_it() {
    let mut fixture = Fixture::new();
    fixture.start(5301, &[PLAYER]).await;
    fixture.start(5302, &[]).await;
    fixture.converge(2).await;

    let asking = &fixture.member(1).cluster;
    for i in 0..20 {
        let (pid, status) = asking.get(&format!("player-{i}"), PLAYER).await;
        assert_eq!(status, ResponseStatusCode::Ok);
        assert_eq!(pid.expect("pid").address(), "127.0.0.1:5301");
    }
}

#[tokio::test]
async fn test_resolved_pid_receives_remote_requests() {
    let mut fixture = Fixture::new();
    for port in [5401, 5402] {
        fixture.start(port, &[PLAYER]).await;
    }
    fixture.converge(2).await;

    for member in &fixture.members {
        let root = member.system.root();
        for i in 0..10 {
            let name = format!("player-{i}");
            let (pid, status) = member.cluster.get(&name, PLAYER).await;
            assert_eq!(status, ResponseStatusCode::Ok);
            let pid = pid.expect("pid");

            let address: String = root
                .request_async(&pid, Message::new(WhereAreYou), Duration::from_secs(1))
                .downcast()
                .await
                .expect("reply");
            assert_eq!(address, pid.address());
        }
    }
    assert_eq!(fixture.activations.count(), 10);
}

#[tokio::test]
async fn test_status_value_change_is_observed() {
    let mut fixture = Fixture::new();
    fixture.start(5501, &[PLAYER]).await;
    fixture.start(5502, &[PLAYER]).await;
    fixture.converge(2).await;

    let changed = std::sync::Arc::new(Mutex::new(Vec::new()));
    let sink = changed.clone();
    fixture
        .member(0)
        .cluster
        .events()
        .subscribe(move |event: &ClusterEvent| {
            if let ClusterEvent::MemberStatusValueChanged(member) = event {
                sink.lock().push((member.address().to_string(), member.status_value().cloned()));
            }
        });

    fixture
        .member(1)
        .cluster
        .update_member_status_value(Some(MemberStatusValue::from("draining")))
        .await
        .expect("status updated");

    wait_until("status change observed", || !changed.lock().is_empty()).await;
    assert_eq!(
        changed.lock()[0],
        (
            "127.0.0.1:5502".to_string(),
            Some(MemberStatusValue::from("draining"))
        )
    );
}

/// Keeps every name on the lowest address.
#[derive(Debug)]
struct Lowest(Option<String>);

impl MemberStrategy for Lowest {
    fn get_partition(&self, _key: &str) -> Option<String> {
        self.0.clone()
    }
}

fn lowest() -> MemberStrategyBuilder {
    MemberStrategyBuilder::new(|_, members: &[&MemberStatus]| {
        let lowest = members.first().map(|m| m.address().to_string());
        Box::new(Lowest(lowest)) as Box<dyn MemberStrategy>
    })
}

#[tokio::test]
async fn test_custom_member_strategy_places_activations() {
    let mut fixture = Fixture::new();
    for port in [5063, 5061, 5062] {
        fixture.start_with_strategy(port, &[PLAYER], lowest()).await;
    }
    fixture.converge(3).await;

    for member in &fixture.members {
        for i in 0..5 {
            let (pid, status) = member.cluster.get(&format!("player-{i}"), PLAYER).await;
            assert_eq!(status, ResponseStatusCode::Ok);
            assert_eq!(pid.expect("pid").address(), "127.0.0.1:5061");
        }
    }
    assert_eq!(fixture.activations.count(), 5);
}
