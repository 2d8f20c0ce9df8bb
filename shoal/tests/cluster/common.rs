//! Multi-member cluster fixture.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shoal::actor::{ActorSystem, Context, Message, Props, Started, SystemConfig};
use shoal::cluster::{
    Cluster, ClusterConfig, InMemoryClusterProvider, InMemoryProviderOptions, MemberStrategyBuilder,
    MembershipTable,
};
use shoal::remote::LoopbackNetwork;

pub const PLAYER: &str = "Player";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

/// Question answered by every player with its own pid's address.
#[derive(Debug, Clone)]
pub struct WhereAreYou;

/// Players started across the whole fixture.
#[derive(Debug, Clone, Default)]
pub struct Activations(Arc<AtomicUsize>);

impl Activations {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn player(activations: &Activations) -> Props {
    let activations = activations.clone();
    Props::from_fn(move |ctx: &mut dyn Context| {
        let Some(message) = ctx.message() else {
            return Ok(());
        };
        if message.is::<Started>() {
            activations.0.fetch_add(1, Ordering::SeqCst);
        } else if message.is::<WhereAreYou>() {
            let address = ctx.self_pid().address().to_string();
            ctx.respond(Message::new(address));
        }
        Ok(())
    })
}

pub fn fast_options() -> InMemoryProviderOptions {
    InMemoryProviderOptions {
        ttl: Duration::from_millis(300),
        refresh_interval: Duration::from_millis(20),
        deregister_critical: Duration::from_millis(300),
    }
}

pub struct Member {
    pub system: ActorSystem,
    pub cluster: Cluster,
}

impl Member {
    pub fn address(&self) -> &str {
        self.system.address()
    }
}

/// Members started on one network and membership table.
pub struct Fixture {
    pub network: LoopbackNetwork,
    pub table: Arc<MembershipTable>,
    pub activations: Activations,
    pub members: Vec<Member>,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        Self {
            network: LoopbackNetwork::new(),
            table: MembershipTable::new(),
            activations: Activations::default(),
            members: Vec::new(),
        }
    }

    /// Start a member at `127.0.0.1:{port}` supporting `kinds`.
    pub async fn start(&mut self, port: u16, kinds: &[&str]) -> &Member {
        self.start_with_strategy(port, kinds, MemberStrategyBuilder::default())
            .await
    }

    /// Like [`Fixture::start`], placing kinds with `strategy`.
    pub async fn start_with_strategy(
        &mut self,
        port: u16,
        kinds: &[&str],
        strategy: MemberStrategyBuilder,
    ) -> &Member {
        let address = format!("127.0.0.1:{port}");
        let system = ActorSystem::with_config(SystemConfig::builder().address(address).build());
        self.network.attach(&system);

        let provider = InMemoryClusterProvider::with_options(Arc::clone(&self.table), fast_options());
        let mut builder = ClusterConfig::builder()
            .name("test-cluster")
            .address("127.0.0.1", port)
            .provider(Arc::new(provider))
            .request_timeout(Duration::from_secs(2))
            .member_strategy(strategy);
        for kind in kinds {
            builder = builder.kind(*kind, player(&self.activations));
        }
        let config = builder.build().expect("valid config");
        let cluster = Cluster::start(&system, config).await.expect("cluster starts");
        self.members.push(Member { system, cluster });
        self.members.last().expect("member just pushed")
    }

    /// Wait until every member sees exactly `count` alive members.
    pub async fn converge(&self, count: usize) {
        wait_until("membership convergence", || {
            self.members
                .iter()
                .all(|m| m.cluster.member_list().members().len() == count)
        })
        .await;
    }

    pub fn member(&self, index: usize) -> &Member {
        &self.members[index]
    }
}

/// Poll `condition` until it holds, panicking after four seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..800 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
