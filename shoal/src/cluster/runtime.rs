//! The cluster handle: start, resolve and shut down one member.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::activator::{activator_name, activator_pid, ActivationRequest, ActivationResponse, Activator};
use super::config::ClusterConfig;
use super::location_cache::LocationCache;
use super::member::{ClusterEvent, MemberStatusValue};
use super::member_list::MemberList;
use super::provider::ClusterProviderError;
use super::ResponseStatusCode;
use crate::actor::{
    ActorSystem, EventStream, Message, Pid, RequestError, RootContext, SpawnError,
    SupervisorStrategy,
};

/// Errors from starting, updating or stopping a [`Cluster`].
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The actor system and the cluster disagree on the member address.
    #[error("actor system address {system} does not match cluster address {cluster}")]
    AddressMismatch {
        /// Address of the actor system.
        system: String,
        /// Address from the cluster config.
        cluster: String,
    },

    /// A cluster actor could not be spawned.
    #[error("failed to spawn cluster actor: {0}")]
    Spawn(#[from] SpawnError),

    /// The membership provider failed.
    #[error("cluster provider failed: {0}")]
    Provider(#[from] ClusterProviderError),
}

enum ResolveBound {
    Timeout(Duration),
    Cancellation(CancellationToken),
}

#[derive(Debug)]
struct ClusterInner {
    system: ActorSystem,
    root: RootContext,
    config: ClusterConfig,
    events: EventStream<ClusterEvent>,
    member_list: Arc<MemberList>,
    cache: LocationCache,
    activators: Vec<Pid>,
    stopped: AtomicBool,
}

/// A started cluster member. Clones share the same member.
#[derive(Debug, Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

impl Cluster {
    /// Join the cluster described by `config`.
    ///
    /// Spawns one activator per configured kind and the location cache
    /// watcher, registers with the provider and starts following topology
    /// changes. The actor system must use `config.address()` as its address
    /// and be reachable by the other members.
    pub async fn start(system: &ActorSystem, config: ClusterConfig) -> Result<Self, ClusterError> {
        if system.address() != config.address() {
            return Err(ClusterError::AddressMismatch {
                system: system.address().to_string(),
                cluster: config.address(),
            });
        }

        let root = system.root();
        let events = EventStream::new();
        let member_list =
            MemberList::with_strategy(events.clone(), config.member_strategy().clone());
        member_list.subscribe();
        let cache = LocationCache::start(system)?;
        cache.subscribe(&events);

        let mut activators = Vec::with_capacity(config.kinds().len());
        for (kind, props) in config.kinds() {
            let props = Activator::props(kind, props.clone())
                .with_guardian_strategy(SupervisorStrategy::AlwaysRestart);
            match root.spawn_named(props, &activator_name(kind)) {
                Ok(pid) => activators.push(pid),
                Err(err) => {
                    release(&root, &member_list, &cache, &activators);
                    return Err(err.into());
                }
            }
        }

        let provider = config.provider();
        if let Err(err) = provider
            .register_member(
                config.name(),
                config.host(),
                config.port(),
                &config.kind_names(),
                config.status_value().cloned(),
            )
            .await
        {
            release(&root, &member_list, &cache, &activators);
            return Err(err.into());
        }
        provider.monitor_member_status_changes(events.clone());

        tracing::info!(
            cluster = %config.name(),
            member = %config.address(),
            kinds = ?config.kind_names(),
            "cluster member started"
        );

        Ok(Self {
            inner: Arc::new(ClusterInner {
                system: system.clone(),
                root,
                config,
                events,
                member_list,
                cache,
                activators,
                stopped: AtomicBool::new(false),
            }),
        })
    }

    /// Resolve `name` of `kind`, bounded by the configured request timeout.
    pub async fn get(&self, name: &str, kind: &str) -> (Option<Pid>, ResponseStatusCode) {
        let timeout = self.inner.config.request_timeout();
        self.resolve(name, kind, ResolveBound::Timeout(timeout)).await
    }

    /// Resolve `name` of `kind` within `timeout`.
    pub async fn get_with_timeout(
        &self,
        name: &str,
        kind: &str,
        timeout: Duration,
    ) -> (Option<Pid>, ResponseStatusCode) {
        self.resolve(name, kind, ResolveBound::Timeout(timeout)).await
    }

    /// Resolve `name` of `kind` until `token` is cancelled.
    ///
    /// Cancellation reports [`ResponseStatusCode::Timeout`].
    pub async fn get_with_cancellation(
        &self,
        name: &str,
        kind: &str,
        token: CancellationToken,
    ) -> (Option<Pid>, ResponseStatusCode) {
        self.resolve(name, kind, ResolveBound::Cancellation(token))
            .await
    }

    async fn resolve(
        &self,
        name: &str,
        kind: &str,
        bound: ResolveBound,
    ) -> (Option<Pid>, ResponseStatusCode) {
        let inner = &self.inner;
        if let Some(pid) = inner.cache.try_get(name) {
            return (Some(pid), ResponseStatusCode::Ok);
        }

        let Some(owner) = inner.member_list.get_partition(name, kind) else {
            tracing::debug!(name, kind, "no member available for kind");
            return (None, ResponseStatusCode::Unavailable);
        };

        let activator = activator_pid(&owner, kind);
        let request = Message::new(ActivationRequest {
            name: name.to_string(),
            kind: kind.to_string(),
        });
        let reply = match bound {
            ResolveBound::Timeout(timeout) => inner.root.request_async(&activator, request, timeout),
            ResolveBound::Cancellation(token) => {
                inner.root.request_async_cancellable(&activator, request, token)
            }
        };

        match reply.downcast::<ActivationResponse>().await {
            Ok(ActivationResponse {
                pid: Some(pid),
                status_code: ResponseStatusCode::Ok,
            }) => {
                if inner.cache.try_add(name, pid.clone()) {
                    return (Some(pid), ResponseStatusCode::Ok);
                }
                let cached = inner.cache.try_get(name).unwrap_or(pid);
                (Some(cached), ResponseStatusCode::Ok)
            }
            Ok(ActivationResponse {
                status_code: ResponseStatusCode::Ok,
                ..
            }) => (None, ResponseStatusCode::Error),
            Ok(ActivationResponse { pid, status_code }) => {
                tracing::debug!(name, kind, owner = %owner, status = %status_code, "activation not ok");
                (pid, status_code)
            }
            Err(RequestError::Timeout | RequestError::Cancelled) => {
                tracing::debug!(name, kind, owner = %owner, "activation request timed out");
                (None, ResponseStatusCode::Timeout)
            }
            Err(err) => {
                tracing::warn!(name, kind, owner = %owner, error = %err, "activation request failed");
                (None, ResponseStatusCode::Error)
            }
        }
    }

    /// Forget the cached location of `name`.
    pub fn remove_cache(&self, name: &str) -> Option<Pid> {
        self.inner.cache.remove_by_name(name)
    }

    /// Publish a new status value for this member.
    pub async fn update_member_status_value(
        &self,
        value: Option<MemberStatusValue>,
    ) -> Result<(), ClusterError> {
        self.inner
            .config
            .provider()
            .update_member_status_value(value)
            .await?;
        Ok(())
    }

    /// Leave the cluster.
    ///
    /// A graceful shutdown deregisters the member first so that the others
    /// notice at their next refresh; otherwise they notice once its TTL
    /// expires. Calling this more than once is a no-op.
    pub async fn shutdown(&self, graceful: bool) -> Result<(), ClusterError> {
        let inner = &self.inner;
        if inner.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let provider = inner.config.provider();
        let deregistered = if graceful {
            provider.deregister_member().await
        } else {
            Ok(())
        };
        let stopped = provider.shutdown().await;
        release(&inner.root, &inner.member_list, &inner.cache, &inner.activators);
        tracing::info!(member = %inner.config.address(), graceful, "cluster member stopped");
        deregistered?;
        stopped?;
        Ok(())
    }

    /// The actor system this member runs on.
    pub fn system(&self) -> &ActorSystem {
        &self.inner.system
    }

    /// The configuration this member was started with.
    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    /// Topology events of this member.
    pub fn events(&self) -> &EventStream<ClusterEvent> {
        &self.inner.events
    }

    /// Current membership.
    pub fn member_list(&self) -> &MemberList {
        &self.inner.member_list
    }

    /// Resolved locations.
    pub fn location_cache(&self) -> &LocationCache {
        &self.inner.cache
    }
}

fn release(root: &RootContext, member_list: &MemberList, cache: &LocationCache, activators: &[Pid]) {
    member_list.unsubscribe();
    cache.shutdown();
    for pid in activators {
        root.stop(pid);
    }
}
