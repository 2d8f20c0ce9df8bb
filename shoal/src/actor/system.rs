//! The actor system: process-scoped state shared by every actor.
//!
//! An [`ActorSystem`] owns the [`ProcessRegistry`], the dead-letter stream
//! and the shutdown token that every processing loop and timer observes.
//! It is created once, cloned into whatever needs it, and torn down with
//! [`ActorSystem::shutdown`].

use std::fmt;
use std::sync::{Arc, Weak};

use tokio_util::sync::CancellationToken;

use super::event_stream::{DeadLetterEvent, EventStream};
use super::pid::NO_HOST;
use super::process::{DeadLetterProcess, Process};
use super::registry::ProcessRegistry;
use super::root::RootContext;
use super::supervision::SupervisorStrategy;
use super::Pid;

/// Configuration of an [`ActorSystem`].
#[derive(Debug, Clone)]
pub struct SystemConfig {
    address: String,
    default_supervisor_strategy: SupervisorStrategy,
}

impl SystemConfig {
    /// Start building a configuration.
    pub fn builder() -> SystemConfigBuilder {
        SystemConfigBuilder {
            address: None,
            default_supervisor_strategy: None,
        }
    }

    /// Member address used for local pids.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Policy applied to failures of top-level actors.
    pub fn default_supervisor_strategy(&self) -> &SupervisorStrategy {
        &self.default_supervisor_strategy
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`SystemConfig`].
pub struct SystemConfigBuilder {
    address: Option<String>,
    default_supervisor_strategy: Option<SupervisorStrategy>,
}

impl SystemConfigBuilder {
    /// Member address, usually `host:port`. Defaults to `nonhost`.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Policy for top-level failures. Defaults to always restart.
    pub fn default_supervisor_strategy(mut self, strategy: SupervisorStrategy) -> Self {
        self.default_supervisor_strategy = Some(strategy);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SystemConfig {
        SystemConfig {
            address: self.address.unwrap_or_else(|| NO_HOST.to_string()),
            default_supervisor_strategy: self.default_supervisor_strategy.unwrap_or_default(),
        }
    }
}

struct SystemInner {
    config: SystemConfig,
    registry: ProcessRegistry,
    dead_letters: EventStream<DeadLetterEvent>,
    shutdown: CancellationToken,
}

/// Handle to the process-scoped actor runtime.
///
/// Spawning requires a running tokio runtime; processing loops and timers
/// are tokio tasks.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl ActorSystem {
    /// A system with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SystemConfig::default())
    }

    /// A system with `config`.
    pub fn with_config(config: SystemConfig) -> Self {
        let registry = ProcessRegistry::new(config.address());
        Self {
            inner: Arc::new(SystemInner {
                config,
                registry,
                dead_letters: EventStream::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    /// Member address of local pids.
    pub fn address(&self) -> &str {
        self.inner.config.address()
    }

    /// The address registry.
    pub fn registry(&self) -> &ProcessRegistry {
        &self.inner.registry
    }

    /// Undeliverable messages.
    pub fn dead_letters(&self) -> &EventStream<DeadLetterEvent> {
        &self.inner.dead_letters
    }

    /// A root context for sending from outside any actor.
    pub fn root(&self) -> RootContext {
        RootContext::new(self.clone())
    }

    /// The process accepting messages for `pid`, or the dead-letter sink.
    pub fn process_for(&self, pid: &Pid) -> Arc<dyn Process> {
        match self.inner.registry.resolve(pid) {
            Some(process) => process,
            None => Arc::new(DeadLetterProcess::new(self.clone())),
        }
    }

    /// Token cancelled by [`ActorSystem::shutdown`].
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    /// Whether [`ActorSystem::shutdown`] was called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop every processing loop and timer and clear the registry.
    ///
    /// Actors are not taken through their stop sequence; stop them first
    /// when they need to observe [`Stopping`](super::Stopping).
    pub fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        tracing::info!(address = %self.address(), "shutting down actor system");
        self.inner.shutdown.cancel();
        self.inner.registry.clear();
    }

    /// A handle that does not keep the system alive.
    pub fn downgrade(&self) -> WeakActorSystem {
        WeakActorSystem {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystem")
            .field("address", &self.address())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

/// Non-owning [`ActorSystem`] handle.
#[derive(Clone)]
pub struct WeakActorSystem {
    inner: Weak<SystemInner>,
}

impl WeakActorSystem {
    /// The system, if it still exists.
    pub fn upgrade(&self) -> Option<ActorSystem> {
        self.inner.upgrade().map(|inner| ActorSystem { inner })
    }
}

impl fmt::Debug for WeakActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakActorSystem")
    }
}
