//! # Shoal
//!
//! An actor runtime with supervision and cluster-wide placement of virtual
//! actors.
//!
//! ## Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 cluster (location subsystem)                │
//! │  Cluster::get → LocationCache → MemberList → Rendezvous     │
//! │  ClusterProvider pushes topology onto the EventStream       │
//! │  Activator (one per kind) gets or creates activations       │
//! ├──────────────────────────┬──────────────────────────────────┤
//! │  remote                  │  actor (execution core)          │
//! │  • Transport trait       │  • ActorContext state machine    │
//! │  • RemoteProcess proxy   │  • Mailbox with system priority  │
//! │  • LoopbackNetwork       │  • Supervision, stash, watch     │
//! ├──────────────────────────┴──────────────────────────────────┤
//! │             ProcessRegistry (partitioned, per process)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use shoal::actor::{ActorSystem, Message, Props};
//!
//! let system = ActorSystem::new();
//! let root = system.root();
//! let pid = root.spawn(Props::from_fn(|ctx| {
//!     if let Some(name) = ctx.message().and_then(|m| m.downcast_ref::<String>()) {
//!         ctx.respond(Message::new(format!("hello {name}")));
//!     }
//!     Ok(())
//! }))?;
//!
//! let reply: String = root
//!     .request_async(&pid, Message::new("world".to_string()), Duration::from_secs(1))
//!     .downcast()
//!     .await?;
//! ```

#![warn(missing_docs)]

pub mod actor;
pub mod cluster;
pub mod remote;

pub use actor::{
    Actor, ActorError, ActorSystem, Context, Message, Pid, Props, RequestError, RootContext,
    SpawnError, SupervisorStrategy,
};
pub use cluster::{Cluster, ClusterConfig, ResponseStatusCode};
