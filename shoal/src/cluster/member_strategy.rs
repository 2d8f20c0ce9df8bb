//! Pluggable placement per kind.
//!
//! Every topology snapshot builds one [`MemberStrategy`] per kind from the
//! alive members supporting it. The default is [`Rendezvous`].

use std::fmt;
use std::sync::Arc;

use super::member::MemberStatus;
use super::rendezvous::Rendezvous;

/// Decides which member owns a name of one kind.
pub trait MemberStrategy: Send + Sync + fmt::Debug {
    /// Address of the member owning `key`, or `None` when no member can.
    fn get_partition(&self, key: &str) -> Option<String>;
}

impl MemberStrategy for Rendezvous {
    fn get_partition(&self, key: &str) -> Option<String> {
        self.owner(key).map(str::to_string)
    }
}

type BuildFn = dyn Fn(&str, &[&MemberStatus]) -> Box<dyn MemberStrategy> + Send + Sync;

/// Builds the strategy for a kind from its members, ordered by address.
#[derive(Clone)]
pub struct MemberStrategyBuilder(Arc<BuildFn>);

impl MemberStrategyBuilder {
    /// Wrap a builder function taking the kind and its members.
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&str, &[&MemberStatus]) -> Box<dyn MemberStrategy> + Send + Sync + 'static,
    {
        Self(Arc::new(build))
    }

    /// Rendezvous hashing for every kind.
    pub fn rendezvous() -> Self {
        Self::new(|_, members| Box::new(Rendezvous::new(members.iter().copied())))
    }

    /// The strategy for `kind` over `members`.
    pub fn build(&self, kind: &str, members: &[&MemberStatus]) -> Box<dyn MemberStrategy> {
        (self.0)(kind, members)
    }
}

impl Default for MemberStrategyBuilder {
    fn default() -> Self {
        Self::rendezvous()
    }
}

impl fmt::Debug for MemberStrategyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberStrategyBuilder").finish_non_exhaustive()
    }
}
