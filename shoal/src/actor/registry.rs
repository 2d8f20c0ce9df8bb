//! Process-local address registry.
//!
//! Maps local identities to the [`Process`] that accepts their messages.
//! The map is split into [`PARTITION_COUNT`] buckets selected by an FNV-1a
//! hash of the identity, each behind its own lock, so unrelated actors do
//! not contend on spawn or lookup.
//!
//! Pids that belong to another member are resolved through host resolvers
//! (see [`crate::remote`]).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::pid::NO_HOST;
use super::process::Process;
use super::Pid;

/// Number of independently locked buckets.
pub const PARTITION_COUNT: usize = 1024;

/// Resolves pids living on other members to a local stand-in.
pub type HostResolver = Arc<dyn Fn(&Pid) -> Option<Arc<dyn Process>> + Send + Sync>;

type Partition = Mutex<HashMap<String, Arc<dyn Process>>>;

/// Partitioned identity to process map.
pub struct ProcessRegistry {
    address: String,
    partitions: Box<[Partition]>,
    sequence: AtomicU64,
    host_resolvers: RwLock<Vec<HostResolver>>,
}

impl ProcessRegistry {
    /// An empty registry for the member at `address`.
    pub fn new(address: impl Into<String>) -> Self {
        let partitions = (0..PARTITION_COUNT)
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            address: address.into(),
            partitions,
            sequence: AtomicU64::new(0),
            host_resolvers: RwLock::new(Vec::new()),
        }
    }

    /// The member address of this registry.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// A fresh identity of the form `$N`.
    pub fn next_id(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("${n}")
    }

    /// Register `process` under `id`. Returns `false` if `id` is taken.
    pub fn try_register(&self, id: &str, process: Arc<dyn Process>) -> bool {
        let mut partition = self.partition(id).lock();
        if partition.contains_key(id) {
            return false;
        }
        partition.insert(id.to_string(), process);
        true
    }

    /// The local process registered under `id`.
    pub fn lookup(&self, id: &str) -> Option<Arc<dyn Process>> {
        self.partition(id).lock().get(id).cloned()
    }

    /// Remove `id`. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &str) {
        self.partition(id).lock().remove(id);
    }

    /// Whether `pid` lives in this process.
    pub fn is_local(&self, pid: &Pid) -> bool {
        pid.address() == self.address || pid.address() == NO_HOST
    }

    /// Resolve `pid` to a local process or a remote stand-in.
    pub fn resolve(&self, pid: &Pid) -> Option<Arc<dyn Process>> {
        if self.is_local(pid) {
            return self.lookup(pid.id());
        }
        self.host_resolvers
            .read()
            .iter()
            .find_map(|resolver| resolver(pid))
    }

    /// Add a resolver consulted for non-local pids.
    pub fn register_host_resolver(&self, resolver: HostResolver) {
        self.host_resolvers.write().push(resolver);
    }

    /// Number of registered processes.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.lock().len()).sum()
    }

    /// Whether no process is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn clear(&self) {
        for partition in self.partitions.iter() {
            partition.lock().clear();
        }
    }

    fn partition(&self, id: &str) -> &Partition {
        let index = (fnv1a(id.as_bytes()) as usize) & (PARTITION_COUNT - 1);
        &self.partitions[index]
    }
}

impl fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("address", &self.address)
            .field("processes", &self.len())
            .finish()
    }
}

/// FNV-1a 64-bit hash.
fn fnv1a(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
