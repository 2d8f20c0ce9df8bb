//! Logical actor addresses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address used by actors that are not bound to any cluster member.
pub const NO_HOST: &str = "nonhost";

/// Location-transparent address of an actor: the member address it lives on
/// plus its process-local identity.
///
/// Two pids are equal iff both fields are equal. A pid is never reused for a
/// different incarnation: restarts keep the pid, a new spawn gets a new one.
///
/// # Examples
///
/// ```
/// use shoal::actor::Pid;
///
/// let pid = Pid::new("127.0.0.1:8090", "$1");
/// assert_eq!(pid.to_string(), "127.0.0.1:8090/$1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pid {
    address: String,
    id: String,
}

impl Pid {
    /// Create a pid from a member address and a local identity.
    pub fn new(address: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            id: id.into(),
        }
    }

    /// The member address hosting the actor.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The identity of the actor within its member.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.id)
    }
}
