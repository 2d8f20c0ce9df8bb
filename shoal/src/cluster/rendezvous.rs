//! Rendezvous (highest-random-weight) placement.
//!
//! Every member gets a score `fnv1a32(key ‖ address)` for a key; the
//! highest score owns the key. Adding or removing a member only moves the
//! keys whose top score belongs to that member.

use super::member::MemberStatus;

/// Owner selection over a fixed member set.
///
/// Built once per topology update; member addresses are converted to bytes
/// at construction.
#[derive(Debug, Clone, Default)]
pub struct Rendezvous {
    members: Vec<(String, Vec<u8>)>,
}

impl Rendezvous {
    /// Placement over the alive members of `members`, in iteration order.
    pub fn new<'a>(members: impl IntoIterator<Item = &'a MemberStatus>) -> Self {
        Self::from_addresses(
            members
                .into_iter()
                .filter(|m| m.is_alive())
                .map(|m| m.address().to_string()),
        )
    }

    /// Placement over raw member addresses.
    pub fn from_addresses(addresses: impl IntoIterator<Item = String>) -> Self {
        Self {
            members: addresses
                .into_iter()
                .map(|address| {
                    let bytes = address.as_bytes().to_vec();
                    (address, bytes)
                })
                .collect(),
        }
    }

    /// Number of candidate members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether there is no candidate.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The member owning `key`. Ties go to the earliest member.
    pub fn owner(&self, key: &str) -> Option<&str> {
        match self.members.as_slice() {
            [] => None,
            [(only, _)] => Some(only),
            members => {
                let key = key.as_bytes();
                let mut best: Option<(u32, &str)> = None;
                for (address, bytes) in members {
                    let score = score(key, bytes);
                    if best.map_or(true, |(top, _)| score > top) {
                        best = Some((score, address));
                    }
                }
                best.map(|(_, address)| address)
            }
        }
    }
}

const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;
const FNV_PRIME: u32 = 0x01000193;

/// FNV-1a 32-bit hash of `key` followed by `member`.
fn score(key: &[u8], member: &[u8]) -> u32 {
    key.iter()
        .chain(member)
        .fold(FNV_OFFSET_BASIS, |hash, &byte| {
            (hash ^ byte as u32).wrapping_mul(FNV_PRIME)
        })
}
