//! Reference-counted adjacency lists.
//!
//! A client may reach the same server through several proxies, so every edge
//! endpoint carries a multiplicity. An entry disappears only when its count
//! drops to zero.

use smallvec::SmallVec;

use super::node::NodeId;

/// Insertion-ordered list of node handles with per-entry reference counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefCountList {
    entries: SmallVec<[(NodeId, u32); 4]>,
}

impl RefCountList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` references to `id`. Adding zero references is a no-op.
    pub fn add(&mut self, id: NodeId, count: u32) {
        if count == 0 {
            return;
        }
        match self.entries.iter_mut().find(|(entry, _)| *entry == id) {
            Some((_, refs)) => *refs += count,
            None => self.entries.push((id, count)),
        }
    }

    /// Drop one reference to `id`, or every reference when `force` is set.
    ///
    /// Returns `true` if anything was removed.
    pub fn remove(&mut self, id: NodeId, force: bool) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        let refs = &mut self.entries[pos].1;
        if force || *refs <= 1 {
            self.entries.remove(pos);
        } else {
            *refs -= 1;
        }
        true
    }

    /// Remove `id` entirely, returning how many references it had.
    pub fn remove_all(&mut self, id: NodeId) -> u32 {
        match self.position(id) {
            Some(pos) => self.entries.remove(pos).1,
            None => 0,
        }
    }

    pub fn ref_count(&self, id: NodeId) -> u32 {
        self.position(id).map(|pos| self.entries[pos].1).unwrap_or(0)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.position(id).is_some()
    }

    /// Number of distinct entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate distinct entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Iterate entries together with their reference counts.
    pub fn iter_counts(&self) -> impl Iterator<Item = (NodeId, u32)> + '_ {
        self.entries.iter().copied()
    }

    /// Copy the distinct entries out, so the list can be mutated while walking.
    pub fn to_vec(&self) -> SmallVec<[NodeId; 8]> {
        self.iter().collect()
    }

    fn position(&self, id: NodeId) -> Option<usize> {
        self.entries.iter().position(|(entry, _)| *entry == id)
    }
}
