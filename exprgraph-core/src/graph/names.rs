//! Name interning.
//!
//! Every node name is interned into a per-graph registry. Two nodes with the
//! same [`NameId`] are considered the same *logical* variable: redirects,
//! collection lookups and snapshot deduplication all match on it.

use indexmap::IndexSet;

/// Compact handle for an interned name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(u32);

impl NameId {
    /// Get the raw index into the registry.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Registry mapping strings to [`NameId`]s.
#[derive(Debug, Default)]
pub struct NameRegistry {
    names: IndexSet<Box<str>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `name`, registering it on first use.
    pub fn intern(&mut self, name: &str) -> NameId {
        if let Some(index) = self.names.get_index_of(name) {
            return NameId(index as u32);
        }
        let (index, _) = self.names.insert_full(name.into());
        NameId(index as u32)
    }

    /// Return the id for `name` without registering it.
    pub fn known(&self, name: &str) -> Option<NameId> {
        self.names.get_index_of(name).map(|index| NameId(index as u32))
    }

    /// Return the string behind an id.
    pub fn resolve(&self, id: NameId) -> &str {
        self.names.get_index(id.0 as usize).map(|s| &**s).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut registry = NameRegistry::new();
        let x = registry.intern("x");
        let y = registry.intern("y");

        assert_ne!(x, y);
        assert_eq!(registry.intern("x"), x);
        assert_eq!(registry.resolve(y), "y");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn known_does_not_register() {
        let mut registry = NameRegistry::new();
        assert!(registry.known("mu").is_none());

        let mu = registry.intern("mu");
        assert_eq!(registry.known("mu"), Some(mu));
        assert_eq!(registry.len(), 1);
    }
}
