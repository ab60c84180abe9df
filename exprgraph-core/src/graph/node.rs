//! Graph Nodes
//!
//! This module defines the node record that lives in the graph arena.
//!
//! A node carries its identity (interned name, title), its attributes, the
//! value/shape dirty flags, its operating mode and the four adjacency lists
//! that make up its half of every client-server edge. Structural fields are
//! crate-private: edges, proxies and caches are only modified through
//! [`Graph`](super::Graph) so both endpoints of an edge stay in sync.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::cache::Cache;
use super::kind::NodeKind;
use super::names::NameId;
use super::proxy::Proxy;
use super::refcount::RefCountList;
use crate::collection::Collection;

/// Attribute that toggles the constant flag.
pub const CONSTANT: &str = "Constant";

/// Generational handle to a node in a [`Graph`](super::Graph).
///
/// A handle becomes stale once its node is retracted; the slot may be reused
/// with a higher generation, so stale handles never alias new nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the arena.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// How a node participates in dirty-state propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperMode {
    /// Track changes: the node is dirtied by its servers.
    #[default]
    Auto,

    /// Never dirtied by propagation; the value is assumed fixed.
    AlwaysClean,

    /// Recomputed on every read, so change tracking is skipped.
    AlwaysDirty,
}

impl fmt::Display for OperMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperMode::Auto => "Auto",
            OperMode::AlwaysClean => "AClean",
            OperMode::AlwaysDirty => "ADirty",
        };
        f.write_str(label)
    }
}

/// A vertex of the expression graph.
#[derive(Debug)]
pub struct Node {
    pub(crate) name: NameId,
    pub(crate) title: String,

    pub(crate) attributes: BTreeSet<String>,
    pub(crate) string_attributes: BTreeMap<String, String>,
    pub(crate) transient_attributes: BTreeSet<String>,

    pub(crate) value_dirty: bool,
    pub(crate) shape_dirty: bool,
    pub(crate) oper_mode: OperMode,
    pub(crate) fast: bool,
    pub(crate) constant: bool,
    pub(crate) prohibit_server_redirect: bool,
    pub(crate) local_no_inhibit_dirty: bool,

    /// Nodes we depend on.
    pub(crate) servers: RefCountList,
    /// Nodes that depend on us.
    pub(crate) clients: RefCountList,
    /// Subset of `clients` that receive value-dirty notifications.
    pub(crate) value_clients: RefCountList,
    /// Subset of `clients` that receive shape-dirty notifications.
    pub(crate) shape_clients: RefCountList,

    pub(crate) proxies: Vec<Proxy>,
    pub(crate) caches: Vec<Box<dyn Cache>>,
    pub(crate) owned_components: Option<Collection>,

    pub(crate) kind: Box<dyn NodeKind>,
}

impl Node {
    /// Create a detached node. Both dirty flags start raised so the first
    /// read always recomputes.
    pub(crate) fn new(name: NameId, title: String, kind: Box<dyn NodeKind>) -> Self {
        Self {
            name,
            title,
            attributes: BTreeSet::new(),
            string_attributes: BTreeMap::new(),
            transient_attributes: BTreeSet::new(),
            value_dirty: true,
            shape_dirty: true,
            oper_mode: OperMode::Auto,
            fast: kind.evaluates_fast(),
            constant: false,
            prohibit_server_redirect: false,
            local_no_inhibit_dirty: false,
            servers: RefCountList::new(),
            clients: RefCountList::new(),
            value_clients: RefCountList::new(),
            shape_clients: RefCountList::new(),
            proxies: Vec::new(),
            caches: Vec::new(),
            owned_components: None,
            kind,
        }
    }

    pub fn name_id(&self) -> NameId {
        self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_value_dirty(&self) -> bool {
        self.value_dirty
    }

    pub fn is_shape_dirty(&self) -> bool {
        self.shape_dirty
    }

    /// Clear the value-dirty flag after a recompute.
    pub fn clear_value_dirty(&mut self) {
        self.value_dirty = false;
    }

    /// Clear the shape-dirty flag after a recompute.
    pub fn clear_shape_dirty(&mut self) {
        self.shape_dirty = false;
    }

    pub fn oper_mode(&self) -> OperMode {
        self.oper_mode
    }

    /// Whether a collaborator may read the value without a recompute check.
    pub fn is_fast(&self) -> bool {
        self.fast
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    pub fn prohibits_server_redirect(&self) -> bool {
        self.prohibit_server_redirect
    }

    pub fn kind(&self) -> &dyn NodeKind {
        self.kind.as_ref()
    }

    /// Set or clear a boolean attribute.
    pub fn set_attribute(&mut self, name: &str, value: bool) {
        if name == CONSTANT {
            self.constant = value;
        }
        if value {
            self.attributes.insert(name.to_string());
        } else {
            self.attributes.remove(name);
        }
    }

    pub fn attribute(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }

    /// Boolean attributes in sorted order.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(String::as_str)
    }

    /// Set a string attribute, or remove it with `None`.
    pub fn set_string_attribute(&mut self, key: &str, value: Option<&str>) {
        match value {
            Some(value) => {
                self.string_attributes.insert(key.to_string(), value.to_string());
            }
            None => {
                self.string_attributes.remove(key);
            }
        }
    }

    pub fn string_attribute(&self, key: &str) -> Option<&str> {
        self.string_attributes.get(key).map(String::as_str)
    }

    /// Set or clear an attribute that is not carried over to clones.
    pub fn set_transient_attribute(&mut self, name: &str, value: bool) {
        if value {
            self.transient_attributes.insert(name.to_string());
        } else {
            self.transient_attributes.remove(name);
        }
    }

    pub fn transient_attribute(&self, name: &str) -> bool {
        self.transient_attributes.contains(name)
    }

    pub fn servers(&self) -> &RefCountList {
        &self.servers
    }

    pub fn clients(&self) -> &RefCountList {
        &self.clients
    }

    pub fn value_clients(&self) -> &RefCountList {
        &self.value_clients
    }

    pub fn shape_clients(&self) -> &RefCountList {
        &self.shape_clients
    }

    pub fn proxies(&self) -> &[Proxy] {
        &self.proxies
    }

    pub fn cache_count(&self) -> usize {
        self.caches.len()
    }

    /// Components this node owns and destroys on retraction.
    pub fn owned_components(&self) -> Option<&Collection> {
        self.owned_components.as_ref()
    }
}
