//! Node Arena
//!
//! The [`Graph`] owns every node in a slot arena addressed by generational
//! [`NodeId`] handles. Retracting a node frees its slot and bumps the slot
//! generation, so handles held elsewhere are rejected instead of silently
//! referring to whatever node reuses the slot.
//!
//! The rest of the graph API is spread over sibling modules as further
//! `impl Graph` blocks: edges, dirty propagation, proxies, caches,
//! redirection, traversal, snapshots, optimization and printing.

use std::any::Any;

use tracing::{debug, trace};

use super::kind::NodeKind;
use super::names::{NameId, NameRegistry};
use super::node::{Node, NodeId};
use super::proxy::ProxyId;
use super::session::Session;
use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::targets::{LINK_STATE, OBJECT_HANDLING};

/// Emitted for every client that lost a server through retraction.
///
/// The client keeps running with one server fewer; any of its proxies that
/// targeted the server now point at nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRemoved {
    pub client: NodeId,
    pub server: NodeId,
    pub server_name: String,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// An expression graph: the node arena plus its name registry and session.
#[derive(Debug)]
pub struct Graph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    names: NameRegistry,
    pub(crate) session: Session,
    next_proxy: u32,
}

impl Graph {
    /// Create an empty graph with default configuration.
    pub fn new() -> Self {
        Self::with_config(&GraphConfig::default())
    }

    /// Create an empty graph whose session is seeded from `config`.
    pub fn with_config(config: &GraphConfig) -> Self {
        Self {
            slots: Vec::with_capacity(config.initial_capacity),
            free: Vec::new(),
            live: 0,
            names: NameRegistry::new(),
            session: Session::from_config(config),
            next_proxy: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn names(&self) -> &NameRegistry {
        &self.names
    }

    /// Intern `name` in this graph's registry.
    pub fn intern(&mut self, name: &str) -> NameId {
        self.names.intern(name)
    }

    /// Create a node with no servers.
    pub fn create(&mut self, name: &str, title: &str, kind: Box<dyn NodeKind>) -> NodeId {
        let name = self.names.intern(name);
        self.insert(Node::new(name, title.to_string(), kind))
    }

    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        let name = node.name;
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId::new(index, 0)
            }
        };
        self.live += 1;
        trace!(target: OBJECT_HANDLING, node = %id, name = self.names.resolve(name), "created node");
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    /// Look up a node, rejecting stale handles.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.get(id).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.get_mut(id).ok_or(GraphError::NodeNotFound(id))
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.live
    }

    /// Handles of all live nodes in slot order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node
                .as_ref()
                .map(|_| NodeId::new(index as u32, slot.generation))
        })
    }

    pub fn name(&self, id: NodeId) -> Result<&str> {
        let node = self.node(id)?;
        Ok(self.names.resolve(node.name))
    }

    pub(crate) fn name_id(&self, id: NodeId) -> Option<NameId> {
        self.get(id).map(|node| node.name)
    }

    /// Name for log output; stale handles render as their id.
    pub(crate) fn label(&self, id: NodeId) -> String {
        match self.get(id) {
            Some(node) => self.names.resolve(node.name).to_string(),
            None => id.to_string(),
        }
    }

    /// Give a node a new name. Matching by name follows the new name.
    pub fn rename(&mut self, id: NodeId, name: &str) -> Result<()> {
        let name = self.names.intern(name);
        self.node_mut(id)?.name = name;
        Ok(())
    }

    pub fn set_title(&mut self, id: NodeId, title: &str) -> Result<()> {
        self.node_mut(id)?.title = title.to_string();
        Ok(())
    }

    /// Borrow the node's kind as a concrete type.
    pub fn kind_as<K: NodeKind>(&self, id: NodeId) -> Option<&K> {
        let kind: &dyn Any = self.get(id)?.kind.as_any();
        kind.downcast_ref::<K>()
    }

    pub fn kind_as_mut<K: NodeKind>(&mut self, id: NodeId) -> Option<&mut K> {
        let kind: &mut dyn Any = self.get_mut(id)?.kind.as_any_mut();
        kind.downcast_mut::<K>()
    }

    pub(crate) fn alloc_proxy_id(&mut self) -> ProxyId {
        let id = ProxyId::new(self.next_proxy);
        self.next_proxy += 1;
        id
    }

    /// Remove a node from the graph.
    ///
    /// The node is detached from every server, then every client loses its
    /// edge to the node and receives one [`DependencyRemoved`] event. Owned
    /// components are destroyed with it. The handle is stale afterwards.
    pub fn retract(&mut self, id: NodeId) -> Result<Vec<DependencyRemoved>> {
        let node = self.node(id)?;
        let servers = node.servers.to_vec();
        let clients = node.clients.to_vec();
        let server_name = self.names.resolve(node.name).to_string();

        for server in servers {
            if let Some(server) = self.get_mut(server) {
                server.clients.remove_all(id);
                server.value_clients.remove_all(id);
                server.shape_clients.remove_all(id);
            }
        }

        let mut events = Vec::with_capacity(clients.len());
        for client in clients {
            let Some(client_node) = self.get_mut(client) else {
                continue;
            };
            client_node.servers.remove_all(id);
            for proxy in client_node.proxies.iter_mut() {
                if proxy.target == Some(id) {
                    proxy.target = None;
                }
            }
            debug!(
                target: LINK_STATE,
                client = %client,
                server = server_name.as_str(),
                "server retracted"
            );
            events.push(DependencyRemoved {
                client,
                server: id,
                server_name: server_name.clone(),
            });
        }

        let slot = &mut self.slots[id.index() as usize];
        let removed = slot.node.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.live -= 1;
        trace!(target: OBJECT_HANDLING, node = %id, name = server_name.as_str(), "retracted node");

        if let Some(owned) = removed.and_then(|mut node| node.owned_components.take()) {
            events.extend(self.destroy_collection(owned)?);
        }

        Ok(events)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        // Owned components die with the arena.
        for slot in self.slots.iter_mut() {
            if let Some(owned) = slot.node.as_mut().and_then(|node| node.owned_components.take()) {
                owned.into_members();
            }
        }
    }
}
