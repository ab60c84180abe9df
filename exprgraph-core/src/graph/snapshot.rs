//! Snapshots, Clones and Owned Deletion
//!
//! A snapshot copies a collection. A deep snapshot also copies every server
//! reachable from the members and rewires the copies onto each other, so
//! the result is a self-contained subgraph that shares nothing with the
//! original. [`Graph::clone_tree`] builds on this to copy a whole
//! expression under one head node.

use std::collections::HashSet;

use tracing::{error, warn};

use super::node::{Node, NodeId, OperMode};
use super::redirect::RedirectOutcome;
use super::store::{DependencyRemoved, Graph};
use crate::collection::Collection;
use crate::error::Result;
use crate::targets::OBJECT_HANDLING;

/// Attribute marking servers that were cloned into a deep snapshot from
/// outside the input collection.
pub const EXTERNAL_CLONE: &str = "SnapShot_ExtRefClone";

/// An owning collection of clones and the result of rewiring them.
#[derive(Debug)]
pub struct Snapshot {
    pub nodes: Collection,
    pub redirect: RedirectOutcome,
}

impl Graph {
    /// Copy a single node.
    ///
    /// The copy has the same name, attributes, kind state, proxies and
    /// server edges (with their exact reference counts and flags). Caches,
    /// transient attributes and owned components are not copied, and the
    /// copy starts in `Auto` mode with both dirty flags raised.
    pub fn clone_node(&mut self, id: NodeId) -> Result<NodeId> {
        let source = self.node(id)?;
        let mut node = Node::new(source.name, source.title.clone(), source.kind.clone_kind());
        node.attributes = source.attributes.clone();
        node.string_attributes = source.string_attributes.clone();
        node.constant = source.constant;
        node.local_no_inhibit_dirty = source.local_no_inhibit_dirty;
        node.proxies = source.proxies.clone();

        let mut upgrade = false;
        let mut links = Vec::with_capacity(source.servers.len());
        for (server, total) in source.servers.iter_counts() {
            let server_node = self.node(server)?;
            let value = server_node.value_clients.ref_count(id);
            let shape = server_node.shape_clients.ref_count(id);
            upgrade |= value > 0 && server_node.oper_mode == OperMode::AlwaysDirty;
            links.push((server, total, value, shape));
        }

        let copy = self.insert(node);
        for index in 0..self.node(copy)?.proxies.len() {
            let proxy_id = self.alloc_proxy_id();
            self.node_mut(copy)?.proxies[index].id = proxy_id;
        }
        for (server, total, value, shape) in links {
            self.link(copy, server, total, value, shape);
        }
        if upgrade {
            self.set_oper_mode(copy, OperMode::AlwaysDirty, true)?;
        }
        Ok(copy)
    }

    /// Clone every member of `set` into a new owning collection.
    ///
    /// With `deep` set, servers reachable from the members that have no
    /// same-named member are cloned too and tagged [`EXTERNAL_CLONE`]. In
    /// both modes the clones are then redirected onto each other; a shallow
    /// snapshot keeps edges to servers outside the set on the originals.
    pub fn snapshot(&mut self, set: &Collection, deep: bool) -> Result<Snapshot> {
        let name = if set.name().is_empty() {
            String::new()
        } else {
            format!("Snapshot of {}", set.name())
        };
        let mut nodes = Collection::new_owning(name);
        for member in set.iter() {
            let copy = self.clone_node(member)?;
            nodes.add_owned(copy)?;
        }

        if deep {
            // The list grows while it is walked; appended clones get their
            // own servers checked in turn.
            let mut index = 0;
            while index < nodes.len() {
                let var = nodes.members()[index];
                for server in self.node(var)?.servers.to_vec() {
                    if nodes.find(self, server).is_some() {
                        continue;
                    }
                    let copy = self.clone_node(server)?;
                    self.node_mut(copy)?.set_attribute(EXTERNAL_CLONE, true);
                    nodes.add_owned(copy)?;
                }
                index += 1;
            }
        }

        let request = self.redirect_request(&nodes, deep, false, false);
        let mut redirect = RedirectOutcome::default();
        for member in nodes.members().to_vec() {
            redirect.merge(self.redirect_with(member, &request)?);
        }
        if !redirect.succeeded() {
            error!(
                target: OBJECT_HANDLING,
                snapshot = nodes.name(),
                unmatched = ?redirect.unmatched,
                "errors occurred while rewiring the snapshot"
            );
        }

        Ok(Snapshot { nodes, redirect })
    }

    /// Deep-copy the expression under `id`.
    ///
    /// The copy of `id` is returned and owns every other copied node, so
    /// retracting it removes the whole copy.
    pub fn clone_tree(&mut self, id: NodeId, new_name: Option<&str>) -> Result<NodeId> {
        let set = Collection::with_members("", [id]);
        let Snapshot { mut nodes, .. } = self.snapshot(&set, true)?;

        let head = nodes.members()[0];
        nodes.remove(head);
        self.add_owned_components(head, nodes)?;

        if let Some(name) = new_name {
            self.rename(head, name)?;
        }
        Ok(head)
    }

    /// Make `owner` responsible for deleting `components`.
    pub fn add_owned_components(&mut self, owner: NodeId, components: Collection) -> Result<()> {
        if components.is_empty() {
            return Ok(());
        }
        let label = format!("{}_owned", self.name(owner)?);
        let node = self.node_mut(owner)?;
        let owned = node
            .owned_components
            .get_or_insert_with(|| Collection::new_owning(label));
        for member in components.into_members() {
            owned.add_owned(member)?;
        }
        Ok(())
    }

    /// Retract every member of an owning collection.
    ///
    /// Clients go before their servers: each round deletes the members no
    /// other remaining member depends on. If the remaining members form a
    /// cycle they are deleted in list order with a warning. Non-owning
    /// collections are released without deleting anything.
    pub fn destroy_collection(&mut self, collection: Collection) -> Result<Vec<DependencyRemoved>> {
        let name = collection.name().to_string();
        if !collection.is_owning() {
            return Ok(Vec::new());
        }

        let mut remaining: Vec<NodeId> = Vec::new();
        for member in collection.into_members() {
            if self.contains(member) && !remaining.contains(&member) {
                remaining.push(member);
            }
        }

        let mut events = Vec::new();
        while remaining.len() > 1 {
            let removable: Vec<NodeId> = remaining
                .iter()
                .copied()
                .filter(|&candidate| {
                    !remaining.iter().any(|&other| {
                        other != candidate && self.reaches(other, candidate, &mut HashSet::new())
                    })
                })
                .collect();
            if removable.is_empty() {
                warn!(
                    target: OBJECT_HANDLING,
                    collection = name.as_str(),
                    remaining = remaining.len(),
                    "unable to delete members in client-server order"
                );
                break;
            }
            for member in removable {
                remaining.retain(|&other| other != member);
                events.extend(self.retract_if_live(member)?);
            }
        }

        for member in remaining {
            events.extend(self.retract_if_live(member)?);
        }
        Ok(events)
    }

    /// Owned components of an earlier member may already have removed it.
    fn retract_if_live(&mut self, id: NodeId) -> Result<Vec<DependencyRemoved>> {
        if self.contains(id) {
            self.retract(id)
        } else {
            Ok(Vec::new())
        }
    }
}
