//! Dirty-State Propagation
//!
//! Propagation is push-based and eager: when a node changes, every client
//! reachable over value (or shape) links is flagged at once, so a reader only
//! ever checks its own flag.
//!
//! # How Propagation Works
//!
//! 1. A node that is not in `Auto` mode, or that is inhibited, ignores value
//!    notifications entirely and does not forward them.
//! 2. A node without propagating clients raises its own flag and stops.
//! 3. Otherwise the node raises its flag and notifies each client, passing
//!    along the node that started the walk. Arriving back at that node means
//!    the graph has a cycle; the walk is logged and cut at that point.
//! 4. Each call keeps a visited set, so a node shared by many paths (the
//!    bottom of a diamond) forwards its notification once.
//!
//! Shape propagation follows the same walk over shape links and also sends a
//! value notification to every shape client. It is not affected by the
//! operating mode or the inhibit switch. Clearing flags is up to whoever
//! recomputes the node.

use std::collections::HashSet;

use tracing::{debug, error};

use super::node::{NodeId, OperMode};
use super::store::Graph;
use crate::error::Result;
use crate::targets::LINK_STATE;

impl Graph {
    /// Flag `id` and every value-linked client as value-dirty.
    pub fn set_value_dirty(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        let mut visited = HashSet::new();
        self.propagate_value(id, None, &mut visited);
        Ok(())
    }

    /// Flag `id` and every shape-linked client as shape-dirty; shape clients
    /// are also flagged value-dirty.
    pub fn set_shape_dirty(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        let mut shape_visited = HashSet::new();
        let mut value_visited = HashSet::new();
        self.propagate_shape(id, None, &mut shape_visited, &mut value_visited);
        Ok(())
    }

    fn propagate_value(&mut self, id: NodeId, source: Option<NodeId>, visited: &mut HashSet<NodeId>) {
        let inhibit = self.session.inhibit_dirty();
        let verbose = self.session.verbose_dirty();
        let Some(node) = self.get_mut(id) else {
            return;
        };
        if node.oper_mode != OperMode::Auto || (inhibit && !node.local_no_inhibit_dirty) {
            return;
        }
        if node.value_clients.is_empty() {
            node.value_dirty = true;
            return;
        }

        let source = match source {
            None => id,
            Some(source) if source == id => {
                error!(
                    target: LINK_STATE,
                    node = %self.label(id),
                    "cyclical dependency detected in value propagation"
                );
                return;
            }
            Some(source) => source,
        };
        if !visited.insert(id) {
            return;
        }

        let already = node.value_dirty;
        node.value_dirty = true;
        let clients = node.value_clients.to_vec();
        if verbose {
            debug!(
                target: LINK_STATE,
                source = %self.label(source),
                node = %self.label(id),
                already,
                "value dirty flag raised"
            );
        }

        for client in clients {
            self.propagate_value(client, Some(source), visited);
        }
    }

    fn propagate_shape(
        &mut self,
        id: NodeId,
        source: Option<NodeId>,
        shape_visited: &mut HashSet<NodeId>,
        value_visited: &mut HashSet<NodeId>,
    ) {
        let verbose = self.session.verbose_dirty();
        let Some(node) = self.get_mut(id) else {
            return;
        };
        let already = node.shape_dirty;
        if node.shape_clients.is_empty() {
            node.shape_dirty = true;
            return;
        }

        let source = match source {
            None => id,
            Some(source) if source == id => {
                error!(
                    target: LINK_STATE,
                    node = %self.label(id),
                    "cyclical dependency detected in shape propagation"
                );
                return;
            }
            Some(source) => source,
        };
        if !shape_visited.insert(id) {
            return;
        }

        node.shape_dirty = true;
        let clients = node.shape_clients.to_vec();
        if verbose {
            debug!(
                target: LINK_STATE,
                node = %self.label(id),
                already,
                "shape dirty flag raised"
            );
        }

        for client in clients {
            self.propagate_shape(client, Some(source), shape_visited, value_visited);
            self.propagate_value(client, Some(source), value_visited);
        }
    }

    /// Change the operating mode of a node.
    ///
    /// Caches and the kind are notified of every transition. Switching to
    /// `AlwaysDirty` with `recurse` set pushes the same mode to every value
    /// client, transitively.
    pub fn set_oper_mode(&mut self, id: NodeId, mode: OperMode, recurse: bool) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.oper_mode == mode {
            return Ok(());
        }

        node.oper_mode = mode;
        node.fast = mode == OperMode::AlwaysClean || node.kind.evaluates_fast();
        for cache in node.caches.iter_mut() {
            cache.mode_change_hook(mode);
        }
        node.kind.oper_mode_hook(mode);

        if mode == OperMode::AlwaysDirty && recurse {
            for client in node.value_clients.to_vec() {
                self.set_oper_mode(client, mode, true)?;
            }
        }
        Ok(())
    }

    /// Suppress or re-enable value propagation graph-wide.
    pub fn set_dirty_inhibit(&mut self, flag: bool) {
        self.session.set_inhibit_dirty(flag);
    }

    /// Toggle per-edge debug output.
    pub fn set_verbose_dirty(&mut self, flag: bool) {
        self.session.set_verbose_dirty(flag);
    }

    /// Exempt a node from the graph-wide inhibit switch.
    pub fn set_local_no_inhibit_dirty(&mut self, id: NodeId, flag: bool) -> Result<()> {
        self.node_mut(id)?.local_no_inhibit_dirty = flag;
        Ok(())
    }
}
