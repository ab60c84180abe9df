//! Tree Traversal
//!
//! Every structural query is a depth-first walk over server edges. Each walk
//! keeps a visited set keyed by [`NodeId`], so a node shared by many paths
//! is expanded once and the cost stays linear in the size of the reachable
//! subgraph.
//!
//! Dependency tests match by name, like collection lookups: a node depends
//! on `x` if any node called `x` is reachable from it.

use std::collections::HashSet;

use super::names::NameId;
use super::node::NodeId;
use super::store::Graph;
use crate::collection::Collection;
use crate::error::Result;

impl Graph {
    /// List the nodes of the tree under `start`, `start` included.
    ///
    /// - `branches` / `leaves` select derived and non-derived nodes.
    /// - `value_only` follows value links only.
    /// - `recurse_fundamental` also expands nodes that are both fundamental
    ///   and derived; such nodes then count as branches.
    pub fn tree_node_server_list(
        &self,
        start: NodeId,
        branches: bool,
        leaves: bool,
        value_only: bool,
        recurse_fundamental: bool,
    ) -> Result<Vec<NodeId>> {
        self.node(start)?;
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        self.collect_tree(
            start,
            TreeFilter {
                branches,
                leaves,
                value_only,
                recurse_fundamental,
            },
            &mut visited,
            &mut out,
        );
        Ok(out)
    }

    fn collect_tree(&self, id: NodeId, filter: TreeFilter, visited: &mut HashSet<NodeId>, out: &mut Vec<NodeId>) {
        if !visited.insert(id) {
            return;
        }
        let Some(node) = self.get(id) else {
            return;
        };
        let derived = node.kind.is_derived();
        let fundamental = node.kind.is_fundamental();
        let TreeFilter {
            branches,
            leaves,
            value_only,
            recurse_fundamental,
        } = filter;

        let include = (branches && leaves)
            || (branches && derived)
            || (leaves && fundamental && !(recurse_fundamental && derived))
            || (leaves && !fundamental && !derived);
        if include {
            out.push(id);
        }

        if derived && (!fundamental || recurse_fundamental) {
            for server in node.servers.iter() {
                if !value_only || self.is_value_server(server, id) {
                    self.collect_tree(server, filter, visited, out);
                }
            }
        }
    }

    /// Leaves of the tree under `id`.
    pub fn leaf_node_server_list(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.tree_node_server_list(id, false, true, false, false)
    }

    /// Branch nodes of the tree under `id`, `id` included if derived.
    pub fn branch_node_server_list(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.tree_node_server_list(id, true, false, false, false)
    }

    /// All branch nodes of the expression headed by `id`.
    pub fn components(&self, id: NodeId) -> Result<Collection> {
        let name = format!("{}_components", self.name(id)?);
        Ok(Collection::with_members(name, self.branch_node_server_list(id)?))
    }

    /// Whether `id` is, or depends on, a node named like `test`.
    pub fn depends_on(&self, id: NodeId, test: NodeId) -> Result<bool> {
        let name = self.node(test)?.name_id();
        self.depends_on_names(id, &HashSet::from([name]), None, false)
    }

    /// Whether `id` depends on any member of `set`, ignoring the subtree
    /// under `ignore`.
    pub fn depends_on_any(
        &self,
        id: NodeId,
        set: &Collection,
        ignore: Option<NodeId>,
        value_only: bool,
    ) -> Result<bool> {
        self.depends_on_names(id, &set.name_set(self), ignore, value_only)
    }

    /// Whether `id` depends on any member of `set` through value links.
    pub fn depends_on_value(&self, id: NodeId, set: &Collection) -> Result<bool> {
        self.depends_on_any(id, set, None, true)
    }

    fn depends_on_names(
        &self,
        id: NodeId,
        names: &HashSet<NameId>,
        ignore: Option<NodeId>,
        value_only: bool,
    ) -> Result<bool> {
        self.node(id)?;
        if names.is_empty() {
            return Ok(false);
        }
        let mut visited = HashSet::new();
        Ok(self.reaches_name(id, names, ignore, value_only, &mut visited))
    }

    fn reaches_name(
        &self,
        id: NodeId,
        names: &HashSet<NameId>,
        ignore: Option<NodeId>,
        value_only: bool,
        visited: &mut HashSet<NodeId>,
    ) -> bool {
        if Some(id) == ignore || !visited.insert(id) {
            return false;
        }
        let Some(node) = self.get(id) else {
            return false;
        };
        if names.contains(&node.name) {
            return true;
        }
        node.servers.iter().any(|server| {
            (!value_only || self.is_value_server(server, id))
                && self.reaches_name(server, names, ignore, value_only, visited)
        })
    }

    /// Whether `from` reaches the exact node `to` over server edges,
    /// `from` itself excluded.
    pub(crate) fn reaches(&self, from: NodeId, to: NodeId, visited: &mut HashSet<NodeId>) -> bool {
        let Some(node) = self.get(from) else {
            return false;
        };
        node.servers.iter().any(|server| {
            server == to || (visited.insert(server) && self.reaches(server, to, visited))
        })
    }

    /// Whether `test` depends on any node of the tree under `id`.
    pub fn overlaps(&self, id: NodeId, test: NodeId, value_only: bool) -> Result<bool> {
        let tree = Collection::with_members("tree", self.tree_node_server_list(id, true, true, false, false)?);
        self.depends_on_any(test, &tree, None, value_only)
    }

    /// Whether `test` depends on any observable of `id` with respect to
    /// `data`.
    pub fn observable_overlaps(&self, id: NodeId, test: NodeId, data: &Collection) -> Result<bool> {
        let observables = self.observables(id, data, false)?;
        self.depends_on_any(test, &observables, None, false)
    }

    /// Fundamental value servers of the tree under `id` that do not depend
    /// on `observables`, sorted by name.
    pub fn parameters(&self, id: NodeId, observables: Option<&Collection>) -> Result<Collection> {
        self.node(id)?;
        let names = observables.map(|set| set.name_set(self)).unwrap_or_default();
        let mut out = Collection::new("parameters");
        let mut visited = HashSet::new();
        self.collect_parameters(id, &names, &mut visited, &mut out)?;
        out.sort_by_name(self);
        Ok(out)
    }

    fn collect_parameters(
        &self,
        id: NodeId,
        observables: &HashSet<NameId>,
        visited: &mut HashSet<NodeId>,
        out: &mut Collection,
    ) -> Result<()> {
        if !visited.insert(id) {
            return Ok(());
        }
        let node = self.node(id)?;
        for server in node.servers.iter() {
            if !self.is_value_server(server, id) {
                continue;
            }
            let server_node = self.node(server)?;
            if server_node.kind.is_fundamental() {
                let observable = !observables.is_empty()
                    && self.reaches_name(server, observables, None, false, &mut HashSet::new());
                if !observable {
                    out.add_unique(self, server)?;
                }
            } else {
                self.collect_parameters(server, observables, visited, out)?;
            }
        }
        Ok(())
    }

    /// Every parameter of `id`, with no observables excluded.
    pub fn variables(&self, id: NodeId) -> Result<Collection> {
        let mut variables = self.parameters(id, None)?;
        variables.set_name("variables");
        Ok(variables)
    }

    /// Assignable leaves of the tree under `id` that depend on `data`.
    pub fn observables(&self, id: NodeId, data: &Collection, value_only: bool) -> Result<Collection> {
        let names = data.name_set(self);
        let mut out = Collection::new("dependents");
        for leaf in self.tree_node_server_list(id, false, true, value_only, false)? {
            let node = self.node(leaf)?;
            if node.kind.is_lvalue() && self.depends_on_names(leaf, &names, None, value_only)? {
                out.add(leaf)?;
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy)]
struct TreeFilter {
    branches: bool,
    leaves: bool,
    value_only: bool,
    recurse_fundamental: bool,
}
