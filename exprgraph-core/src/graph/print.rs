//! Diagnostics
//!
//! Text renderings of an expression tree for debugging: an indented compact
//! tree, a dirty-state listing and a Graphviz DOT export.

use std::collections::HashSet;

use super::node::{NodeId, OperMode};
use super::store::Graph;
use crate::error::Result;

impl Graph {
    /// Indented tree under `id`, one node per line.
    ///
    /// Each line shows the link flags to the parent (`/VS`, `-` for a flag
    /// that is not set), the kind and name, the value and, for branch nodes,
    /// the operating mode and dirty state. A shared subtree is expanded at
    /// its first occurrence only. With `pattern` set, only nodes whose name
    /// contains it are printed, but the walk still covers the whole tree.
    pub fn print_compact_tree(&self, id: NodeId, pattern: Option<&str>) -> Result<String> {
        self.node(id)?;
        let mut out = String::new();
        let mut expanded = HashSet::new();
        self.write_compact(id, None, "", pattern, &mut expanded, &mut out);
        Ok(out)
    }

    fn write_compact(
        &self,
        id: NodeId,
        client: Option<NodeId>,
        indent: &str,
        pattern: Option<&str>,
        expanded: &mut HashSet<NodeId>,
        out: &mut String,
    ) {
        let Some(node) = self.get(id) else {
            return;
        };
        let name = self.names().resolve(node.name);
        let repeated = !node.servers.is_empty() && !expanded.insert(id);

        if pattern.map_or(true, |pattern| name.contains(pattern)) {
            out.push_str(&format!("{indent}{id}"));
            if let Some(client) = client {
                let value = if self.is_value_server(id, client) { 'V' } else { '-' };
                let shape = if self.is_shape_server(id, client) { 'S' } else { '-' };
                out.push_str(&format!("/{value}{shape}"));
            }
            out.push_str(&format!(
                " {}::{} = {}",
                node.kind.type_name(),
                name,
                node.kind.describe_value()
            ));
            if !node.servers.is_empty() {
                match node.oper_mode {
                    OperMode::Auto => {
                        let state = if node.value_dirty { "Dirty" } else { "Clean" };
                        out.push_str(&format!(" [Auto,{state}]"));
                    }
                    OperMode::AlwaysClean => out.push_str(" [ACLEAN]"),
                    OperMode::AlwaysDirty => out.push_str(" [ADIRTY]"),
                }
            }
            if repeated {
                out.push_str(" (see above)");
            }
            out.push('\n');

            for cache in &node.caches {
                if let Some(text) = cache.print_hook() {
                    for line in text.lines() {
                        out.push_str(&format!("{indent}  {line}\n"));
                    }
                }
            }
        }

        if repeated {
            return;
        }
        let child_indent = format!("{indent}  ");
        for server in node.servers.iter() {
            self.write_compact(server, Some(id), &child_indent, pattern, expanded, out);
        }
    }

    /// Operating mode and value-dirty state of every node under `id`.
    pub fn print_dirty(&self, id: NodeId) -> Result<String> {
        let mut out = String::new();
        for member in self.tree_node_server_list(id, true, true, false, false)? {
            let node = self.node(member)?;
            let state = match node.oper_mode {
                OperMode::AlwaysClean => "FORCED clean",
                OperMode::AlwaysDirty => "FORCED DIRTY",
                OperMode::Auto if node.value_dirty => "Auto DIRTY",
                OperMode::Auto => "Auto clean",
            };
            out.push_str(&format!("{} : {state}\n", self.names().resolve(node.name)));
        }
        Ok(out)
    }

    /// Graphviz DOT rendering of the tree under `id`. Fundamental nodes are
    /// blue, all others red; edges point from client to server.
    pub fn graphviz(&self, id: NodeId) -> Result<String> {
        let nodes = self.tree_node_server_list(id, true, true, false, false)?;
        let key = |member: NodeId| format!("{}_{}", self.label(member), member);

        let mut out = String::new();
        out.push_str(&format!("digraph \"{}\"{{\n", self.name(id)?));
        for &member in &nodes {
            let node = self.node(member)?;
            let color = if node.kind.is_fundamental() { "blue" } else { "red" };
            out.push_str(&format!(
                "\"{}\" [ color={color}, label=\"{}\\n{}\"];\n",
                key(member),
                node.kind.type_name(),
                self.label(member)
            ));
        }
        for &member in &nodes {
            for server in self.node(member)?.servers.iter() {
                out.push_str(&format!("\"{}\" -> \"{}\";\n", key(member), key(server)));
            }
        }
        out.push_str("}\n");
        Ok(out)
    }
}
