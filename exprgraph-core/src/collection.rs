//! Node Collections
//!
//! A [`Collection`] is an ordered list of node handles. It is the currency
//! of the graph API: query results, redirect candidate sets and snapshots
//! are all collections.
//!
//! # Ownership
//!
//! Collections are non-owning by default. Adding a member with
//! [`Collection::add_owned`] turns a collection into an owning one, which is
//! one-way: an owning collection rejects borrowed members, and its members
//! are deleted (in dependency-safe order) by
//! [`Graph::destroy_collection`](crate::graph::Graph::destroy_collection).
//! Dropping a non-empty owning collection without destroying it leaks its
//! members in the graph and logs a warning.
//!
//! # Matching
//!
//! Lookups such as [`Collection::find`] match by interned name, not by
//! handle: two distinct nodes called `x` stand for the same variable.

use std::collections::HashSet;

use regex::Regex;
use tracing::warn;

use crate::error::{GraphError, Result};
use crate::graph::{Graph, NameId, NodeId};
use crate::targets::OBJECT_HANDLING;

/// Ordered, optionally owning list of nodes.
#[derive(Debug, Default)]
pub struct Collection {
    name: String,
    members: Vec<NodeId>,
    owning: bool,
}

impl Collection {
    /// Create an empty non-owning collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            owning: false,
        }
    }

    /// Create an empty collection that owns whatever is added to it.
    pub fn new_owning(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            owning: true,
        }
    }

    /// Create a non-owning collection from handles, skipping repeats.
    pub fn with_members(name: impl Into<String>, members: impl IntoIterator<Item = NodeId>) -> Self {
        let mut collection = Self::new(name);
        for id in members {
            if !collection.contains(id) {
                collection.members.push(id);
            }
        }
        collection
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_owning(&self) -> bool {
        self.owning
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.members.iter().copied()
    }

    /// Add a borrowed member. Returns `false` if it is already present.
    pub fn add(&mut self, id: NodeId) -> Result<bool> {
        if self.owning {
            return Err(GraphError::Ownership {
                collection: self.name.clone(),
                reason: "owning collections only accept owned members",
            });
        }
        if self.contains(id) {
            return Ok(false);
        }
        self.members.push(id);
        Ok(true)
    }

    /// Add a member whose deletion this collection takes over.
    pub fn add_owned(&mut self, id: NodeId) -> Result<bool> {
        if !self.owning && !self.members.is_empty() {
            return Err(GraphError::Ownership {
                collection: self.name.clone(),
                reason: "cannot take ownership while holding borrowed members",
            });
        }
        self.owning = true;
        if self.contains(id) {
            return Ok(false);
        }
        self.members.push(id);
        Ok(true)
    }

    /// Add a borrowed member unless one with the same name is present.
    pub fn add_unique(&mut self, graph: &Graph, id: NodeId) -> Result<bool> {
        if self.find(graph, id).is_some() {
            return Ok(false);
        }
        self.add(id)
    }

    /// Remove a member. The caller becomes responsible for an owned member.
    pub fn remove(&mut self, id: NodeId) -> bool {
        match self.members.iter().position(|&member| member == id) {
            Some(position) => {
                self.members.remove(position);
                true
            }
            None => false,
        }
    }

    /// Put `new` in place of `old`, keeping its position.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<bool> {
        if self.owning {
            return Err(GraphError::Ownership {
                collection: self.name.clone(),
                reason: "cannot replace members of an owning collection",
            });
        }
        match self.members.iter().position(|&member| member == old) {
            Some(position) => {
                self.members[position] = new;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether this exact node is a member.
    pub fn contains(&self, id: NodeId) -> bool {
        self.members.contains(&id)
    }

    /// Member with the same name as `id`.
    pub fn find(&self, graph: &Graph, id: NodeId) -> Option<NodeId> {
        let name = graph.get(id)?.name_id();
        self.find_by_name_id(graph, name)
    }

    pub fn find_by_name(&self, graph: &Graph, name: &str) -> Option<NodeId> {
        let name = graph.names().known(name)?;
        self.find_by_name_id(graph, name)
    }

    pub fn find_by_name_id(&self, graph: &Graph, name: NameId) -> Option<NodeId> {
        self.iter()
            .find(|&member| graph.get(member).is_some_and(|node| node.name_id() == name))
    }

    /// Members whose boolean attribute `attribute` equals `value`.
    pub fn select_by_attribute(&self, graph: &Graph, attribute: &str, value: bool) -> Collection {
        let selected = self.iter().filter(|&member| {
            graph
                .get(member)
                .is_some_and(|node| node.attribute(attribute) == value)
        });
        Collection::with_members(format!("{}_selection", self.name), selected)
    }

    /// Members that have a same-named counterpart in `other`.
    pub fn select_common(&self, graph: &Graph, other: &Collection) -> Collection {
        let selected = self
            .iter()
            .filter(|&member| other.find(graph, member).is_some());
        Collection::with_members(format!("{}_common", self.name), selected)
    }

    /// Members whose name matches any of the comma-separated wildcard
    /// patterns (`*` and `?`).
    pub fn select_by_name(&self, graph: &Graph, patterns: &str) -> Result<Collection> {
        let regex = wildcard_regex(patterns)?;
        let selected = self.iter().filter(|&member| {
            graph
                .name(member)
                .is_ok_and(|name| regex.is_match(name))
        });
        Ok(Collection::with_members(
            format!("{}_selection", self.name),
            selected,
        ))
    }

    /// Set a boolean attribute on every member.
    pub fn set_attribute_all(&self, graph: &mut Graph, attribute: &str, value: bool) -> Result<()> {
        for member in self.iter() {
            graph.node_mut(member)?.set_attribute(attribute, value);
        }
        Ok(())
    }

    /// Same size and every member has a same-named counterpart in `other`.
    pub fn equals(&self, graph: &Graph, other: &Collection) -> bool {
        self.len() == other.len()
            && self.iter().all(|member| other.find(graph, member).is_some())
    }

    /// Whether any member has a same-named counterpart in `other`.
    pub fn overlaps(&self, graph: &Graph, other: &Collection) -> bool {
        self.iter().any(|member| other.find(graph, member).is_some())
    }

    /// Comma-separated member names.
    pub fn contents_string(&self, graph: &Graph) -> String {
        self.iter()
            .map(|member| graph.name(member).unwrap_or("<retracted>"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Sort members by name.
    pub fn sort_by_name(&mut self, graph: &Graph) {
        self.members
            .sort_by_cached_key(|&member| graph.name(member).unwrap_or_default().to_string());
    }

    /// Hand the members over to the caller, who takes on any ownership.
    pub fn into_members(mut self) -> Vec<NodeId> {
        self.owning = false;
        std::mem::take(&mut self.members)
    }

    /// Distinct member names.
    pub fn name_set(&self, graph: &Graph) -> HashSet<NameId> {
        self.iter()
            .filter_map(|member| graph.get(member).map(|node| node.name_id()))
            .collect()
    }
}

impl Clone for Collection {
    /// Clones never own: ownership stays with the original.
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            members: self.members.clone(),
            owning: false,
        }
    }
}

impl Drop for Collection {
    fn drop(&mut self) {
        if self.owning && !self.members.is_empty() {
            warn!(
                target: OBJECT_HANDLING,
                collection = self.name.as_str(),
                members = self.members.len(),
                "owning collection dropped without destroying its members"
            );
        }
    }
}

fn wildcard_regex(patterns: &str) -> Result<Regex> {
    let alternatives: Vec<String> = patterns
        .split(',')
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .map(|pattern| {
            pattern
                .split('*')
                .map(|part| {
                    part.split('?')
                        .map(regex::escape)
                        .collect::<Vec<_>>()
                        .join(".")
                })
                .collect::<Vec<_>>()
                .join(".*")
        })
        .collect();
    if alternatives.is_empty() {
        return Ok(Regex::new("^$")?);
    }
    Ok(Regex::new(&format!("^(?:{})$", alternatives.join("|")))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(names: &[&str]) -> (Graph, Vec<NodeId>) {
        let mut graph = Graph::new();
        let ids = names.iter().map(|name| graph.real_var(name, 0.0)).collect();
        (graph, ids)
    }

    #[test]
    fn owning_is_one_way() {
        let (_graph, ids) = graph_with(&["a", "b"]);
        let mut owning = Collection::new_owning("owned");
        owning.add_owned(ids[0]).unwrap();

        assert!(matches!(owning.add(ids[1]), Err(GraphError::Ownership { .. })));
        assert!(owning.is_owning());
        owning.into_members();

        let mut borrowed = Collection::new("borrowed");
        borrowed.add(ids[0]).unwrap();
        assert!(matches!(borrowed.add_owned(ids[1]), Err(GraphError::Ownership { .. })));
    }

    #[test]
    fn clones_do_not_own() {
        let (_graph, ids) = graph_with(&["a"]);
        let mut owning = Collection::new_owning("owned");
        owning.add_owned(ids[0]).unwrap();

        let copy = owning.clone();
        assert!(!copy.is_owning());
        assert_eq!(copy.members(), owning.members());
        owning.into_members();
    }

    #[test]
    fn find_matches_by_name() {
        let (mut graph, ids) = graph_with(&["x", "y"]);
        let other_x = graph.real_var("x", 5.0);
        let set = Collection::with_members("set", ids.clone());

        assert_eq!(set.find(&graph, other_x), Some(ids[0]));
        assert!(!set.contains(other_x));
        assert_eq!(set.find_by_name(&graph, "y"), Some(ids[1]));
        assert_eq!(set.find_by_name(&graph, "z"), None);
    }

    #[test]
    fn add_unique_rejects_same_name() {
        let (mut graph, ids) = graph_with(&["x"]);
        let other_x = graph.real_var("x", 5.0);
        let mut set = Collection::with_members("set", ids);

        assert!(!set.add_unique(&graph, other_x).unwrap());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_and_replace() {
        let (_graph, ids) = graph_with(&["a", "b", "c"]);
        let mut set = Collection::with_members("set", ids[..2].to_vec());

        assert!(set.replace(ids[0], ids[2]).unwrap());
        assert_eq!(set.members(), &[ids[2], ids[1]]);
        assert!(set.remove(ids[1]));
        assert!(!set.remove(ids[1]));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn selection_by_name_patterns() {
        let (graph, ids) = graph_with(&["mean_sig", "mean_bkg", "sigma", "x"]);
        let set = Collection::with_members("params", ids);

        let means = set.select_by_name(&graph, "mean_*").unwrap();
        assert_eq!(means.contents_string(&graph), "mean_sig,mean_bkg");

        let mixed = set.select_by_name(&graph, "sigm?, x").unwrap();
        assert_eq!(mixed.contents_string(&graph), "sigma,x");

        let none = set.select_by_name(&graph, "").unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn selection_by_attribute() {
        let (mut graph, ids) = graph_with(&["a", "b", "c"]);
        graph.node_mut(ids[1]).unwrap().set_attribute("Constant", true);
        let set = Collection::with_members("set", ids.clone());

        let constant = set.select_by_attribute(&graph, "Constant", true);
        assert_eq!(constant.members(), &[ids[1]]);
        let floating = set.select_by_attribute(&graph, "Constant", false);
        assert_eq!(floating.len(), 2);

        set.set_attribute_all(&mut graph, "Constant", true).unwrap();
        assert!(ids.iter().all(|&id| graph.node(id).unwrap().is_constant()));
    }

    #[test]
    fn equality_and_overlap_use_names() {
        let (mut graph, ids) = graph_with(&["a", "b"]);
        let a2 = graph.real_var("a", 1.0);
        let b2 = graph.real_var("b", 1.0);
        let c = graph.real_var("c", 1.0);

        let first = Collection::with_members("first", ids);
        let second = Collection::with_members("second", [b2, a2]);
        let third = Collection::with_members("third", [c, a2]);

        assert!(first.equals(&graph, &second));
        assert!(!first.equals(&graph, &third));
        assert!(first.overlaps(&graph, &third));
        assert_eq!(first.select_common(&graph, &third).len(), 1);
    }

    #[test]
    fn sorting_by_name() {
        let (graph, ids) = graph_with(&["c", "a", "b"]);
        let mut set = Collection::with_members("set", ids);
        set.sort_by_name(&graph);
        assert_eq!(set.contents_string(&graph), "a,b,c");
    }

    #[test]
    fn wildcard_translation_escapes_metacharacters() {
        let regex = wildcard_regex("a.b*").unwrap();
        assert!(regex.is_match("a.bcd"));
        assert!(!regex.is_match("axbcd"));
    }
}
