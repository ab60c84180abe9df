//! Structural Optimizations
//!
//! Two walks prepare a model for repeated evaluation over a data set:
//!
//! - Constant-node detection finds branch nodes whose parameters (other
//!   than the observables) are all constant. Such a node evaluates to the
//!   same thing for every pass and can be precomputed once and cached.
//! - Cache-mode optimization switches every branch node that depends on the
//!   observables to `AlwaysDirty`. Those nodes change on every entry of the
//!   data set anyway, so tracking their dirty state is pure overhead.
//!
//! Both walks keep a processed set keyed by [`NodeId`]; callers that run
//! several roots against one model can pass the same set to the `_with`
//! variants so shared subtrees are handled once.

use std::collections::HashSet;

use tracing::{debug, info};

use super::node::{NodeId, OperMode};
use super::store::Graph;
use crate::collection::Collection;
use crate::error::Result;
use crate::targets::OPTIMIZATION;

/// Marks a node that must never be treated as constant.
pub const NEVER_CONSTANT: &str = "NeverConstant";
/// Marks a node that is cached even when not constant.
pub const CACHE_AND_TRACK: &str = "CacheAndTrack";
/// Set on every node found to depend on constants only.
pub const CONSTANT_EXPRESSION: &str = "ConstantExpression";
/// Set on constant nodes that were added to the cache list.
pub const CONSTANT_EXPRESSION_CACHED: &str = "ConstantExpressionCached";

impl Graph {
    /// Find the branch nodes under `root` that can be precomputed.
    pub fn find_constant_nodes(&mut self, root: NodeId, observables: &Collection) -> Result<Collection> {
        let mut found = Collection::new("constant nodes");
        let mut processed = HashSet::new();
        self.find_constant_nodes_with(root, observables, &mut found, &mut processed)?;
        info!(
            target: OPTIMIZATION,
            root = %self.label(root),
            nodes = %found.contents_string(self),
            "components depend exclusively on constant parameters and will be precalculated and cached"
        );
        Ok(found)
    }

    /// Walk step of [`find_constant_nodes`](Self::find_constant_nodes).
    ///
    /// The walk stops at an eligible node: its servers are covered by
    /// caching the node itself.
    pub fn find_constant_nodes_with(
        &mut self,
        id: NodeId,
        observables: &Collection,
        found: &mut Collection,
        processed: &mut HashSet<NodeId>,
    ) -> Result<()> {
        if !self.node(id)?.kind.is_derived() || !processed.insert(id) {
            return Ok(());
        }

        let parameters = self.parameters(id, Some(observables))?;
        let mut eligible = parameters
            .iter()
            .all(|parameter| self.get(parameter).is_some_and(|node| node.is_constant()));

        let node = self.node_mut(id)?;
        if node.attribute(NEVER_CONSTANT) {
            eligible = false;
        }
        if eligible {
            node.set_attribute(CONSTANT_EXPRESSION, true);
        }
        let track = node.attribute(CACHE_AND_TRACK);

        if (eligible || track) && !found.contains(id) && observables.find(self, id).is_none() {
            debug!(target: OPTIMIZATION, node = %self.label(id), "adding node to constant node list");
            if eligible {
                self.node_mut(id)?.set_attribute(CONSTANT_EXPRESSION_CACHED, true);
            }
            found.add(id)?;
        }

        if !eligible {
            for server in self.node(id)?.servers.to_vec() {
                if self.get(server).is_some_and(|node| node.kind.is_derived()) {
                    self.find_constant_nodes_with(server, observables, found, processed)?;
                }
            }
        }

        for contained in self.contained_nodes(id)? {
            self.find_constant_nodes_with(contained, observables, found, processed)?;
        }
        Ok(())
    }

    /// Switch every branch node under `root` that depends on `observables`
    /// to `AlwaysDirty`, returning the nodes that were selected.
    pub fn optimize_cache_mode(&mut self, root: NodeId, observables: &Collection) -> Result<Collection> {
        let mut optimized = Collection::new("optimized nodes");
        let mut processed = HashSet::new();
        self.optimize_cache_mode_with(root, observables, &mut optimized, &mut processed)?;
        info!(
            target: OPTIMIZATION,
            root = %self.label(root),
            nodes = %optimized.contents_string(self),
            "nodes depend on observables, changing cache operation mode from change tracking to unconditional evaluation"
        );
        Ok(optimized)
    }

    /// Walk step of [`optimize_cache_mode`](Self::optimize_cache_mode).
    pub fn optimize_cache_mode_with(
        &mut self,
        id: NodeId,
        observables: &Collection,
        optimized: &mut Collection,
        processed: &mut HashSet<NodeId>,
    ) -> Result<()> {
        if !self.node(id)?.kind.is_derived() || !processed.insert(id) {
            return Ok(());
        }

        if self.depends_on_value(id, observables)? {
            optimized.add(id)?;
            if self.node(id)?.oper_mode != OperMode::AlwaysClean {
                self.set_oper_mode(id, OperMode::AlwaysDirty, true)?;
            }
        }

        for contained in self.contained_nodes(id)? {
            self.optimize_cache_mode_with(contained, observables, optimized, processed)?;
        }
        for server in self.node(id)?.servers.to_vec() {
            self.optimize_cache_mode_with(server, observables, optimized, processed)?;
        }
        Ok(())
    }

    fn contained_nodes(&self, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(self
            .node(id)?
            .caches
            .iter()
            .flat_map(|cache| cache.contained_nodes())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::cache::Cache;

    #[test]
    fn constant_subexpression_is_found_once() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 0.0);
        let mu = graph.real_var("mu", 1.0);
        let c = graph.constant("c", 2.0);
        let h = graph.function("h", "c * c", &[c]).unwrap();
        let a = graph.function("a", "h + mu", &[h, mu]).unwrap();
        let b = graph.function("b", "h * x + mu", &[h, x, mu]).unwrap();
        let root = graph.function("root", "a + b", &[a, b]).unwrap();
        let observables = Collection::with_members("obs", [x]);

        let found = graph.find_constant_nodes(root, &observables).unwrap();

        assert_eq!(found.members(), &[h]);
        let node = graph.node(h).unwrap();
        assert!(node.attribute(CONSTANT_EXPRESSION));
        assert!(node.attribute(CONSTANT_EXPRESSION_CACHED));
        assert!(!graph.node(a).unwrap().attribute(CONSTANT_EXPRESSION));
    }

    #[test]
    fn never_constant_nodes_are_skipped() {
        let mut graph = Graph::new();
        let mu = graph.real_var("mu", 1.0);
        let c = graph.constant("c", 2.0);
        let h = graph.function("h", "c + 1", &[c]).unwrap();
        let root = graph.function("root", "h * mu", &[h, mu]).unwrap();
        graph.node_mut(h).unwrap().set_attribute(NEVER_CONSTANT, true);

        let found = graph.find_constant_nodes(root, &Collection::new("obs")).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn cache_and_track_nodes_are_listed() {
        let mut graph = Graph::new();
        let mu = graph.real_var("mu", 1.0);
        let t = graph.function("t", "mu * 2", &[mu]).unwrap();
        let root = graph.function("root", "t + mu", &[t, mu]).unwrap();
        graph.node_mut(t).unwrap().set_attribute(CACHE_AND_TRACK, true);

        let found = graph.find_constant_nodes(root, &Collection::new("obs")).unwrap();
        assert_eq!(found.members(), &[t]);
        assert!(!graph.node(t).unwrap().attribute(CONSTANT_EXPRESSION_CACHED));
    }

    #[test]
    fn processed_set_is_shared_between_roots() {
        let mut graph = Graph::new();
        let mu = graph.real_var("mu", 1.0);
        let c = graph.constant("c", 2.0);
        let h = graph.function("h", "c", &[c]).unwrap();
        let first = graph.function("first", "h + mu", &[h, mu]).unwrap();
        let second = graph.function("second", "h - mu", &[h, mu]).unwrap();
        let observables = Collection::new("obs");

        let mut found = Collection::new("found");
        let mut processed = HashSet::new();
        graph
            .find_constant_nodes_with(first, &observables, &mut found, &mut processed)
            .unwrap();
        graph
            .find_constant_nodes_with(second, &observables, &mut found, &mut processed)
            .unwrap();

        assert_eq!(found.members(), &[h]);
        assert_eq!(processed.len(), 3);
    }

    #[test]
    fn observable_dependents_become_always_dirty() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 0.0);
        let mu = graph.real_var("mu", 1.0);
        let shifted = graph.function("shifted", "x - mu", &[x, mu]).unwrap();
        let norm = graph.function("norm", "mu * 2", &[mu]).unwrap();
        let pdf = graph.function("pdf", "shifted / norm", &[shifted, norm]).unwrap();

        let optimized = graph
            .optimize_cache_mode(pdf, &Collection::with_members("obs", [x]))
            .unwrap();

        assert_eq!(optimized.members(), &[pdf, shifted]);
        assert_eq!(graph.node(shifted).unwrap().oper_mode(), OperMode::AlwaysDirty);
        assert_eq!(graph.node(pdf).unwrap().oper_mode(), OperMode::AlwaysDirty);
        assert_eq!(graph.node(norm).unwrap().oper_mode(), OperMode::Auto);
        assert_eq!(graph.node(x).unwrap().oper_mode(), OperMode::Auto);
    }

    #[test]
    fn always_clean_nodes_keep_their_mode() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 0.0);
        let f = graph.function("f", "x", &[x]).unwrap();
        graph.set_oper_mode(f, OperMode::AlwaysClean, false).unwrap();

        let optimized = graph
            .optimize_cache_mode(f, &Collection::with_members("obs", [x]))
            .unwrap();

        assert_eq!(optimized.members(), &[f]);
        assert_eq!(graph.node(f).unwrap().oper_mode(), OperMode::AlwaysClean);
    }

    #[derive(Debug)]
    struct Holds(NodeId);

    impl Cache for Holds {
        fn contained_nodes(&self) -> Vec<NodeId> {
            vec![self.0]
        }
    }

    #[test]
    fn walks_reach_nodes_held_by_caches() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 0.0);
        let mu = graph.real_var("mu", 1.0);
        let hidden = graph.function("hidden", "x * mu", &[x, mu]).unwrap();
        let root = graph.function("root", "mu", &[mu]).unwrap();
        graph.register_cache(root, Box::new(Holds(hidden))).unwrap();

        let optimized = graph
            .optimize_cache_mode(root, &Collection::with_members("obs", [x]))
            .unwrap();
        assert_eq!(optimized.members(), &[hidden]);
    }
}
