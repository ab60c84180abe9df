//! Server Redirection
//!
//! Redirection substitutes a node's servers with same-named nodes from a
//! candidate collection. It is how clones are rewired onto each other and
//! how a model is rebound to a new data source.
//!
//! # How a Redirect Works
//!
//! 1. Every current server is looked up among the candidates. An ambiguous
//!    lookup aborts the redirect before anything changes.
//! 2. Each match replaces its server, keeping the edge's reference count and
//!    the union of its value/shape flags.
//! 3. Servers without a match are left alone; under `must_replace_all` they
//!    are recorded as failures. A match that one of the node's proxies cannot
//!    accept is held back for every proxy on that server and counts as
//!    unmatched.
//! 4. The node is flagged value- and shape-dirty.
//! 5. Each owned proxy is retargeted onto the same candidates.
//! 6. Attached caches and the node kind get a hook call.
//!
//! Failures are collected in a [`RedirectOutcome`] rather than raised, so a
//! caller can keep a partial substitution if that is good enough.

use std::collections::HashSet;

use tracing::{debug, error};

use super::cache::RedirectRequest;
use super::node::NodeId;
use super::store::Graph;
use crate::collection::Collection;
use crate::error::{GraphError, Result};
use crate::targets::LINK_STATE;

/// Aggregate result of one or more redirects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectOutcome {
    /// Number of server edges that were moved.
    pub replaced: usize,
    /// Names of servers that had to be replaced but were not.
    pub unmatched: Vec<String>,
    /// Proxies that could not be retargeted while all had to be.
    pub proxies_failed: usize,
    /// A cache or kind hook reported failure.
    pub hook_failed: bool,
}

impl RedirectOutcome {
    pub fn succeeded(&self) -> bool {
        self.unmatched.is_empty() && self.proxies_failed == 0 && !self.hook_failed
    }

    pub fn merge(&mut self, other: RedirectOutcome) {
        self.replaced += other.replaced;
        self.unmatched.extend(other.unmatched);
        self.proxies_failed += other.proxies_failed;
        self.hook_failed |= other.hook_failed;
    }
}

impl Graph {
    /// Replace the servers of `id` with their counterparts in `new_set`.
    pub fn redirect_servers(
        &mut self,
        id: NodeId,
        new_set: &Collection,
        must_replace_all: bool,
        name_change: bool,
    ) -> Result<RedirectOutcome> {
        let request = self.redirect_request(new_set, must_replace_all, name_change, false);
        self.redirect_with(id, &request)
    }

    pub(crate) fn redirect_with(&mut self, id: NodeId, request: &RedirectRequest) -> Result<RedirectOutcome> {
        let node = self.node(id)?;
        let mut outcome = RedirectOutcome::default();
        if node.servers.is_empty() || request.is_empty() {
            return Ok(outcome);
        }
        if node.prohibit_server_redirect {
            error!(target: LINK_STATE, node = %self.label(id), "redirect requested on locked node");
            return Err(GraphError::RedirectProhibited {
                node: self.label(id),
            });
        }

        // Flags are looked up by name so that several references to
        // same-named servers contribute jointly.
        let old_servers: Vec<(NodeId, bool, bool)> = node
            .servers
            .iter()
            .map(|server| {
                (
                    server,
                    self.is_value_server(server, id),
                    self.is_shape_server(server, id),
                )
            })
            .collect();
        let verbose = self.session.verbose_dirty();

        // Every replacement is resolved before any edge moves, so a failed
        // lookup leaves the node untouched.
        let mut moves: Vec<(NodeId, NodeId, bool, bool)> = Vec::new();
        let mut held = HashSet::new();
        for &(old, _, _) in &old_servers {
            let Some(replacement) = self.find_new_server(request, old)? else {
                if request.must_replace_all {
                    error!(
                        target: LINK_STATE,
                        node = %self.label(id),
                        server = %self.label(old),
                        name_change = request.name_change,
                        "server not redirected"
                    );
                    outcome.unmatched.push(self.label(old));
                }
                continue;
            };
            if replacement == old || replacement == id {
                continue;
            }
            if let Some(proxy) = self.incompatible_proxy(id, old, replacement) {
                error!(
                    target: LINK_STATE,
                    node = %self.label(id),
                    server = %self.label(old),
                    proxy = proxy.as_str(),
                    "replacement does not fit the proxy reading this server"
                );
                outcome.unmatched.push(self.label(old));
                held.insert(old);
                continue;
            }

            let name = self.name_id(old);
            let same_name = |server: NodeId| self.name_id(server) == name;
            let value = old_servers.iter().any(|&(s, v, _)| v && same_name(s));
            let shape = old_servers.iter().any(|&(s, _, sh)| sh && same_name(s));
            moves.push((old, replacement, value, shape));
        }

        for (old, replacement, value, shape) in moves {
            if verbose {
                debug!(
                    target: LINK_STATE,
                    node = %self.label(id),
                    from = %old,
                    to = %replacement,
                    "server redirected"
                );
            }
            self.replace_server(id, old, replacement, value, shape)?;
            outcome.replaced += 1;
        }

        self.set_value_dirty(id)?;
        self.set_shape_dirty(id)?;

        // Proxies on a held server stay with it, whatever they would accept.
        let proxy_count = self.node(id)?.proxies.len();
        let failed_proxies = (0..proxy_count)
            .filter(|&index| !matches!(self.change_pointer_at(id, index, request, false, &held), Ok(true)))
            .count();
        if request.must_replace_all && failed_proxies > 0 {
            error!(
                target: LINK_STATE,
                node = %self.label(id),
                failed = failed_proxies,
                "some proxies could not be adjusted"
            );
            outcome.proxies_failed = failed_proxies;
        }

        let node = self.node_mut(id)?;
        for cache in node.caches.iter_mut() {
            outcome.hook_failed |= cache.redirect_hook(request);
        }
        outcome.hook_failed |= node.kind.redirect_servers_hook(request);

        Ok(outcome)
    }

    /// Name of a proxy on `owner` reading `old` that could not accept
    /// `replacement`.
    fn incompatible_proxy(&self, owner: NodeId, old: NodeId, replacement: NodeId) -> Option<String> {
        let tag = self.get(replacement)?.kind.tag();
        self.get(owner)?
            .proxies
            .iter()
            .find(|proxy| proxy.target == Some(old) && proxy.expects.is_some_and(|expected| expected != tag))
            .map(|proxy| proxy.name.clone())
    }

    /// Redirect `id` and, depth first, every node reachable through its
    /// servers. Each node is redirected at most once per top-level call.
    pub fn recursive_redirect_servers(
        &mut self,
        id: NodeId,
        new_set: &Collection,
        must_replace_all: bool,
        name_change: bool,
    ) -> Result<RedirectOutcome> {
        let request = self.redirect_request(new_set, must_replace_all, name_change, true);
        let top_level = self.session.redirect_idle();
        let result = self.recursive_redirect_with(id, &request);
        if top_level {
            self.session.finish_redirect();
        }
        result
    }

    fn recursive_redirect_with(&mut self, id: NodeId, request: &RedirectRequest) -> Result<RedirectOutcome> {
        if !self.session.enter_redirect(id) {
            return Ok(RedirectOutcome::default());
        }
        debug!(
            target: LINK_STATE,
            node = %self.label(id),
            must_replace_all = request.must_replace_all,
            name_change = request.name_change,
            "recursive redirect"
        );

        let mut outcome = self.redirect_with(id, request)?;
        for server in self.node(id)?.servers.to_vec() {
            outcome.merge(self.recursive_redirect_with(server, request)?);
        }
        Ok(outcome)
    }

    /// Point every branch node under `root` at the members of `data`.
    ///
    /// Unmatched servers are fine here: only servers that have a
    /// counterpart in `data` move.
    pub fn attach_collection(&mut self, root: NodeId, data: &Collection) -> Result<RedirectOutcome> {
        let request = self.redirect_request(data, false, false, false);
        let mut outcome = RedirectOutcome::default();
        for branch in self.branch_node_server_list(root)? {
            outcome.merge(self.redirect_with(branch, &request)?);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::cache::{Cache, ORIGNAME_PREFIX};
    use crate::graph::kind::Function;
    use crate::graph::proxy::{AnyProxy, RealProxy};

    fn clean(graph: &mut Graph, ids: &[NodeId]) {
        for &id in ids {
            let node = graph.node_mut(id).unwrap();
            node.clear_value_dirty();
            node.clear_shape_dirty();
        }
    }

    #[test]
    fn redirect_is_local_to_the_target() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = graph.function("f", "x + 1", &[x]).unwrap();
        let g = graph.function("g", "x * 2", &[x]).unwrap();
        let x2 = graph.real_var("x", 2.0);
        clean(&mut graph, &[f, g]);

        let outcome = graph
            .redirect_servers(f, &Collection::with_members("new", [x2]), false, false)
            .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.replaced, 1);
        assert_eq!(graph.servers(f).unwrap().to_vec().as_slice(), &[x2]);
        assert_eq!(graph.servers(g).unwrap().to_vec().as_slice(), &[x]);
        assert_eq!(graph.proxies(f).unwrap()[0].target(), Some(x2));
        assert!(graph.node(f).unwrap().is_value_dirty());
        assert!(!graph.node(g).unwrap().is_value_dirty());
        assert!(graph.is_value_server(x2, f));
    }

    #[test]
    fn unmatched_servers_fail_only_when_required() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let y = graph.real_var("y", 1.0);
        let f = graph.function("f", "x + y", &[x, y]).unwrap();
        let x2 = graph.real_var("x", 2.0);
        let set = Collection::with_members("new", [x2]);

        let lenient = graph.redirect_servers(f, &set, false, false).unwrap();
        assert!(lenient.succeeded());

        let strict = graph.redirect_servers(f, &set, true, false).unwrap();
        assert!(!strict.succeeded());
        assert_eq!(strict.unmatched, vec!["y".to_string()]);
        assert_eq!(strict.proxies_failed, 1);
    }

    #[test]
    fn reference_count_survives_redirect() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = graph.function("f", "x * x", &[x, x]).unwrap();
        let x2 = graph.real_var("x", 3.0);

        graph
            .redirect_servers(f, &Collection::with_members("new", [x2]), true, false)
            .unwrap();

        assert_eq!(graph.server_ref_count(f, x2), 2);
        assert!(graph.node(x).unwrap().clients().is_empty());
    }

    #[test]
    fn redirect_keeps_flags_of_the_old_edge() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = graph.create("f", "f", Box::new(Function::new("x")));
        graph.add_server(f, x, false, true).unwrap();
        let x2 = graph.real_var("x", 2.0);

        graph
            .redirect_servers(f, &Collection::with_members("new", [x2]), true, false)
            .unwrap();

        assert!(!graph.is_value_server(x2, f));
        assert!(graph.is_shape_server(x2, f));
    }

    #[test]
    fn incompatible_replacement_is_refused() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = graph.create("f", "f", Box::new(Function::new("x")));
        graph.register_proxy::<RealProxy>(f, "x", Some(x), true, false).unwrap();
        let x_category = graph.category("x", "bin1");

        let outcome = graph
            .redirect_servers(f, &Collection::with_members("new", [x_category]), false, false)
            .unwrap();

        assert_eq!(outcome.unmatched, vec!["x".to_string()]);
        assert_eq!(graph.servers(f).unwrap().to_vec().as_slice(), &[x]);
        assert_eq!(graph.proxies(f).unwrap()[0].target(), Some(x));
    }

    #[test]
    fn ambiguous_rename_leaves_node_untouched() {
        let mut graph = Graph::new();
        let a = graph.real_var("a", 1.0);
        let mu = graph.real_var("mu", 0.0);
        let f = graph.function("f", "a - mu", &[a, mu]).unwrap();
        let a_new = graph.real_var("a_new", 2.0);
        let m1 = graph.real_var("m1", 0.5);
        let m2 = graph.real_var("m2", 0.7);
        graph.node_mut(a_new).unwrap().set_attribute(&format!("{ORIGNAME_PREFIX}a"), true);
        for m in [m1, m2] {
            graph.node_mut(m).unwrap().set_attribute(&format!("{ORIGNAME_PREFIX}mu"), true);
        }
        clean(&mut graph, &[f]);

        let ambiguous = Collection::with_members("new", [a_new, m1, m2]);
        let result = graph.redirect_servers(f, &ambiguous, false, true);

        assert!(matches!(result, Err(GraphError::AmbiguousReplacement { count: 2, .. })));
        assert_eq!(graph.servers(f).unwrap().to_vec().as_slice(), &[a, mu]);
        for proxy in graph.proxies(f).unwrap() {
            let target = proxy.target().unwrap();
            assert!(graph.servers(f).unwrap().contains(target));
        }
        assert_eq!(graph.server_ref_count(f, a_new), 0);

        let outcome = graph
            .redirect_servers(f, &Collection::with_members("new", [a_new, m1]), true, true)
            .unwrap();
        assert!(outcome.succeeded());
        assert!(graph.servers(f).unwrap().contains(a_new));
        assert!(graph.servers(f).unwrap().contains(m1));
        let targets: Vec<_> = graph.proxies(f).unwrap().iter().map(|proxy| proxy.target()).collect();
        assert_eq!(targets, vec![Some(a_new), Some(m1)]);
        assert!(graph.node(f).unwrap().is_value_dirty());
    }

    #[test]
    fn held_server_keeps_every_proxy_reading_it() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = graph.create("f", "f", Box::new(Function::new("x")));
        graph.register_proxy::<RealProxy>(f, "x", Some(x), true, false).unwrap();
        graph.register_proxy::<AnyProxy>(f, "x_any", Some(x), true, false).unwrap();
        let x_category = graph.category("x", "bin1");

        let outcome = graph
            .redirect_servers(f, &Collection::with_members("new", [x_category]), true, false)
            .unwrap();

        assert_eq!(outcome.unmatched, vec!["x".to_string()]);
        assert_eq!(outcome.proxies_failed, 2);
        assert_eq!(graph.servers(f).unwrap().to_vec().as_slice(), &[x]);
        assert_eq!(graph.server_ref_count(f, x), 2);
        for proxy in graph.proxies(f).unwrap() {
            assert_eq!(proxy.target(), Some(x));
        }
    }

    #[test]
    fn locked_node_refuses_redirect() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = graph.function("f", "x", &[x]).unwrap();
        let x2 = graph.real_var("x", 2.0);
        graph.set_prohibit_server_redirect(f, true).unwrap();

        let result = graph.redirect_servers(f, &Collection::with_members("new", [x2]), false, false);
        assert!(matches!(result, Err(GraphError::RedirectProhibited { .. })));
        assert_eq!(graph.server_ref_count(f, x), 1);
    }

    #[test]
    fn recursive_redirect_reaches_shared_ancestors_once() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let a = graph.function("a", "x", &[x]).unwrap();
        let b = graph.function("b", "x", &[x]).unwrap();
        let top = graph.function("top", "a + b", &[a, b]).unwrap();
        let x2 = graph.real_var("x", 2.0);

        let outcome = graph
            .recursive_redirect_servers(top, &Collection::with_members("new", [x2]), false, false)
            .unwrap();

        assert_eq!(outcome.replaced, 2);
        assert_eq!(graph.servers(a).unwrap().to_vec().as_slice(), &[x2]);
        assert_eq!(graph.servers(b).unwrap().to_vec().as_slice(), &[x2]);
        assert!(graph.session().redirect_idle());
    }

    #[derive(Debug)]
    struct FailingCache;

    impl Cache for FailingCache {
        fn redirect_hook(&mut self, request: &RedirectRequest) -> bool {
            request.must_replace_all
        }
    }

    #[test]
    fn cache_hook_failure_is_reported() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = graph.function("f", "x", &[x]).unwrap();
        graph.register_cache(f, Box::new(FailingCache)).unwrap();
        let set = Collection::with_members("new", [graph.real_var("x", 2.0)]);

        assert!(graph.redirect_servers(f, &set, false, false).unwrap().succeeded());
        assert!(graph.redirect_servers(f, &set, true, false).unwrap().hook_failed);
    }

    #[test]
    fn attach_collection_rebinds_branches() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let mu = graph.real_var("mu", 0.0);
        let inner = graph.function("inner", "x - mu", &[x, mu]).unwrap();
        let outer = graph.function("outer", "inner * inner", &[inner, inner]).unwrap();
        let data_x = graph.real_var("x", 5.0);

        let outcome = graph
            .attach_collection(outer, &Collection::with_members("data", [data_x]))
            .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(graph.find_server(inner, "x"), Some(data_x));
        assert_eq!(graph.find_server(inner, "mu"), Some(mu));
    }
}
