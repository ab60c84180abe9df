//! Caches and Redirect Requests
//!
//! A [`Cache`] is an opaque object a collaborator attaches to a node, for
//! example a normalization integral or a precomputed lookup table. The graph
//! never looks inside; it only forwards redirect and mode-change events and
//! asks for any nodes the cache holds so the optimizers can reach them.

use std::fmt;

use smallvec::SmallVec;

use super::names::NameId;
use super::node::{NodeId, OperMode};
use super::store::Graph;
use crate::collection::Collection;
use crate::error::{GraphError, Result};

/// Attribute prefix naming the server a candidate replaces under a
/// name-changing redirect.
pub const ORIGNAME_PREFIX: &str = "ORIGNAME:";

/// One replacement candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub node: NodeId,
    pub name: NameId,
    /// Names this node stands in for via `ORIGNAME:` attributes.
    pub original_names: SmallVec<[NameId; 1]>,
}

/// The candidate set and flags of one redirect.
#[derive(Debug, Clone)]
pub struct RedirectRequest {
    candidates: Vec<Candidate>,
    pub must_replace_all: bool,
    pub name_change: bool,
    pub is_recursion_step: bool,
}

impl RedirectRequest {
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// First candidate in collection order.
    pub fn first(&self) -> Option<NodeId> {
        self.candidates.first().map(|candidate| candidate.node)
    }

    /// First candidate standing in for `name`.
    pub fn find(&self, name: NameId) -> Option<NodeId> {
        self.matches(name).next()
    }

    /// All candidates standing in for `name`: same name normally, an
    /// `ORIGNAME:` match when names may change.
    pub fn matches(&self, name: NameId) -> impl Iterator<Item = NodeId> + '_ {
        let name_change = self.name_change;
        self.candidates
            .iter()
            .filter(move |candidate| {
                if name_change {
                    candidate.original_names.contains(&name)
                } else {
                    candidate.name == name
                }
            })
            .map(|candidate| candidate.node)
    }
}

/// Auxiliary object attached to a node.
pub trait Cache: fmt::Debug {
    /// Called after the owner's servers were redirected. Returns `true` on
    /// failure.
    fn redirect_hook(&mut self, _request: &RedirectRequest) -> bool {
        false
    }

    /// Called after every operating-mode transition of the owner.
    fn mode_change_hook(&mut self, _mode: OperMode) {}

    /// Nodes held by the cache that the optimizers should visit.
    fn contained_nodes(&self) -> Vec<NodeId> {
        Vec::new()
    }

    /// Extra lines for the owner's entry in a compact tree print.
    fn print_hook(&self) -> Option<String> {
        None
    }
}

impl Graph {
    /// Describe `set` as redirect candidates.
    pub fn redirect_request(
        &self,
        set: &Collection,
        must_replace_all: bool,
        name_change: bool,
        is_recursion_step: bool,
    ) -> RedirectRequest {
        let candidates = set
            .iter()
            .filter_map(|id| {
                let node = self.get(id)?;
                let original_names = node
                    .attributes()
                    .filter_map(|attribute| attribute.strip_prefix(ORIGNAME_PREFIX))
                    .filter_map(|original| self.names().known(original))
                    .collect();
                Some(Candidate {
                    node: id,
                    name: node.name,
                    original_names,
                })
            })
            .collect();
        RedirectRequest {
            candidates,
            must_replace_all,
            name_change,
            is_recursion_step,
        }
    }

    /// Find the candidate replacing `old`.
    ///
    /// Under a name change more than one `ORIGNAME:` match is an error, since
    /// no choice between them would be safe.
    pub fn find_new_server(&self, request: &RedirectRequest, old: NodeId) -> Result<Option<NodeId>> {
        let name = self.node(old)?.name;
        if !request.name_change {
            return Ok(request.find(name));
        }

        let mut matches = request.matches(name);
        let first = matches.next();
        let extra = matches.count();
        if extra > 0 {
            return Err(GraphError::AmbiguousReplacement {
                attribute: format!("{ORIGNAME_PREFIX}{}", self.label(old)),
                count: extra + 1,
            });
        }
        Ok(first)
    }

    /// Attach a cache to `owner`, returning its index.
    pub fn register_cache(&mut self, owner: NodeId, cache: Box<dyn Cache>) -> Result<usize> {
        let node = self.node_mut(owner)?;
        node.caches.push(cache);
        Ok(node.caches.len() - 1)
    }

    /// Detach the cache at `index`.
    pub fn unregister_cache(&mut self, owner: NodeId, index: usize) -> Result<Option<Box<dyn Cache>>> {
        let node = self.node_mut(owner)?;
        if index >= node.caches.len() {
            return Ok(None);
        }
        Ok(Some(node.caches.remove(index)))
    }

    pub fn caches(&self, owner: NodeId) -> Result<&[Box<dyn Cache>]> {
        Ok(&self.node(owner)?.caches)
    }

    /// Drop every cache of `owner`, returning how many there were.
    pub fn reset_caches(&mut self, owner: NodeId) -> Result<usize> {
        let node = self.node_mut(owner)?;
        let count = node.caches.len();
        node.caches.clear();
        Ok(count)
    }
}
