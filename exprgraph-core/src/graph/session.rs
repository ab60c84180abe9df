//! Graph Session
//!
//! Process-wide switches of the propagation engine live here instead of in
//! statics, so every [`Graph`](super::Graph) can be exercised in isolation.
//!
//! # What the Session Tracks
//!
//! - The dirty-inhibit switch: while set, value-dirty propagation is a no-op
//!   for every node that did not opt out locally.
//! - The verbose switch: per-edge `debug!` events during propagation and
//!   redirects.
//! - The in-progress redirect set: nodes already handled by the current
//!   top-level recursive redirect. Entries stay until the top-level call
//!   finishes, so shared ancestors in a diamond are redirected once.

use std::collections::HashSet;

use super::node::NodeId;
use crate::config::GraphConfig;

/// Mutable engine state owned by one graph.
#[derive(Debug, Default)]
pub struct Session {
    inhibit_dirty: bool,
    verbose_dirty: bool,
    redirecting: HashSet<NodeId>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a session from configuration.
    pub fn from_config(config: &GraphConfig) -> Self {
        Self {
            inhibit_dirty: config.inhibit_dirty,
            verbose_dirty: config.verbose_dirty,
            redirecting: HashSet::new(),
        }
    }

    pub fn inhibit_dirty(&self) -> bool {
        self.inhibit_dirty
    }

    pub(crate) fn set_inhibit_dirty(&mut self, flag: bool) {
        self.inhibit_dirty = flag;
    }

    pub fn verbose_dirty(&self) -> bool {
        self.verbose_dirty
    }

    pub(crate) fn set_verbose_dirty(&mut self, flag: bool) {
        self.verbose_dirty = flag;
    }

    /// Whether no recursive redirect is running.
    pub fn redirect_idle(&self) -> bool {
        self.redirecting.is_empty()
    }

    /// Mark `id` as handled by the running redirect.
    ///
    /// Returns `false` if it was already handled.
    pub(crate) fn enter_redirect(&mut self, id: NodeId) -> bool {
        self.redirecting.insert(id)
    }

    pub fn is_redirecting(&self, id: NodeId) -> bool {
        self.redirecting.contains(&id)
    }

    /// Forget every in-progress entry once the top-level call returns.
    pub(crate) fn finish_redirect(&mut self) {
        self.redirecting.clear();
    }
}
