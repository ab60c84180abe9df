//! Graph configuration.
//!
//! A [`GraphConfig`] seeds the per-graph [`Session`](crate::graph::Session).
//! Every field has a default, so partial JSON documents are accepted.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables applied when a [`Graph`](crate::graph::Graph) is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Emit per-edge debug events during propagation and redirects.
    pub verbose_dirty: bool,

    /// Start with dirty propagation suppressed.
    pub inhibit_dirty: bool,

    /// Number of node slots to reserve up front.
    pub initial_capacity: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            verbose_dirty: false,
            inhibit_dirty: false,
            initial_capacity: 64,
        }
    }
}

impl GraphConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
