//! Exprgraph Core
//!
//! This crate provides the dependency-graph core of an expression-based
//! modeling toolkit. Models are built from nodes (variables, constants,
//! functions, probability densities) that read from one another. The core
//! tracks who depends on whom and keeps derived values incrementally
//! evaluable.
//!
//! It implements:
//!
//! - Ref-counted client/server edges with value and shape propagation flags
//! - Dirty-state propagation with per-node operating modes
//! - Typed proxies and server redirection, the basis of cloning
//! - Structural queries (leaves, branches, parameters, observables)
//! - Deep snapshots and owning collections with dependency-safe deletion
//! - Constant-subexpression and cache-mode optimizations
//!
//! Evaluation itself is left to collaborators: a kind exposes whatever
//! recompute entry point it needs, reads its inputs through its proxies and
//! clears its own dirty flags.
//!
//! # Architecture
//!
//! - `graph`: the node arena, edges, propagation, redirects and queries
//! - `collection`: named sets of node handles, optionally owning
//! - `config`: JSON-loadable session settings
//! - `error`: the crate error type
//!
//! Log output goes through `tracing` under the targets listed in
//! [`targets`], so subscribers can filter by topic.
//!
//! # Example
//!
//! ```rust
//! use exprgraph_core::{Collection, Graph};
//!
//! # fn main() -> exprgraph_core::Result<()> {
//! let mut graph = Graph::new();
//! let x = graph.real_var("x", 1.0);
//! let f = graph.function("f", "x + 1", &[x])?;
//! let g = graph.function("g", "x * 2", &[x])?;
//! graph.node_mut(f)?.clear_value_dirty();
//! graph.node_mut(g)?.clear_value_dirty();
//!
//! // Changing x invalidates both readers.
//! graph.set_value_dirty(x)?;
//! assert!(graph.node(f)?.is_value_dirty());
//! assert!(graph.node(g)?.is_value_dirty());
//!
//! // Point f at a replacement x without touching g.
//! let x2 = graph.real_var("x", 2.0);
//! let outcome = graph.redirect_servers(f, &Collection::with_members("data", [x2]), false, false)?;
//! assert!(outcome.succeeded());
//! assert!(graph.servers(f)?.contains(x2));
//! assert!(graph.servers(g)?.contains(x));
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod config;
pub mod error;
pub mod graph;

/// `tracing` targets used by the crate's log events.
pub mod targets {
    /// Edge creation, removal and dirty propagation.
    pub const LINK_STATE: &str = "exprgraph::link_state";
    /// Constant detection and cache-mode changes.
    pub const OPTIMIZATION: &str = "exprgraph::optimization";
    /// Cloning, snapshots and deletion.
    pub const OBJECT_HANDLING: &str = "exprgraph::object_handling";
}

pub use collection::Collection;
pub use config::GraphConfig;
pub use error::{GraphError, Result};
pub use graph::{DependencyRemoved, Graph, NodeId, NodeKind, OperMode, RedirectOutcome, Snapshot};
