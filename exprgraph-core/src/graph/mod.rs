//! Dependency Graph
//!
//! This module implements the expression graph: nodes that produce values
//! or shapes, linked to the servers they read from and the clients that
//! read them.
//!
//! # Overview
//!
//! - Nodes live in an arena owned by [`Graph`] and are addressed by
//!   generational [`NodeId`] handles. A retracted slot is reused with a new
//!   generation, so stale handles fail lookups instead of aliasing.
//! - Every edge is recorded on both ends with a reference count. A client
//!   holding two proxies to the same server counts it twice; removing one
//!   proxy decrements the count.
//! - Each edge carries two propagation flags. A value link forwards
//!   value-dirty notifications, a shape link forwards shape-dirty ones.
//!
//! When a node changes, dirty flags travel to its clients. Nothing is
//! recomputed here: the evaluating collaborator reads the flags and clears
//! them after it recomputes.
//!
//! # Design Decisions
//!
//! 1. Nodes never point at each other directly. Handles keep the diamond
//!    and cyclic shapes of real models free of ownership cycles.
//!
//! 2. Structural matching (redirects, collection lookups, dependency
//!    queries) goes by interned name. Bookkeeping (visited sets, edges)
//!    goes by handle.
//!
//! 3. Process-wide switches such as dirty inhibition live in a [`Session`]
//!    owned by the graph, so independent graphs never share state.

mod cache;
mod dirty;
mod edges;
mod kind;
mod names;
mod node;
mod optimize;
mod print;
mod proxy;
mod redirect;
mod refcount;
mod session;
mod snapshot;
mod store;
mod traverse;

pub use cache::{Cache, Candidate, RedirectRequest, ORIGNAME_PREFIX};
pub use kind::{CategoryVar, ConstVar, Function, KindTag, NodeKind, RealVar};
pub use names::{NameId, NameRegistry};
pub use node::{Node, NodeId, OperMode, CONSTANT};
pub use optimize::{CACHE_AND_TRACK, CONSTANT_EXPRESSION, CONSTANT_EXPRESSION_CACHED, NEVER_CONSTANT};
pub use proxy::{AnyProxy, CategoryProxy, Proxy, ProxyId, ProxyKind, ProxyRef, RealProxy};
pub use redirect::RedirectOutcome;
pub use refcount::RefCountList;
pub use session::Session;
pub use snapshot::{Snapshot, EXTERNAL_CLONE};
pub use store::{DependencyRemoved, Graph};
