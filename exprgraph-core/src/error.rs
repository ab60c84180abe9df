//! Error types for graph operations.
//!
//! Only consistency violations and invalid input are errors. Partial
//! structural failures (servers left unmatched by a redirect, proxies that
//! could not be retargeted) are reported through
//! [`RedirectOutcome`](crate::graph::RedirectOutcome) so callers can keep the
//! best-effort result.

use crate::graph::{KindTag, NodeId};

/// Errors raised by graph, edge and collection operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The handle refers to a slot that is empty or was reused.
    #[error("node {0} does not exist")]
    NodeNotFound(NodeId),

    /// A node was asked to serve itself.
    #[error("node '{node}' cannot be registered as its own server")]
    SelfServer { node: String },

    /// Server links were modified while the node was locked for a redirect.
    #[error("server redirect prohibited on node '{node}'")]
    RedirectProhibited { node: String },

    /// A proxy with the same name is already owned by the node.
    #[error("proxy '{proxy}' is already registered on node '{node}'")]
    DuplicateProxy { node: String, proxy: String },

    /// The proxy target does not have the capability the proxy expects.
    #[error("proxy '{proxy}' expects a {expected:?} target but '{target}' is {found:?}")]
    ProxyKindMismatch {
        proxy: String,
        target: String,
        expected: KindTag,
        found: KindTag,
    },

    /// The proxy handle no longer names a proxy of its owner.
    #[error("proxy {proxy} is not registered on node '{node}'")]
    ProxyNotFound { node: String, proxy: u32 },

    /// More than one candidate carries the same `ORIGNAME:` attribute.
    #[error("{count} replacement candidates carry attribute '{attribute}'")]
    AmbiguousReplacement { attribute: String, count: usize },

    /// The server is not registered with the client.
    #[error("server '{server}' is not registered with node '{node}'")]
    ServerNotRegistered { node: String, server: String },

    /// Client and server lists disagree about an edge.
    #[error("inconsistent link state between server '{server}' and client '{client}'")]
    InconsistentEdge { server: String, client: String },

    /// Borrowed and owned members cannot be mixed in one collection.
    #[error("collection '{collection}': {reason}")]
    Ownership { collection: String, reason: &'static str },

    /// Configuration could not be parsed.
    #[error("invalid graph configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A name selection pattern could not be compiled.
    #[error("invalid name pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;
