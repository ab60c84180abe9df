//! Client-Server Edges
//!
//! Every edge is stored on both endpoints: the client lists the server in
//! `servers`, the server lists the client in `clients` and, depending on the
//! propagation flags, in `value_clients` and `shape_clients`. All four lists
//! carry reference counts, and every mutation here keeps the two sides in
//! step. Nothing else in the crate touches these lists except retraction and
//! cloning.

use tracing::{debug, error, warn};

use super::node::{NodeId, OperMode};
use super::refcount::RefCountList;
use super::store::Graph;
use crate::error::{GraphError, Result};
use crate::targets::LINK_STATE;

impl Graph {
    /// Register `server` as a server of `client`.
    ///
    /// A value link to an `AlwaysDirty` server upgrades the client to
    /// `AlwaysDirty` as well.
    pub fn add_server(&mut self, client: NodeId, server: NodeId, value: bool, shape: bool) -> Result<()> {
        self.check_server_change(client, server, "addition")?;
        self.node(server)?;
        if client == server {
            error!(target: LINK_STATE, node = %self.label(client), "node cannot serve itself");
            return Err(GraphError::SelfServer {
                node: self.label(client),
            });
        }

        if self.session.verbose_dirty() {
            debug!(
                target: LINK_STATE,
                client = %self.label(client),
                server = %self.label(server),
                value,
                shape,
                "adding server"
            );
        }

        let server_mode = self.node(server)?.oper_mode;
        let client_mode = self.node(client)?.oper_mode;
        if value && server_mode == OperMode::AlwaysDirty && client_mode != OperMode::AlwaysDirty {
            self.set_oper_mode(client, OperMode::AlwaysDirty, true)?;
        }

        self.link(client, server, 1, u32::from(value), u32::from(shape));
        Ok(())
    }

    /// Register every node in `servers` with the same flags.
    pub fn add_server_list(
        &mut self,
        client: NodeId,
        servers: impl IntoIterator<Item = NodeId>,
        value: bool,
        shape: bool,
    ) -> Result<()> {
        for server in servers {
            self.add_server(client, server, value, shape)?;
        }
        Ok(())
    }

    /// Write both halves of an edge without any checks.
    pub(crate) fn link(&mut self, client: NodeId, server: NodeId, total: u32, value: u32, shape: u32) {
        if let Some(node) = self.get_mut(client) {
            node.servers.add(server, total);
        }
        if let Some(node) = self.get_mut(server) {
            node.clients.add(client, total);
            node.value_clients.add(client, value);
            node.shape_clients.add(client, shape);
        }
    }

    /// Drop one reference from `client` to `server`, or all of them when
    /// `force` is set.
    ///
    /// Removing an edge that neither side knows is a no-op. An edge known to
    /// only one side is an inconsistency and is rejected.
    pub fn remove_server(&mut self, client: NodeId, server: NodeId, force: bool) -> Result<()> {
        self.check_server_change(client, server, "removal")?;

        if self.session.verbose_dirty() {
            debug!(
                target: LINK_STATE,
                client = %self.label(client),
                server = %self.label(server),
                force,
                "removing server"
            );
        }

        let on_client = self.node(client)?.servers.contains(server);
        let on_server = self.node(server)?.clients.contains(client);
        if on_client != on_server {
            error!(
                target: LINK_STATE,
                client = %self.label(client),
                server = %self.label(server),
                "edge registered on one side only"
            );
            return Err(GraphError::InconsistentEdge {
                server: self.label(server),
                client: self.label(client),
            });
        }
        if !on_client {
            return Ok(());
        }

        self.node_mut(client)?.servers.remove(server, force);
        let node = self.node_mut(server)?;
        node.clients.remove(client, force);
        node.value_clients.remove(client, force);
        node.shape_clients.remove(client, force);
        Ok(())
    }

    /// Swap `old` for `new`, keeping the reference count of the edge.
    pub fn replace_server(
        &mut self,
        client: NodeId,
        old: NodeId,
        new: NodeId,
        value: bool,
        shape: bool,
    ) -> Result<()> {
        let count = self.node(client)?.servers.ref_count(old);
        if count == 0 {
            return Err(GraphError::ServerNotRegistered {
                node: self.label(client),
                server: self.label(old),
            });
        }
        self.node(new)?;
        if new == client {
            return Err(GraphError::SelfServer {
                node: self.label(client),
            });
        }

        self.remove_server(client, old, true)?;
        for _ in 0..count {
            self.add_server(client, new, value, shape)?;
        }
        Ok(())
    }

    /// Rewrite the propagation flags of an existing edge.
    ///
    /// The new flags apply to every reference of the edge. If the references
    /// previously disagreed (some propagating, some not) the disagreement is
    /// logged before it is overwritten.
    pub fn change_server(&mut self, client: NodeId, server: NodeId, value: bool, shape: bool) -> Result<()> {
        if !self.node(client)?.servers.contains(server) {
            error!(
                target: LINK_STATE,
                client = %self.label(client),
                server = %self.label(server),
                "server not registered"
            );
            return Err(GraphError::ServerNotRegistered {
                node: self.label(client),
                server: self.label(server),
            });
        }

        let node = self.node(server)?;
        if !node.clients.contains(client) {
            error!(
                target: LINK_STATE,
                client = %self.label(client),
                server = %self.label(server),
                "server does not list the node as client"
            );
            return Err(GraphError::InconsistentEdge {
                server: self.label(server),
                client: self.label(client),
            });
        }

        let total = node.clients.ref_count(client);
        let value_refs = node.value_clients.ref_count(client);
        let shape_refs = node.shape_clients.ref_count(client);
        let diverging = |refs: u32| refs > 0 && refs < total;
        if diverging(value_refs) || diverging(shape_refs) {
            warn!(
                target: LINK_STATE,
                client = %self.label(client),
                server = %self.label(server),
                total,
                value_refs,
                shape_refs,
                "references disagree on propagation flags, overwriting all of them"
            );
        }

        let node = self.node_mut(server)?;
        node.value_clients.remove_all(client);
        node.shape_clients.remove_all(client);
        if value {
            node.value_clients.add(client, total);
        }
        if shape {
            node.shape_clients.add(client, total);
        }
        Ok(())
    }

    fn check_server_change(&self, client: NodeId, server: NodeId, action: &str) -> Result<()> {
        if self.node(client)?.prohibit_server_redirect {
            error!(
                target: LINK_STATE,
                client = %self.label(client),
                server = %self.label(server),
                action,
                "prohibited server change requested"
            );
            return Err(GraphError::RedirectProhibited {
                node: self.label(client),
            });
        }
        Ok(())
    }

    /// Lock or unlock the server list of a node.
    pub fn set_prohibit_server_redirect(&mut self, id: NodeId, flag: bool) -> Result<()> {
        self.node_mut(id)?.prohibit_server_redirect = flag;
        Ok(())
    }

    /// First server of `client` whose name is `name`.
    pub fn find_server(&self, client: NodeId, name: &str) -> Option<NodeId> {
        let name = self.names().known(name)?;
        self.get(client)?
            .servers
            .iter()
            .find(|&server| self.name_id(server) == Some(name))
    }

    /// Whether `server` forwards value changes to `client`.
    pub fn is_value_server(&self, server: NodeId, client: NodeId) -> bool {
        self.get(server)
            .is_some_and(|node| node.value_clients.contains(client))
    }

    /// Whether `server` forwards shape changes to `client`.
    pub fn is_shape_server(&self, server: NodeId, client: NodeId) -> bool {
        self.get(server)
            .is_some_and(|node| node.shape_clients.contains(client))
    }

    pub fn servers(&self, id: NodeId) -> Result<&RefCountList> {
        Ok(&self.node(id)?.servers)
    }

    pub fn clients(&self, id: NodeId) -> Result<&RefCountList> {
        Ok(&self.node(id)?.clients)
    }

    pub fn value_clients(&self, id: NodeId) -> Result<&RefCountList> {
        Ok(&self.node(id)?.value_clients)
    }

    pub fn shape_clients(&self, id: NodeId) -> Result<&RefCountList> {
        Ok(&self.node(id)?.shape_clients)
    }

    /// Number of references `client` holds on `server`.
    pub fn server_ref_count(&self, client: NodeId, server: NodeId) -> u32 {
        self.get(client)
            .map(|node| node.servers.ref_count(server))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::kind::Function;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    fn derived(graph: &mut Graph, name: &str) -> NodeId {
        graph.create(name, name, Box::new(Function::new(name)))
    }

    /// Both endpoints must agree on every count.
    fn assert_symmetric(graph: &Graph, client: NodeId, server: NodeId) {
        assert_eq!(
            graph.node(client).unwrap().servers().ref_count(server),
            graph.node(server).unwrap().clients().ref_count(client)
        );
    }

    #[test]
    fn add_server_is_symmetric() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = derived(&mut graph, "f");

        graph.add_server(f, x, true, false).unwrap();

        assert!(graph.is_value_server(x, f));
        assert!(!graph.is_shape_server(x, f));
        assert_symmetric(&graph, f, x);
        assert_eq!(graph.find_server(f, "x"), Some(x));
        assert_eq!(graph.find_server(f, "y"), None);
    }

    #[test]
    fn self_server_is_rejected() {
        let mut graph = Graph::new();
        let f = derived(&mut graph, "f");
        assert!(matches!(
            graph.add_server(f, f, true, true),
            Err(GraphError::SelfServer { .. })
        ));
        assert!(graph.node(f).unwrap().servers().is_empty());
    }

    #[test]
    fn prohibited_node_rejects_changes() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = derived(&mut graph, "f");
        graph.add_server(f, x, true, false).unwrap();
        graph.set_prohibit_server_redirect(f, true).unwrap();

        assert!(matches!(
            graph.add_server(f, x, true, false),
            Err(GraphError::RedirectProhibited { .. })
        ));
        assert!(matches!(
            graph.remove_server(f, x, false),
            Err(GraphError::RedirectProhibited { .. })
        ));
        assert_eq!(graph.server_ref_count(f, x), 1);
    }

    #[test]
    fn removal_decrements_reference_count() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = derived(&mut graph, "f");
        graph.add_server(f, x, true, false).unwrap();
        graph.add_server(f, x, true, false).unwrap();
        assert_eq!(graph.server_ref_count(f, x), 2);

        graph.remove_server(f, x, false).unwrap();
        assert_eq!(graph.server_ref_count(f, x), 1);
        assert!(graph.is_value_server(x, f));
        assert_symmetric(&graph, f, x);

        graph.remove_server(f, x, false).unwrap();
        assert_eq!(graph.server_ref_count(f, x), 0);
        assert!(!graph.is_value_server(x, f));

        // Missing edge on both sides: nothing to do.
        graph.remove_server(f, x, false).unwrap();
    }

    #[test]
    fn forced_removal_detaches_fully() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = derived(&mut graph, "f");
        for _ in 0..3 {
            graph.add_server(f, x, true, true).unwrap();
        }
        graph.remove_server(f, x, true).unwrap();

        assert_eq!(graph.server_ref_count(f, x), 0);
        assert!(graph.node(x).unwrap().clients().is_empty());
        assert!(graph.node(x).unwrap().shape_clients().is_empty());
    }

    #[test]
    fn replace_preserves_count() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let x2 = graph.real_var("x2", 2.0);
        let f = derived(&mut graph, "f");
        graph.add_server(f, x, true, false).unwrap();
        graph.add_server(f, x, true, false).unwrap();

        graph.replace_server(f, x, x2, true, false).unwrap();

        assert_eq!(graph.server_ref_count(f, x), 0);
        assert_eq!(graph.server_ref_count(f, x2), 2);
        assert_eq!(graph.node(x2).unwrap().value_clients().ref_count(f), 2);
        assert!(graph.node(x).unwrap().clients().is_empty());
    }

    #[test]
    fn replace_unknown_server_fails() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let x2 = graph.real_var("x2", 2.0);
        let f = derived(&mut graph, "f");

        assert!(matches!(
            graph.replace_server(f, x, x2, true, false),
            Err(GraphError::ServerNotRegistered { .. })
        ));
    }

    #[test]
    fn change_server_rewrites_flags_at_total_count() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = derived(&mut graph, "f");
        graph.add_server(f, x, true, false).unwrap();
        graph.add_server(f, x, false, false).unwrap();

        graph.change_server(f, x, false, true).unwrap();
        let node = graph.node(x).unwrap();
        assert_eq!(node.value_clients().ref_count(f), 0);
        assert_eq!(node.shape_clients().ref_count(f), 2);
        assert_eq!(node.clients().ref_count(f), 2);
    }

    #[test]
    fn change_unregistered_server_fails() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = derived(&mut graph, "f");
        assert!(matches!(
            graph.change_server(f, x, true, true),
            Err(GraphError::ServerNotRegistered { .. })
        ));
    }

    #[test]
    fn always_dirty_server_upgrades_client() {
        let mut graph = Graph::new();
        let x = graph.real_var("x", 1.0);
        let f = derived(&mut graph, "f");
        let g = derived(&mut graph, "g");
        graph.set_oper_mode(x, OperMode::AlwaysDirty, false).unwrap();

        graph.add_server(g, x, false, true).unwrap();
        assert_eq!(graph.node(g).unwrap().oper_mode(), OperMode::Auto);

        graph.add_server(f, x, true, false).unwrap();
        assert_eq!(graph.node(f).unwrap().oper_mode(), OperMode::AlwaysDirty);
    }

    #[test]
    fn add_server_list_registers_each() {
        let mut graph = Graph::new();
        let a = graph.real_var("a", 1.0);
        let b = graph.real_var("b", 2.0);
        let f = derived(&mut graph, "f");

        graph.add_server_list(f, [a, b], true, true).unwrap();
        assert_eq!(graph.servers(f).unwrap().len(), 2);
        assert!(graph.is_shape_server(b, f));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn edge_detail_is_logged_only_when_verbose() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(captured.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut graph = Graph::new();
            let x = graph.real_var("x", 1.0);
            let f = derived(&mut graph, "f");

            graph.add_server(f, x, true, false).unwrap();
            graph.remove_server(f, x, false).unwrap();
            assert!(!captured.text().contains("adding server"));
            assert!(!captured.text().contains("removing server"));

            graph.set_verbose_dirty(true);
            graph.add_server(f, x, true, false).unwrap();
            graph.remove_server(f, x, false).unwrap();
        });

        assert!(captured.text().contains("adding server"));
        assert!(captured.text().contains("removing server"));
    }
}
