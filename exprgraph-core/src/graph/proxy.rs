//! Typed Proxies
//!
//! A proxy is a named handle owned by one node and pointing at zero or one
//! of its servers. Its propagation flags are fixed when it is registered;
//! only the target moves, through a redirect or [`Graph::change_pointer`].
//!
//! [`ProxyRef<K>`] is the typed handle a node kind keeps for each input. The
//! marker type `K` states which [`KindTag`] the target must carry, so a real
//! proxy can never be retargeted onto a category.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use tracing::error;

use super::cache::RedirectRequest;
use super::kind::KindTag;
use super::node::NodeId;
use super::store::Graph;
use crate::collection::Collection;
use crate::error::{GraphError, Result};
use crate::targets::LINK_STATE;

/// Graph-unique proxy identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyId(u32);

impl ProxyId {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// A proxy as stored on its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    pub(crate) id: ProxyId,
    pub(crate) name: String,
    pub(crate) target: Option<NodeId>,
    pub(crate) value: bool,
    pub(crate) shape: bool,
    pub(crate) expects: Option<KindTag>,
}

impl Proxy {
    pub fn id(&self) -> ProxyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    pub fn propagates_value(&self) -> bool {
        self.value
    }

    pub fn propagates_shape(&self) -> bool {
        self.shape
    }

    /// Tag the target must carry, if any.
    pub fn expects(&self) -> Option<KindTag> {
        self.expects
    }

    fn accepts(&self, tag: KindTag) -> bool {
        self.expects.map_or(true, |expected| expected == tag)
    }
}

/// Marker for the target a typed proxy accepts.
pub trait ProxyKind {
    const EXPECTS: Option<KindTag>;
}

/// Proxy onto a real-valued node.
#[derive(Debug)]
pub enum RealProxy {}

impl ProxyKind for RealProxy {
    const EXPECTS: Option<KindTag> = Some(KindTag::Real);
}

/// Proxy onto a category-valued node.
#[derive(Debug)]
pub enum CategoryProxy {}

impl ProxyKind for CategoryProxy {
    const EXPECTS: Option<KindTag> = Some(KindTag::Category);
}

/// Proxy onto any node.
#[derive(Debug)]
pub enum AnyProxy {}

impl ProxyKind for AnyProxy {
    const EXPECTS: Option<KindTag> = None;
}

/// Typed handle to a proxy owned by `owner`.
pub struct ProxyRef<K> {
    owner: NodeId,
    id: ProxyId,
    _kind: PhantomData<fn() -> K>,
}

impl<K> ProxyRef<K> {
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn id(&self) -> ProxyId {
        self.id
    }
}

impl<K> Clone for ProxyRef<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for ProxyRef<K> {}

impl<K> PartialEq for ProxyRef<K> {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.id == other.id
    }
}

impl<K> Eq for ProxyRef<K> {}

impl<K> fmt::Debug for ProxyRef<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRef")
            .field("owner", &self.owner)
            .field("id", &self.id)
            .finish()
    }
}

impl Graph {
    /// Register a proxy on `owner`, adding `target` as a server with the
    /// proxy's flags.
    pub fn register_proxy<K: ProxyKind>(
        &mut self,
        owner: NodeId,
        name: &str,
        target: Option<NodeId>,
        value: bool,
        shape: bool,
    ) -> Result<ProxyRef<K>> {
        if self.node(owner)?.proxies.iter().any(|proxy| proxy.name == name) {
            error!(
                target: LINK_STATE,
                node = %self.label(owner),
                proxy = name,
                "proxy already registered"
            );
            return Err(GraphError::DuplicateProxy {
                node: self.label(owner),
                proxy: name.to_string(),
            });
        }

        if let Some(target) = target {
            let found = self.node(target)?.kind.tag();
            if let Some(expected) = K::EXPECTS.filter(|&expected| expected != found) {
                return Err(GraphError::ProxyKindMismatch {
                    proxy: name.to_string(),
                    target: self.label(target),
                    expected,
                    found,
                });
            }
            self.add_server(owner, target, value, shape)?;
        }

        let id = self.alloc_proxy_id();
        self.node_mut(owner)?.proxies.push(Proxy {
            id,
            name: name.to_string(),
            target,
            value,
            shape,
            expects: K::EXPECTS,
        });
        Ok(ProxyRef {
            owner,
            id,
            _kind: PhantomData,
        })
    }

    /// Drop a proxy from its owner. The server edge it created stays.
    pub fn unregister_proxy<K>(&mut self, proxy: ProxyRef<K>) -> Result<()> {
        let node = self.node_mut(proxy.owner)?;
        match node.proxies.iter().position(|entry| entry.id == proxy.id) {
            Some(position) => {
                node.proxies.remove(position);
                Ok(())
            }
            None => Err(GraphError::ProxyNotFound {
                node: self.label(proxy.owner),
                proxy: proxy.id.raw(),
            }),
        }
    }

    /// Current target of a proxy.
    pub fn resolve<K>(&self, proxy: &ProxyRef<K>) -> Result<Option<NodeId>> {
        self.node(proxy.owner)?
            .proxies
            .iter()
            .find(|entry| entry.id == proxy.id)
            .map(|entry| entry.target)
            .ok_or_else(|| GraphError::ProxyNotFound {
                node: self.label(proxy.owner),
                proxy: proxy.id.raw(),
            })
    }

    pub fn proxies(&self, owner: NodeId) -> Result<&[Proxy]> {
        Ok(&self.node(owner)?.proxies)
    }

    /// Retarget `proxy` onto its counterpart in `new_set`.
    ///
    /// The counterpart is the same-named member, or under `name_change` the
    /// member whose `ORIGNAME:` attribute names the current target. With
    /// `factory_init` set, an empty proxy binds to the first member of
    /// `new_set` and adds it as a server with the proxy's flags. Returns
    /// whether the proxy now points where it should.
    pub fn change_pointer<K>(
        &mut self,
        proxy: &ProxyRef<K>,
        new_set: &Collection,
        name_change: bool,
        factory_init: bool,
    ) -> Result<bool> {
        let index = self.proxy_index(proxy)?;
        let request = self.redirect_request(new_set, false, name_change, false);
        self.change_pointer_at(proxy.owner, index, &request, factory_init, &HashSet::new())
    }

    /// Retarget the proxy at `index` of `owner` using the candidates of
    /// `request`. Proxies whose target is in `held` keep it and fail.
    ///
    /// An empty proxy succeeds without binding unless `factory_init` is set.
    /// The proxy keeps its target and the call fails if no unique candidate
    /// exists, if the candidate is the owner itself, or if its tag does not
    /// fit the proxy.
    pub(crate) fn change_pointer_at(
        &mut self,
        owner: NodeId,
        index: usize,
        request: &RedirectRequest,
        factory_init: bool,
        held: &HashSet<NodeId>,
    ) -> Result<bool> {
        let Some(proxy) = self.node(owner)?.proxies.get(index).cloned() else {
            return Ok(false);
        };

        let replacement = match proxy.target {
            Some(target) if held.contains(&target) => None,
            Some(target) => self.find_new_server(request, target)?,
            None if factory_init => request.first(),
            None => None,
        };
        let replacement = replacement.filter(|&candidate| {
            candidate != owner && self.get(candidate).is_some_and(|node| proxy.accepts(node.kind.tag()))
        });

        if let Some(replacement) = replacement {
            if proxy.target.is_none() {
                self.add_server(owner, replacement, proxy.value, proxy.shape)?;
            }
            if let Some(entry) = self.node_mut(owner)?.proxies.get_mut(index) {
                entry.target = Some(replacement);
            }
        }

        if proxy.target.is_none() && !factory_init {
            return Ok(true);
        }
        Ok(replacement.is_some())
    }

    fn proxy_index<K>(&self, proxy: &ProxyRef<K>) -> Result<usize> {
        self.node(proxy.owner)?
            .proxies
            .iter()
            .position(|entry| entry.id == proxy.id)
            .ok_or_else(|| GraphError::ProxyNotFound {
                node: self.label(proxy.owner),
                proxy: proxy.id.raw(),
            })
    }
}
