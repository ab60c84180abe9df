//! Node Kinds
//!
//! A node's behavior beyond the graph bookkeeping is supplied by a
//! [`NodeKind`] trait object. The graph never inspects concrete types:
//! traversal, proxies and the optimizers only ask capability questions
//! (fundamental, derived, lvalue, value tag).
//!
//! # Built-in Kinds
//!
//! - [`RealVar`]: a fundamental real-valued lvalue (a fit parameter or an
//!   observable).
//! - [`ConstVar`]: a fundamental constant.
//! - [`CategoryVar`]: a fundamental category-valued lvalue.
//! - [`Function`]: an opaque derived node. Its math belongs to a
//!   collaborator; the graph only tracks its inputs.
//!
//! Collaborators add their own kinds by implementing the trait and calling
//! [`Graph::create`] followed by [`Graph::add_server`] or
//! [`Graph::register_proxy`] for each input.

use std::any::Any;
use std::fmt;

use super::cache::RedirectRequest;
use super::node::{NodeId, OperMode, CONSTANT};
use super::proxy::AnyProxy;
use super::store::Graph;
use crate::error::Result;

/// Value category of a node, checked by typed proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KindTag {
    Real,
    Category,
    Opaque,
}

/// Capabilities and hooks of a node kind.
pub trait NodeKind: fmt::Debug + 'static {
    /// Short type name used in printed trees.
    fn type_name(&self) -> &'static str;

    fn tag(&self) -> KindTag;

    /// Holds a value directly instead of computing it.
    fn is_fundamental(&self) -> bool {
        false
    }

    /// Computed from servers.
    fn is_derived(&self) -> bool {
        true
    }

    /// Value can be assigned.
    fn is_lvalue(&self) -> bool {
        false
    }

    /// Terminal value nodes can be read without a recompute check.
    fn evaluates_fast(&self) -> bool {
        false
    }

    fn clone_kind(&self) -> Box<dyn NodeKind>;

    /// Called after the node's servers were redirected. Returns `true` on
    /// failure.
    fn redirect_servers_hook(&mut self, _request: &RedirectRequest) -> bool {
        false
    }

    /// Called after every operating-mode transition.
    fn oper_mode_hook(&mut self, _mode: OperMode) {}

    /// The held value as a real number, if there is one.
    fn real_value(&self) -> Option<f64> {
        None
    }

    /// Short rendering of the value for printed trees.
    fn describe_value(&self) -> String {
        String::new()
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A real-valued variable.
#[derive(Debug, Clone, PartialEq)]
pub struct RealVar {
    pub value: f64,
}

impl RealVar {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl NodeKind for RealVar {
    fn type_name(&self) -> &'static str {
        "RealVar"
    }

    fn tag(&self) -> KindTag {
        KindTag::Real
    }

    fn is_fundamental(&self) -> bool {
        true
    }

    fn is_derived(&self) -> bool {
        false
    }

    fn is_lvalue(&self) -> bool {
        true
    }

    fn evaluates_fast(&self) -> bool {
        true
    }

    fn clone_kind(&self) -> Box<dyn NodeKind> {
        Box::new(self.clone())
    }

    fn real_value(&self) -> Option<f64> {
        Some(self.value)
    }

    fn describe_value(&self) -> String {
        self.value.to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A real-valued constant.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstVar {
    pub value: f64,
}

impl ConstVar {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl NodeKind for ConstVar {
    fn type_name(&self) -> &'static str {
        "ConstVar"
    }

    fn tag(&self) -> KindTag {
        KindTag::Real
    }

    fn is_fundamental(&self) -> bool {
        true
    }

    fn is_derived(&self) -> bool {
        false
    }

    fn evaluates_fast(&self) -> bool {
        true
    }

    fn clone_kind(&self) -> Box<dyn NodeKind> {
        Box::new(self.clone())
    }

    fn real_value(&self) -> Option<f64> {
        Some(self.value)
    }

    fn describe_value(&self) -> String {
        self.value.to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A category-valued variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryVar {
    pub label: String,
}

impl CategoryVar {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl NodeKind for CategoryVar {
    fn type_name(&self) -> &'static str {
        "CategoryVar"
    }

    fn tag(&self) -> KindTag {
        KindTag::Category
    }

    fn is_fundamental(&self) -> bool {
        true
    }

    fn is_derived(&self) -> bool {
        false
    }

    fn is_lvalue(&self) -> bool {
        true
    }

    fn clone_kind(&self) -> Box<dyn NodeKind> {
        Box::new(self.clone())
    }

    fn describe_value(&self) -> String {
        self.label.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A derived real-valued node described by an expression string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub expression: String,
}

impl Function {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}

impl NodeKind for Function {
    fn type_name(&self) -> &'static str {
        "Function"
    }

    fn tag(&self) -> KindTag {
        KindTag::Real
    }

    fn clone_kind(&self) -> Box<dyn NodeKind> {
        Box::new(self.clone())
    }

    fn describe_value(&self) -> String {
        self.expression.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Graph {
    /// Create a real-valued variable.
    pub fn real_var(&mut self, name: &str, value: f64) -> NodeId {
        self.create(name, name, Box::new(RealVar::new(value)))
    }

    /// Create a constant. Constants carry the `Constant` attribute.
    pub fn constant(&mut self, name: &str, value: f64) -> NodeId {
        let id = self.create(name, name, Box::new(ConstVar::new(value)));
        if let Some(node) = self.get_mut(id) {
            node.set_attribute(CONSTANT, true);
        }
        id
    }

    pub fn category(&mut self, name: &str, label: &str) -> NodeId {
        self.create(name, name, Box::new(CategoryVar::new(label)))
    }

    /// Create a [`Function`] reading `inputs` through one value proxy each.
    ///
    /// Listing an input twice registers two references to it.
    pub fn function(&mut self, name: &str, expression: &str, inputs: &[NodeId]) -> Result<NodeId> {
        let id = self.create(name, expression, Box::new(Function::new(expression)));
        for (position, &input) in inputs.iter().enumerate() {
            let proxy = format!("input{position}");
            if let Err(err) = self.register_proxy::<AnyProxy>(id, &proxy, Some(input), true, false) {
                self.retract(id)?;
                return Err(err);
            }
        }
        Ok(id)
    }

    /// Assign a [`RealVar`] and propagate the change.
    ///
    /// Returns `false` if the node is not a real variable.
    pub fn set_real_value(&mut self, id: NodeId, value: f64) -> Result<bool> {
        self.node(id)?;
        let Some(var) = self.kind_as_mut::<RealVar>(id) else {
            return Ok(false);
        };
        var.value = value;
        self.set_value_dirty(id)?;
        Ok(true)
    }

    /// Value of a node that holds a real number.
    pub fn real_value(&self, id: NodeId) -> Result<Option<f64>> {
        Ok(self.node(id)?.kind.real_value())
    }
}
