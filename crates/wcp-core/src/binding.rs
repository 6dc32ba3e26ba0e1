// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed placeholder bindings.
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::ident::{CaseId, NodeId, RegionId};
use crate::template::{BindingKind, Placeholder};
use crate::tx::TxId;

/// A generated multiple-instance child.
#[derive(Debug, Clone, PartialEq)]
pub struct MiInstance {
    /// Child id (`base#index`).
    pub id: NodeId,
    /// Base node.
    pub base: NodeId,
    /// Zero-based index.
    pub index: u32,
    /// Bound item, absent under index binding.
    pub item: Option<Value>,
}

/// Value bound to one placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// One node.
    Node(NodeId),
    /// Ordered node set.
    Nodes(Vec<NodeId>),
    /// Generated instances.
    Instances(Vec<MiInstance>),
    /// Item list.
    Items(Vec<Value>),
    /// Region id.
    Region(RegionId),
    /// Case id.
    Case(CaseId),
    /// Transaction id.
    Tx(TxId),
}

impl Binding {
    /// Kind of the bound value.
    #[must_use]
    pub const fn kind(&self) -> BindingKind {
        match self {
            Self::Node(_) => BindingKind::Node,
            Self::Nodes(_) => BindingKind::Nodes,
            Self::Instances(_) => BindingKind::Instances,
            Self::Items(_) => BindingKind::Items,
            Self::Region(_) => BindingKind::Region,
            Self::Case(_) => BindingKind::Case,
            Self::Tx(_) => BindingKind::Tx,
        }
    }
}

/// Binding failures. These indicate a catalog/verb mismatch, not bad state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    /// Placeholder used but never bound.
    #[error("placeholder {0} is unbound")]
    Unbound(Placeholder),
    /// Bound value does not match the placeholder kind.
    #[error("placeholder {placeholder} expects {expected}, got {found}")]
    KindMismatch {
        /// Placeholder.
        placeholder: Placeholder,
        /// Kind the placeholder declares.
        expected: BindingKind,
        /// Kind supplied.
        found: BindingKind,
    },
    /// Placeholder bound a second time within one rule application.
    #[error("placeholder {0} is already bound")]
    AlreadyBound(Placeholder),
}

/// Placeholder → value map for one rule application.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: BTreeMap<Placeholder, Binding>,
}

impl Bindings {
    /// Empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` to `placeholder`. Each placeholder binds at most once.
    pub fn bind(&mut self, placeholder: Placeholder, value: Binding) -> Result<(), BindingError> {
        if value.kind() != placeholder.kind() {
            return Err(BindingError::KindMismatch {
                placeholder,
                expected: placeholder.kind(),
                found: value.kind(),
            });
        }
        match self.values.entry(placeholder) {
            Entry::Occupied(_) => Err(BindingError::AlreadyBound(placeholder)),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            }
        }
    }

    /// Raw lookup.
    pub fn get(&self, placeholder: Placeholder) -> Result<&Binding, BindingError> {
        self.values
            .get(&placeholder)
            .ok_or(BindingError::Unbound(placeholder))
    }

    /// True when `placeholder` is bound.
    #[must_use]
    pub fn contains(&self, placeholder: Placeholder) -> bool {
        self.values.contains_key(&placeholder)
    }

    /// Single node.
    pub fn node(&self, placeholder: Placeholder) -> Result<&NodeId, BindingError> {
        match self.get(placeholder)? {
            Binding::Node(node) => Ok(node),
            other => Err(mismatch(placeholder, BindingKind::Node, other)),
        }
    }

    /// Node set; a single node binds as a one-element set.
    pub fn nodes(&self, placeholder: Placeholder) -> Result<&[NodeId], BindingError> {
        match self.get(placeholder)? {
            Binding::Node(node) => Ok(std::slice::from_ref(node)),
            Binding::Nodes(nodes) => Ok(nodes),
            other => Err(mismatch(placeholder, BindingKind::Nodes, other)),
        }
    }

    /// Generated instances.
    pub fn instances(&self, placeholder: Placeholder) -> Result<&[MiInstance], BindingError> {
        match self.get(placeholder)? {
            Binding::Instances(instances) => Ok(instances),
            other => Err(mismatch(placeholder, BindingKind::Instances, other)),
        }
    }

    /// Item list.
    pub fn items(&self, placeholder: Placeholder) -> Result<&[Value], BindingError> {
        match self.get(placeholder)? {
            Binding::Items(items) => Ok(items),
            other => Err(mismatch(placeholder, BindingKind::Items, other)),
        }
    }

    /// Region id.
    pub fn region(&self, placeholder: Placeholder) -> Result<&RegionId, BindingError> {
        match self.get(placeholder)? {
            Binding::Region(region) => Ok(region),
            other => Err(mismatch(placeholder, BindingKind::Region, other)),
        }
    }

    /// Case id.
    pub fn case(&self, placeholder: Placeholder) -> Result<&CaseId, BindingError> {
        match self.get(placeholder)? {
            Binding::Case(case) => Ok(case),
            other => Err(mismatch(placeholder, BindingKind::Case, other)),
        }
    }

    /// Transaction id.
    pub fn tx(&self, placeholder: Placeholder) -> Result<TxId, BindingError> {
        match self.get(placeholder)? {
            Binding::Tx(tx) => Ok(*tx),
            other => Err(mismatch(placeholder, BindingKind::Tx, other)),
        }
    }
}

fn mismatch(placeholder: Placeholder, expected: BindingKind, found: &Binding) -> BindingError {
    BindingError::KindMismatch {
        placeholder,
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_checks_kinds() {
        let mut bindings = Bindings::new();
        let err = bindings
            .bind(Placeholder::Subject, Binding::Nodes(vec![]))
            .expect_err("subject binds a single node");
        assert_eq!(
            err,
            BindingError::KindMismatch {
                placeholder: Placeholder::Subject,
                expected: BindingKind::Node,
                found: BindingKind::Nodes,
            }
        );
        assert_eq!(
            bindings.nodes(Placeholder::Targets),
            Err(BindingError::Unbound(Placeholder::Targets))
        );
    }

    #[test]
    fn placeholders_bind_once() {
        let mut bindings = Bindings::new();
        bindings
            .bind(Placeholder::Subject, Binding::Node(NodeId::new("a")))
            .expect("first bind");
        let err = bindings
            .bind(Placeholder::Subject, Binding::Node(NodeId::new("b")))
            .expect_err("rebind");
        assert_eq!(err, BindingError::AlreadyBound(Placeholder::Subject));
        assert_eq!(
            bindings.node(Placeholder::Subject).expect("still a"),
            &NodeId::new("a")
        );
    }

    #[test]
    fn single_node_reads_as_node_set() {
        let mut bindings = Bindings::new();
        bindings
            .bind(Placeholder::Subject, Binding::Node(NodeId::new("a")))
            .expect("bind subject");
        assert_eq!(
            bindings.nodes(Placeholder::Subject).expect("node set"),
            &[NodeId::new("a")]
        );
        assert!(bindings.tx(Placeholder::Subject).is_err());
    }
}
