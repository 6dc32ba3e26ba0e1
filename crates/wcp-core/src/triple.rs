// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed triples: the only unit of state the kernel reads or writes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ident::NodeId;

/// Status label written when a node receives a token.
pub const STATUS_ENABLED: &str = "Enabled";
/// Status label written when a node fires and forwards its token.
pub const STATUS_COMPLETED: &str = "Completed";
/// Status label written when a node is cancelled.
pub const STATUS_VOIDED: &str = "Voided";
/// Status label written when a multiple-instance node spawns its children.
pub const STATUS_SPAWNED: &str = "Spawned";
/// Status label reported for nodes with no status triple.
pub const STATUS_PENDING: &str = "Pending";
/// Case-level status written by case cancellation.
pub const STATUS_TERMINATED: &str = "Terminated";

/// Closed vocabulary of predicates.
///
/// Ordering follows declaration order and feeds the canonical store order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Node holds a control token.
    HasToken,
    /// A branch token waiting at a join, object names the sending node.
    BranchToken,
    /// Free-form lifecycle label.
    Status,
    /// Discriminator/partial-join latch.
    DiscriminatorFired,
    /// Branch absorbed by a latched join, object names the sending node.
    Absorbed,
    /// External cancellation request.
    CancelRequested,
    /// Instance child points at its base node.
    InstanceOf,
    /// Instance child ordinal.
    InstanceIndex,
    /// Item bound to an instance child, serialized as JSON.
    BoundItem,
    /// Transaction that last fired the node.
    FiredBy,
}

impl Predicate {
    /// Every predicate in canonical order.
    pub const ALL: [Self; 10] = [
        Self::HasToken,
        Self::BranchToken,
        Self::Status,
        Self::DiscriminatorFired,
        Self::Absorbed,
        Self::CancelRequested,
        Self::InstanceOf,
        Self::InstanceIndex,
        Self::BoundItem,
        Self::FiredBy,
    ];

    /// Predicates whose removal is guarded against double firing.
    #[must_use]
    pub const fn is_token(self) -> bool {
        matches!(self, Self::HasToken | Self::BranchToken)
    }

    /// Stable label used in hashes and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::HasToken => "hasToken",
            Self::BranchToken => "branchToken",
            Self::Status => "status",
            Self::DiscriminatorFired => "discriminatorFired",
            Self::Absorbed => "absorbed",
            Self::CancelRequested => "cancelRequested",
            Self::InstanceOf => "instanceOf",
            Self::InstanceIndex => "instanceIndex",
            Self::BoundItem => "boundItem",
            Self::FiredBy => "firedBy",
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Object position of a triple.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Term {
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Text literal (statuses).
    Text(String),
    /// Reference to another node.
    Node(NodeId),
    /// Serialized JSON value (bound items).
    Json(String),
}

impl Term {
    /// Returns the node reference, if this term is one.
    #[must_use]
    pub const fn as_node(&self) -> Option<&NodeId> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Returns the text literal, if this term is one.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub(crate) fn hash_into(&self, hasher: &mut blake3::Hasher) {
        match self {
            Self::Bool(b) => {
                hasher.update(&[0u8, u8::from(*b)]);
            }
            Self::Int(i) => {
                hasher.update(&[1u8]);
                hasher.update(&i.to_le_bytes());
            }
            Self::Text(s) => hash_tagged_str(hasher, 2, s),
            Self::Node(n) => hash_tagged_str(hasher, 3, n.as_str()),
            Self::Json(s) => hash_tagged_str(hasher, 4, s),
        }
    }
}

fn hash_tagged_str(hasher: &mut blake3::Hasher, tag: u8, s: &str) {
    hasher.update(&[tag]);
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

/// A (subject, predicate, object) fact.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    /// Node the fact is about.
    pub subject: NodeId,
    /// Relation.
    pub predicate: Predicate,
    /// Value.
    pub object: Term,
}

impl Triple {
    /// Builds a triple.
    #[must_use]
    pub const fn new(subject: NodeId, predicate: Predicate, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// `(node, hasToken, true)`.
    #[must_use]
    pub const fn token(node: NodeId) -> Self {
        Self::new(node, Predicate::HasToken, Term::Bool(true))
    }

    /// `(join, branchToken, from)`.
    #[must_use]
    pub const fn branch_token(join: NodeId, from: NodeId) -> Self {
        Self::new(join, Predicate::BranchToken, Term::Node(from))
    }

    /// `(node, status, label)`.
    #[must_use]
    pub fn status(node: NodeId, label: &str) -> Self {
        Self::new(node, Predicate::Status, Term::Text(label.to_owned()))
    }

    /// `(node, cancelRequested, true)`.
    #[must_use]
    pub const fn cancel_request(node: NodeId) -> Self {
        Self::new(node, Predicate::CancelRequested, Term::Bool(true))
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} ", self.subject, self.predicate)?;
        match &self.object {
            Term::Bool(b) => write!(f, "{b})"),
            Term::Int(i) => write!(f, "{i})"),
            Term::Text(s) | Term::Json(s) => write!(f, "{s:?})"),
            Term::Node(n) => write!(f, "<{n}>)"),
        }
    }
}
