// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier and hashing utilities.
use std::fmt;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

/// Canonical 256-bit hash used for state roots, receipt digests, and rule ids.
pub type Hash = [u8; 32];

/// Strongly typed identifier for a task or condition node.
///
/// Node ids are the labels authored in the workflow document. Multiple-instance
/// children derive their ids from the base node via [`NodeId::instance`], so a
/// label containing `#` is reserved for generated instances.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Wraps a label as a node id.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Returns the label backing this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id of the `index`-th generated instance of this node (`base#index`).
    #[must_use]
    pub fn instance(&self, index: u32) -> Self {
        Self(format!("{}#{index}", self.0))
    }

    /// True when this id names a generated multiple-instance child.
    #[must_use]
    pub fn is_instance(&self) -> bool {
        self.0.contains('#')
    }

    /// True when the label collides with a generated id: an instance child
    /// or a case subject.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.is_instance() || self.0.starts_with(CASE_SUBJECT_PREFIX)
    }
}

const CASE_SUBJECT_PREFIX: &str = "case:";

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Identifier for a directed flow between two nodes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(String);

impl FlowId {
    /// Wraps a label as a flow id.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Default id for an unnamed flow: `from->to`.
    #[must_use]
    pub fn between(from: &NodeId, to: &NodeId) -> Self {
        Self(format!("{from}->{to}"))
    }

    /// Returns the label backing this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlowId {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Identifier for a cancellation region.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    /// Wraps a label as a region id.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Returns the label backing this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Identifier for one running case (workflow instance).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    /// Wraps a label as a case id.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Returns the label backing this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Store subject carrying case-level facts such as termination.
    #[must_use]
    pub fn subject(&self) -> NodeId {
        NodeId(format!("{CASE_SUBJECT_PREFIX}{}", self.0))
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaseId {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Produces a stable, domain‑separated rule identifier (prefix `b"rule:"`) using BLAKE3.
pub fn make_rule_id(pattern: &str, trigger: &str) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(b"rule:");
    hasher.update(&(pattern.len() as u64).to_le_bytes());
    hasher.update(pattern.as_bytes());
    hasher.update(trigger.as_bytes());
    hasher.finalize().into()
}
