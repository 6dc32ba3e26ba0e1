// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Verb kinds and their resolved, strongly typed configurations.
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ident::{CaseId, RegionId};
use crate::template::ExecutionTemplate;
use crate::workflow::InstanceBinding;

/// The four verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerbKind {
    /// Divergence.
    Copy,
    /// Convergence.
    Await,
    /// Guarded choice.
    Filter,
    /// Cancellation.
    Void,
}

impl VerbKind {
    /// Upper-case verb label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Copy => "COPY",
            Self::Await => "AWAIT",
            Self::Filter => "FILTER",
            Self::Void => "VOID",
        }
    }
}

impl fmt::Display for VerbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// COPY target policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cardinality {
    /// Structural successors.
    Topology,
    /// Fixed instance count.
    Static(u32),
    /// One instance per item of a payload list.
    Dynamic {
        /// Payload key (or JSON pointer) of the item list.
        items: String,
    },
}

/// AWAIT completion threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// Every incoming branch or instance.
    All,
    /// The first arrival.
    One,
    /// The first `n` arrivals.
    Count(u32),
    /// Every branch that can still arrive.
    Active,
}

/// What an AWAIT converges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwaitOver {
    /// Incoming branches.
    #[default]
    Branches,
    /// Instance children.
    Instances,
}

/// What happens to contributors left over after an AWAIT fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Leave them in place.
    #[default]
    Leave,
    /// Withdraw them in the firing transaction.
    CancelRemaining,
}

/// FILTER selection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// First true guard in ordering order (XOR).
    ExactlyOne,
    /// Every true guard (OR).
    OneOrMore,
}

/// VOID scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelScope {
    /// Only the acting node.
    Subject,
    /// Tokened members of the region.
    Region(RegionId),
    /// Every tokened node of the case, then the case itself.
    Case(CaseId),
}

/// Resolved COPY parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyConfig {
    /// Target policy.
    pub cardinality: Cardinality,
    /// What generated instances bind.
    pub binding: InstanceBinding,
    /// Template.
    pub template: Arc<ExecutionTemplate>,
}

/// Resolved AWAIT parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwaitConfig {
    /// Completion threshold.
    pub threshold: Threshold,
    /// Branches or instances.
    pub over: AwaitOver,
    /// Sets `discriminatorFired` on firing.
    pub latch: bool,
    /// Clears the latch once every branch has been absorbed.
    pub reset_on_fire: bool,
    /// Leftover handling.
    pub completion: Completion,
    /// Template.
    pub template: Arc<ExecutionTemplate>,
}

/// Resolved FILTER parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    /// Selection mode.
    pub selection: Selection,
    /// Template.
    pub template: Arc<ExecutionTemplate>,
}

/// Resolved VOID parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoidConfig {
    /// Scope.
    pub scope: CancelScope,
    /// Template.
    pub template: Arc<ExecutionTemplate>,
}

/// Fully parameterized verb, ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerbConfig {
    /// COPY.
    Copy(CopyConfig),
    /// AWAIT.
    Await(AwaitConfig),
    /// FILTER.
    Filter(FilterConfig),
    /// VOID.
    Void(VoidConfig),
}

impl VerbConfig {
    /// Verb kind.
    #[must_use]
    pub const fn kind(&self) -> VerbKind {
        match self {
            Self::Copy(_) => VerbKind::Copy,
            Self::Await(_) => VerbKind::Await,
            Self::Filter(_) => VerbKind::Filter,
            Self::Void(_) => VerbKind::Void,
        }
    }

    /// Template the verb interprets.
    #[must_use]
    pub fn template(&self) -> &ExecutionTemplate {
        match self {
            Self::Copy(c) => &c.template,
            Self::Await(c) => &c.template,
            Self::Filter(c) => &c.template,
            Self::Void(c) => &c.template,
        }
    }
}
