// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Workflow control patterns, triggers, and pattern occurrences.
//!
//! Occurrences are derived once from the graph's control annotations. Each
//! tick then filters them by trigger applicability against live token state.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ident::NodeId;
use crate::store::TripleStore;
use crate::workflow::{CancelTarget, JoinType, MiCardinality, MiSync, SplitType, WorkflowGraph};

/// Workflow control patterns the kernel executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// WCP19.
    CancelTask,
    /// WCP25.
    CancelRegion,
    /// WCP20.
    CancelCase,
    /// WCP3.
    Synchronization,
    /// WCP5.
    SimpleMerge,
    /// WCP7.
    StructuredSynchronizingMerge,
    /// WCP9.
    StructuredDiscriminator,
    /// WCP28.
    BlockingDiscriminator,
    /// WCP30.
    StructuredPartialJoin,
    /// WCP13.
    MiDesignTime,
    /// WCP14.
    MiRuntime,
    /// WCP12.
    MiWithoutSync,
    /// WCP34.
    StaticPartialJoinMi,
    /// WCP1.
    Sequence,
    /// WCP2.
    ParallelSplit,
    /// WCP4.
    ExclusiveChoice,
    /// WCP6.
    MultiChoice,
}

impl PatternKind {
    /// Canonical WCP number.
    #[must_use]
    pub const fn wcp(self) -> u8 {
        match self {
            Self::Sequence => 1,
            Self::ParallelSplit => 2,
            Self::Synchronization => 3,
            Self::ExclusiveChoice => 4,
            Self::SimpleMerge => 5,
            Self::MultiChoice => 6,
            Self::StructuredSynchronizingMerge => 7,
            Self::StructuredDiscriminator => 9,
            Self::MiWithoutSync => 12,
            Self::MiDesignTime => 13,
            Self::MiRuntime => 14,
            Self::CancelTask => 19,
            Self::CancelCase => 20,
            Self::CancelRegion => 25,
            Self::BlockingDiscriminator => 28,
            Self::StructuredPartialJoin => 30,
            Self::StaticPartialJoinMi => 34,
        }
    }

    /// Stable snake_case label (catalog key).
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CancelTask => "cancel_task",
            Self::CancelRegion => "cancel_region",
            Self::CancelCase => "cancel_case",
            Self::Synchronization => "synchronization",
            Self::SimpleMerge => "simple_merge",
            Self::StructuredSynchronizingMerge => "structured_synchronizing_merge",
            Self::StructuredDiscriminator => "structured_discriminator",
            Self::BlockingDiscriminator => "blocking_discriminator",
            Self::StructuredPartialJoin => "structured_partial_join",
            Self::MiDesignTime => "mi_design_time",
            Self::MiRuntime => "mi_runtime",
            Self::MiWithoutSync => "mi_without_sync",
            Self::StaticPartialJoinMi => "static_partial_join_mi",
            Self::Sequence => "sequence",
            Self::ParallelSplit => "parallel_split",
            Self::ExclusiveChoice => "exclusive_choice",
            Self::MultiChoice => "multi_choice",
        }
    }

    /// True for the cancellation family, which runs first at a node.
    #[must_use]
    pub const fn is_cancellation(self) -> bool {
        matches!(self, Self::CancelTask | Self::CancelRegion | Self::CancelCase)
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (WCP{})", self.label(), self.wcp())
    }
}

/// State condition under which a pattern occurrence is applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The node holds its own token and no cancellation is pending.
    TokenPresent,
    /// At least one branch token waits at the node.
    BranchArrival,
    /// The node has live instance children.
    InstancesPending,
    /// A cancellation request targets a node that holds a token.
    CancelRequested,
}

impl Trigger {
    /// Stable snake_case label (catalog key).
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::TokenPresent => "token_present",
            Self::BranchArrival => "branch_arrival",
            Self::InstancesPending => "instances_pending",
            Self::CancelRequested => "cancel_requested",
        }
    }

    /// Evaluates the trigger against live state.
    #[must_use]
    pub fn holds(self, node: &NodeId, store: &TripleStore) -> bool {
        match self {
            Self::TokenPresent => store.has_token(node) && !store.cancel_requested(node),
            Self::BranchArrival => store.has_branch_tokens(node),
            Self::InstancesPending => store.has_instances(node),
            Self::CancelRequested => store.cancel_requested(node) && store.holds_token(node),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A (node, pattern, trigger) rule instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Occurrence {
    /// Acting node.
    pub node: NodeId,
    /// Pattern applied at the node.
    pub pattern: PatternKind,
    /// Condition that makes it applicable.
    pub trigger: Trigger,
}

impl Occurrence {
    /// True when the occurrence may fire against `store`.
    #[must_use]
    pub fn is_applicable(&self, store: &TripleStore) -> bool {
        self.trigger.holds(&self.node, store)
    }
}

/// Derives every pattern occurrence of `graph`, sorted by node identity and
/// then pattern order (cancellation first).
#[must_use]
pub fn derive_occurrences(graph: &WorkflowGraph) -> Vec<Occurrence> {
    let mut out = Vec::new();
    for node in graph.nodes() {
        let mut push = |pattern, trigger| {
            out.push(Occurrence {
                node: node.id.clone(),
                pattern,
                trigger,
            });
        };
        push(PatternKind::CancelTask, Trigger::CancelRequested);
        match &node.cancels {
            Some(CancelTarget::Region(_)) => push(PatternKind::CancelRegion, Trigger::TokenPresent),
            Some(CancelTarget::Case) => push(PatternKind::CancelCase, Trigger::TokenPresent),
            None => {}
        }
        let join = match node.join {
            JoinType::None => None,
            JoinType::And => Some(PatternKind::Synchronization),
            JoinType::Xor => Some(PatternKind::SimpleMerge),
            JoinType::Or => Some(PatternKind::StructuredSynchronizingMerge),
            JoinType::Discriminator => Some(PatternKind::StructuredDiscriminator),
            JoinType::BlockingDiscriminator => Some(PatternKind::BlockingDiscriminator),
            JoinType::Partial(_) => Some(PatternKind::StructuredPartialJoin),
        };
        if let Some(pattern) = join {
            push(pattern, Trigger::BranchArrival);
        }
        if let Some(mi) = &node.mi {
            let spawn = match (&mi.cardinality, mi.sync) {
                (_, MiSync::None) => PatternKind::MiWithoutSync,
                (MiCardinality::Static(_), _) => PatternKind::MiDesignTime,
                (MiCardinality::Dynamic { .. }, _) => PatternKind::MiRuntime,
            };
            push(spawn, Trigger::TokenPresent);
            match mi.sync {
                MiSync::None => {}
                MiSync::All => push(spawn, Trigger::InstancesPending),
                MiSync::Quorum(_) => {
                    push(PatternKind::StaticPartialJoinMi, Trigger::InstancesPending);
                }
            }
        } else if graph.outgoing(&node.id).next().is_some() {
            let split = match node.split {
                SplitType::None => PatternKind::Sequence,
                SplitType::And => PatternKind::ParallelSplit,
                SplitType::Xor => PatternKind::ExclusiveChoice,
                SplitType::Or => PatternKind::MultiChoice,
            };
            push(split, Trigger::TokenPresent);
        }
    }
    out.sort();
    out
}
