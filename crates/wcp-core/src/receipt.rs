// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tick receipts: what every candidate rule did during one tick.
//!
//! A tick considers a deterministically ordered candidate set of occurrences
//! and applies each in its own transaction. The receipt records, in that
//! order, whether each candidate applied, did nothing, was rejected by the
//! double-fire guard, failed, or was skipped because the case had already
//! terminated.

use blake3::Hasher;
use serde::Serialize;

use crate::executor::NoOpReason;
use crate::ident::{Hash, NodeId};
use crate::pattern::{Occurrence, PatternKind, Trigger};
use crate::provenance::{RuleFault, TxError};
use crate::tx::TxId;
use crate::verb::VerbKind;

/// Per-candidate outcomes for a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReceipt {
    tick: u64,
    triples_before: usize,
    triples_after: usize,
    added: usize,
    removed: usize,
    entries: Vec<TickReceiptEntry>,
    state_root: Hash,
    digest: Hash,
}

impl TickReceipt {
    pub(crate) fn new(
        tick: u64,
        triples_before: usize,
        triples_after: usize,
        entries: Vec<TickReceiptEntry>,
        state_root: Hash,
    ) -> Self {
        let (added, removed) = entries
            .iter()
            .fold((0, 0), |(a, r), entry| match entry.disposition {
                TickReceiptDisposition::Applied { added, removed } => (a + added, r + removed),
                _ => (a, r),
            });
        let digest = compute_tick_receipt_digest(tick, &entries, &state_root);
        Self {
            tick,
            triples_before,
            triples_after,
            added,
            removed,
            entries,
            state_root,
            digest,
        }
    }

    /// Tick sequence number (1-based).
    #[must_use]
    pub fn tick_number(&self) -> u64 {
        self.tick
    }

    /// Number of candidates whose delta was applied.
    #[must_use]
    pub fn rules_applied(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.disposition, TickReceiptDisposition::Applied { .. }))
            .count()
    }

    /// Store size when the tick began.
    #[must_use]
    pub fn triples_before(&self) -> usize {
        self.triples_before
    }

    /// Store size when the tick ended.
    #[must_use]
    pub fn triples_after(&self) -> usize {
        self.triples_after
    }

    /// Net change in store size.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn delta(&self) -> i64 {
        self.triples_after as i64 - self.triples_before as i64
    }

    /// Triples added plus triples removed.
    #[must_use]
    pub fn churn(&self) -> usize {
        self.added + self.removed
    }

    /// Triples added across all applied entries.
    #[must_use]
    pub fn added(&self) -> usize {
        self.added
    }

    /// Triples removed across all applied entries.
    #[must_use]
    pub fn removed(&self) -> usize {
        self.removed
    }

    /// True for a fixed point: zero net delta and zero churn.
    ///
    /// This is stricter than `delta() == 0`. A tick that adds and removes the
    /// same number of triples, such as a token hand-off, has a zero delta but
    /// is not converged.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.delta() == 0 && self.churn() == 0
    }

    /// True when at least one candidate was rejected or failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.entries.iter().any(TickReceiptEntry::is_fault)
    }

    /// Entries in canonical candidate order.
    #[must_use]
    pub fn entries(&self) -> &[TickReceiptEntry] {
        &self.entries
    }

    /// Entries that were rejected or failed.
    pub fn faults(&self) -> impl Iterator<Item = &TickReceiptEntry> + '_ {
        self.entries.iter().filter(|e| e.is_fault())
    }

    /// Store state root after the tick.
    #[must_use]
    pub fn state_root(&self) -> Hash {
        self.state_root
    }

    /// Canonical digest of the receipt.
    ///
    /// Depends only on the receipt format version, the tick number, the
    /// ordered per-entry content and the state root. Transaction ids are left
    /// out so receipts compare equal across runs with different numbering.
    #[must_use]
    pub fn digest(&self) -> Hash {
        self.digest
    }

    /// Wire-level summary of the receipt.
    #[must_use]
    pub fn summary(&self) -> TickSummary {
        TickSummary {
            tick_number: self.tick,
            rules_applied: self.rules_applied(),
            triples_before: self.triples_before,
            triples_after: self.triples_after,
            delta: self.delta(),
            converged: self.converged(),
        }
    }
}

/// Serializable receipt summary handed to external consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// Tick sequence number.
    pub tick_number: u64,
    /// Candidates whose delta was applied.
    pub rules_applied: usize,
    /// Store size when the tick began.
    pub triples_before: usize,
    /// Store size when the tick ended.
    pub triples_after: usize,
    /// `triples_after - triples_before`.
    pub delta: i64,
    /// Whether the tick was a fixed point.
    pub converged: bool,
}

/// One candidate occurrence and its tick outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReceiptEntry {
    /// Transaction the candidate ran in. `None` when skipped.
    pub tx: Option<TxId>,
    /// Catalog rule id, once resolved.
    pub rule_id: Option<Hash>,
    /// Acting node.
    pub node: NodeId,
    /// Pattern applied.
    pub pattern: PatternKind,
    /// Trigger that selected the candidate.
    pub trigger: Trigger,
    /// Resolved verb, if resolution succeeded.
    pub verb: Option<VerbKind>,
    /// Outcome.
    pub disposition: TickReceiptDisposition,
}

impl TickReceiptEntry {
    pub(crate) fn skipped(occurrence: Occurrence) -> Self {
        Self {
            tx: None,
            rule_id: None,
            node: occurrence.node,
            pattern: occurrence.pattern,
            trigger: occurrence.trigger,
            verb: None,
            disposition: TickReceiptDisposition::Skipped(SkipReason::CaseTerminated),
        }
    }

    /// True for rejected and failed entries.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(
            self.disposition,
            TickReceiptDisposition::Rejected(_) | TickReceiptDisposition::Failed(_)
        )
    }

    /// True when the entry's delta was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self.disposition, TickReceiptDisposition::Applied { .. })
    }
}

/// Outcome of a tick candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReceiptDisposition {
    /// The delta was committed.
    Applied {
        /// Triples inserted.
        added: usize,
        /// Triples removed.
        removed: usize,
    },
    /// The verb produced nothing to apply.
    NoOp(NoOpReason),
    /// The double-fire guard rejected the delta. Nothing was applied.
    Rejected(TxError),
    /// Resolution or execution failed. Nothing was applied.
    Failed(RuleFault),
    /// The candidate was not attempted.
    Skipped(SkipReason),
}

/// Why a candidate was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// An earlier candidate in the same tick terminated the case.
    CaseTerminated,
}

fn compute_tick_receipt_digest(tick: u64, entries: &[TickReceiptEntry], state_root: &Hash) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(b"wcp-receipt:");
    // Receipt format version tag.
    hasher.update(&1u16.to_le_bytes());
    hasher.update(&tick.to_le_bytes());
    hasher.update(&(entries.len() as u64).to_le_bytes());
    for entry in entries {
        let node = entry.node.as_str();
        hasher.update(&(node.len() as u64).to_le_bytes());
        hasher.update(node.as_bytes());
        hasher.update(&[entry.pattern.wcp()]);
        hasher.update(entry.trigger.label().as_bytes());
        match &entry.disposition {
            TickReceiptDisposition::Applied { added, removed } => {
                hasher.update(&[1u8]);
                hasher.update(&(*added as u64).to_le_bytes());
                hasher.update(&(*removed as u64).to_le_bytes());
            }
            TickReceiptDisposition::NoOp(_) => {
                hasher.update(&[2u8]);
            }
            TickReceiptDisposition::Rejected(_) => {
                hasher.update(&[3u8]);
            }
            TickReceiptDisposition::Failed(_) => {
                hasher.update(&[4u8]);
            }
            TickReceiptDisposition::Skipped(_) => {
                hasher.update(&[5u8]);
            }
        }
    }
    hasher.update(state_root);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecError;
    use crate::triple::Triple;

    fn entry(node: &str, disposition: TickReceiptDisposition) -> TickReceiptEntry {
        TickReceiptEntry {
            tx: Some(TxId::from_raw(7)),
            rule_id: None,
            node: NodeId::from(node),
            pattern: PatternKind::Sequence,
            trigger: Trigger::TokenPresent,
            verb: Some(VerbKind::Copy),
            disposition,
        }
    }

    #[test]
    fn token_handoff_is_not_convergence() {
        let receipt = TickReceipt::new(
            1,
            4,
            4,
            vec![entry("a", TickReceiptDisposition::Applied { added: 2, removed: 2 })],
            [0u8; 32],
        );
        assert_eq!(receipt.delta(), 0);
        assert_eq!(receipt.rules_applied(), 1);
        assert_eq!(receipt.churn(), 4);
        assert!(!receipt.converged());
        assert_eq!(receipt.summary().delta, 0);
        assert!(!receipt.summary().converged);
    }

    #[test]
    fn digest_ignores_transaction_ids() {
        let a = entry("a", TickReceiptDisposition::NoOp(NoOpReason::EmptyTarget));
        let mut b = a.clone();
        b.tx = Some(TxId::from_raw(99));
        let ra = TickReceipt::new(3, 1, 1, vec![a], [5u8; 32]);
        let rb = TickReceipt::new(3, 1, 1, vec![b], [5u8; 32]);
        assert_eq!(ra.digest(), rb.digest());
        assert!(ra.converged());
    }

    #[test]
    fn digest_commits_to_state_root_and_tick() {
        let base = TickReceipt::new(1, 0, 0, Vec::new(), [0u8; 32]);
        assert_ne!(base.digest(), TickReceipt::new(2, 0, 0, Vec::new(), [0u8; 32]).digest());
        assert_ne!(base.digest(), TickReceipt::new(1, 0, 0, Vec::new(), [1u8; 32]).digest());
    }

    #[test]
    fn faults_make_the_receipt_partial() {
        let receipt = TickReceipt::new(
            1,
            2,
            3,
            vec![
                entry("a", TickReceiptDisposition::Applied { added: 1, removed: 0 }),
                entry(
                    "b",
                    TickReceiptDisposition::Rejected(TxError::DoubleFireGuard(Triple::token(
                        NodeId::from("b"),
                    ))),
                ),
                entry(
                    "c",
                    TickReceiptDisposition::Failed(RuleFault::Exec(ExecError::UnknownNode(
                        NodeId::from("c"),
                    ))),
                ),
            ],
            [0u8; 32],
        );
        assert!(receipt.is_partial());
        assert_eq!(receipt.faults().count(), 2);
        assert_eq!(receipt.churn(), 1);
    }
}
