// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transaction application and the append-only provenance log.
//!
//! A transaction either applies its whole delta or nothing. The double-fire
//! guard runs before any write: every token removal must name a token that is
//! still present, otherwise the delta was computed against stale state.
use thiserror::Error;

use crate::delta::QuadDelta;
use crate::executor::ExecError;
use crate::ident::NodeId;
use crate::pattern::Occurrence;
use crate::resolver::ResolveError;
use crate::store::TripleStore;
use crate::triple::Triple;
use crate::tx::TxId;

/// Transaction-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// A token removal targets a token that is no longer present.
    #[error("double-fire guard: {0} is no longer present")]
    DoubleFireGuard(Triple),
    /// The transaction is not open.
    #[error("transaction {0} is not open")]
    UnknownTx(TxId),
}

/// Rule application failures surfaced on receipts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleFault {
    /// The occurrence could not be resolved to a verb.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The verb failed while computing its delta.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Counts of triples a committed transaction changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Applied {
    /// Triples inserted.
    pub added: usize,
    /// Triples removed.
    pub removed: usize,
}

/// Applies `delta` to `store` atomically.
///
/// Removals are applied before additions so a delta may replace a triple in
/// place. Absent non-token removals are ignored; absent token removals reject
/// the whole delta.
pub(crate) fn apply(store: &mut TripleStore, delta: &QuadDelta) -> Result<Applied, TxError> {
    if let Some(stale) = delta
        .removals()
        .iter()
        .find(|t| t.predicate.is_token() && !store.contains(t))
    {
        return Err(TxError::DoubleFireGuard(stale.clone()));
    }
    let mut applied = Applied::default();
    for triple in delta.removals() {
        if store.remove(triple) {
            applied.removed += 1;
        }
    }
    for triple in delta.additions() {
        if store.insert(triple.clone()) {
            applied.added += 1;
        }
    }
    Ok(applied)
}

/// What opened a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOrigin {
    /// Initial token seeding at engine construction.
    Genesis,
    /// A rule application during a tick.
    Rule(Occurrence),
    /// A collaborator request through the engine's injection surface.
    Injection,
    /// A cancellation request for the named node.
    CancelRequest(NodeId),
    /// An explicit discriminator reset for the named join.
    Reset(NodeId),
}

/// How a transaction ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    /// The delta was applied.
    Committed,
    /// The rule computed nothing to apply.
    NoOp,
    /// The double-fire guard rejected the delta.
    Rejected(TxError),
    /// The rule failed before producing a delta.
    Failed(RuleFault),
}

impl TxOutcome {
    /// True when the transaction changed state.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }
}

/// Immutable audit entry for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Transaction id.
    pub tx: TxId,
    /// Tick the transaction ran in. Transactions between ticks carry the last
    /// completed tick, so genesis is 0.
    pub tick: u64,
    /// What opened it.
    pub origin: TxOrigin,
    /// How it ended.
    pub outcome: TxOutcome,
    /// Triples added. Empty unless committed.
    pub additions: Vec<Triple>,
    /// Triples removed. Empty unless committed.
    pub removals: Vec<Triple>,
}

/// Append-only transaction log.
#[derive(Debug, Clone, Default)]
pub struct ProvenanceLog {
    records: Vec<TransactionRecord>,
}

impl ProvenanceLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, record: TransactionRecord) {
        self.records.push(record);
    }

    /// All records in transaction order.
    #[must_use]
    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record for `tx`, if any.
    #[must_use]
    pub fn get(&self, tx: TxId) -> Option<&TransactionRecord> {
        self.records.iter().find(|r| r.tx == tx)
    }

    /// Records written during `tick`.
    pub fn for_tick(&self, tick: u64) -> impl Iterator<Item = &TransactionRecord> + '_ {
        self.records.iter().filter(move |r| r.tick == tick)
    }

    /// Most recent record.
    #[must_use]
    pub fn last(&self) -> Option<&TransactionRecord> {
        self.records.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triple::{Predicate, STATUS_ENABLED};

    fn seeded() -> TripleStore {
        let mut store = TripleStore::new();
        store.insert(Triple::token(NodeId::from("a")));
        store.insert(Triple::status(NodeId::from("a"), STATUS_ENABLED));
        store
    }

    #[test]
    fn apply_moves_a_token() {
        let mut store = seeded();
        let delta = QuadDelta::new(
            [Triple::token(NodeId::from("b"))],
            [Triple::token(NodeId::from("a"))],
        );
        let applied = apply(&mut store, &delta).expect("apply");
        assert_eq!(applied, Applied { added: 1, removed: 1 });
        assert!(store.has_token(&NodeId::from("b")));
        assert!(!store.has_token(&NodeId::from("a")));
    }

    #[test]
    fn stale_token_removal_rejects_the_whole_delta() {
        let mut store = seeded();
        let before = store.state_root();
        let delta = QuadDelta::new(
            [Triple::token(NodeId::from("c"))],
            [
                Triple::token(NodeId::from("a")),
                Triple::token(NodeId::from("b")),
            ],
        );
        let err = apply(&mut store, &delta).expect_err("guard");
        assert_eq!(err, TxError::DoubleFireGuard(Triple::token(NodeId::from("b"))));
        assert_eq!(store.state_root(), before);
    }

    #[test]
    fn absent_status_removal_is_tolerated() {
        let mut store = seeded();
        let delta = QuadDelta::new(
            [],
            [Triple::new(
                NodeId::from("a"),
                Predicate::DiscriminatorFired,
                crate::triple::Term::Bool(true),
            )],
        );
        let applied = apply(&mut store, &delta).expect("apply");
        assert_eq!(applied, Applied::default());
    }

    #[test]
    fn log_filters_by_tick() {
        let mut log = ProvenanceLog::new();
        for (raw, tick) in [(1, 0), (2, 1), (3, 1), (4, 2)] {
            log.append(TransactionRecord {
                tx: TxId::from_raw(raw),
                tick,
                origin: TxOrigin::Injection,
                outcome: TxOutcome::NoOp,
                additions: Vec::new(),
                removals: Vec::new(),
            });
        }
        assert_eq!(log.for_tick(1).count(), 2);
        assert_eq!(log.get(TxId::from_raw(4)).map(|r| r.tick), Some(2));
        assert_eq!(log.last().map(|r| r.tx), Some(TxId::from_raw(4)));
    }
}
