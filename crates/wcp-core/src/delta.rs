// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Quad deltas: canonical additions/removals produced by one rule application.
//!
//! [`DeltaBuilder`] collects effects while a mutation template is interpreted,
//! then [`DeltaBuilder::finish`] freezes them into a [`QuadDelta`] in canonical
//! triple order.

use std::collections::BTreeSet;

use crate::ident::NodeId;
use crate::store::TripleStore;
use crate::triple::{Predicate, Term, Triple};

/// Additions and removals to apply atomically.
///
/// # Invariants
/// - Both sides are sorted and free of duplicates.
/// - No triple appears on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuadDelta {
    additions: Vec<Triple>,
    removals: Vec<Triple>,
}

impl QuadDelta {
    /// Delta that changes nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Normalizes raw additions and removals into a delta.
    ///
    /// A triple named on both sides cancels out.
    #[must_use]
    pub fn new(
        additions: impl IntoIterator<Item = Triple>,
        removals: impl IntoIterator<Item = Triple>,
    ) -> Self {
        let mut builder = DeltaBuilder::new();
        for triple in removals {
            builder.remove(triple);
        }
        for triple in additions {
            builder.add(triple);
        }
        builder.finish()
    }

    /// Triples to insert, in canonical order.
    #[must_use]
    pub fn additions(&self) -> &[Triple] {
        &self.additions
    }

    /// Triples to remove, in canonical order.
    #[must_use]
    pub fn removals(&self) -> &[Triple] {
        &self.removals
    }

    /// True when the delta changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    /// Token triples added minus token triples removed.
    #[must_use]
    pub fn token_balance(&self) -> i64 {
        let count = |side: &[Triple]| {
            let tokens = side.iter().filter(|t| t.predicate.is_token()).count();
            i64::try_from(tokens).unwrap_or(i64::MAX)
        };
        count(&self.additions) - count(&self.removals)
    }
}

/// Accumulates effects for a single rule application.
#[derive(Debug, Default)]
pub struct DeltaBuilder {
    additions: BTreeSet<Triple>,
    removals: BTreeSet<Triple>,
}

impl DeltaBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an insertion. Cancels a pending removal of the same triple.
    pub fn add(&mut self, triple: Triple) {
        if !self.removals.remove(&triple) {
            self.additions.insert(triple);
        }
    }

    /// Schedules a removal. Cancels a pending insertion of the same triple.
    pub fn remove(&mut self, triple: Triple) {
        if !self.additions.remove(&triple) {
            self.removals.insert(triple);
        }
    }

    /// Replaces every value of `(subject, predicate)` with `object`.
    ///
    /// Considers both the committed store and values added earlier in this
    /// builder, so repeated replacements keep only the last one.
    pub fn replace(
        &mut self,
        store: &TripleStore,
        subject: &NodeId,
        predicate: Predicate,
        object: Term,
    ) {
        self.clear(store, subject, predicate);
        self.add(Triple::new(subject.clone(), predicate, object));
    }

    /// Removes every value of `(subject, predicate)`.
    pub fn clear(&mut self, store: &TripleStore, subject: &NodeId, predicate: Predicate) {
        let pending: Vec<Triple> = self
            .additions
            .iter()
            .filter(|t| t.subject == *subject && t.predicate == predicate)
            .cloned()
            .collect();
        for triple in pending {
            self.additions.remove(&triple);
        }
        for object in store.objects(subject, predicate) {
            self.remove(Triple::new(subject.clone(), predicate, object.clone()));
        }
    }

    /// Removes every stored triple about `subject`.
    pub fn purge(&mut self, store: &TripleStore, subject: &NodeId) {
        for predicate in Predicate::ALL {
            self.clear(store, subject, predicate);
        }
    }

    /// True when nothing has been scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    /// Freezes the builder into canonical order.
    #[must_use]
    pub fn finish(self) -> QuadDelta {
        QuadDelta {
            additions: self.additions.into_iter().collect(),
            removals: self.removals.into_iter().collect(),
        }
    }
}
