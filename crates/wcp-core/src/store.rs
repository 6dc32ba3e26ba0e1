// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonically ordered triple store.
//!
//! The store is a set: inserting a present triple or removing an absent one is
//! a no-op. Iteration always follows `(subject, predicate, object)` order so
//! that hashing and target queries are deterministic.
use std::collections::{BTreeMap, BTreeSet};

use blake3::Hasher;

use crate::ident::{Hash, NodeId};
use crate::triple::{Predicate, Term, Triple, STATUS_TERMINATED};

/// In-memory typed triple store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripleStore {
    index: BTreeMap<(NodeId, Predicate), BTreeSet<Term>>,
    /// Reverse index: base node → live instance children.
    instances: BTreeMap<NodeId, BTreeSet<NodeId>>,
    len: usize,
}

impl TripleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triples currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the store holds no triples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Membership test.
    #[must_use]
    pub fn contains(&self, triple: &Triple) -> bool {
        self.index
            .get(&(triple.subject.clone(), triple.predicate))
            .is_some_and(|objects| objects.contains(&triple.object))
    }

    /// Objects stored under `(subject, predicate)`, in canonical order.
    pub fn objects(
        &self,
        subject: &NodeId,
        predicate: Predicate,
    ) -> impl Iterator<Item = &Term> + '_ {
        self.index
            .get(&(subject.clone(), predicate))
            .into_iter()
            .flatten()
    }

    /// Every triple about `subject`.
    #[must_use]
    pub fn triples_of(&self, subject: &NodeId) -> Vec<Triple> {
        Predicate::ALL
            .iter()
            .flat_map(|p| {
                self.objects(subject, *p)
                    .map(|o| Triple::new(subject.clone(), *p, o.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Iterates all triples in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, Predicate, &Term)> + '_ {
        self.index
            .iter()
            .flat_map(|((s, p), objects)| objects.iter().map(move |o| (s, *p, o)))
    }

    /// True when `node` holds a control token.
    #[must_use]
    pub fn has_token(&self, node: &NodeId) -> bool {
        self.contains(&Triple::token(node.clone()))
    }

    /// True when at least one branch token waits at `join`.
    #[must_use]
    pub fn has_branch_tokens(&self, join: &NodeId) -> bool {
        self.objects(join, Predicate::BranchToken).next().is_some()
    }

    /// Senders of the branch tokens waiting at `join`, ordered by node id.
    #[must_use]
    pub fn branch_sources(&self, join: &NodeId) -> Vec<NodeId> {
        self.objects(join, Predicate::BranchToken)
            .filter_map(Term::as_node)
            .cloned()
            .collect()
    }

    /// Branches already absorbed by a latched join.
    #[must_use]
    pub fn absorbed(&self, join: &NodeId) -> BTreeSet<NodeId> {
        self.objects(join, Predicate::Absorbed)
            .filter_map(Term::as_node)
            .cloned()
            .collect()
    }

    /// True when the join's latch is set.
    #[must_use]
    pub fn is_latched(&self, join: &NodeId) -> bool {
        self.objects(join, Predicate::DiscriminatorFired)
            .any(|o| *o == Term::Bool(true))
    }

    /// True when an external cancellation request targets `node`.
    #[must_use]
    pub fn cancel_requested(&self, node: &NodeId) -> bool {
        self.contains(&Triple::cancel_request(node.clone()))
    }

    /// Current status label, if any.
    #[must_use]
    pub fn status(&self, node: &NodeId) -> Option<&str> {
        self.objects(node, Predicate::Status).find_map(Term::as_text)
    }

    /// Live instance children of a multiple-instance base node.
    #[must_use]
    pub fn instances_of(&self, base: &NodeId) -> Vec<NodeId> {
        self.instances
            .get(base)
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True when `base` has live instance children.
    #[must_use]
    pub fn has_instances(&self, base: &NodeId) -> bool {
        self.instances.get(base).is_some_and(|c| !c.is_empty())
    }

    /// True when `node` holds any token: its own, a waiting branch token, or
    /// a live instance child.
    #[must_use]
    pub fn holds_token(&self, node: &NodeId) -> bool {
        self.has_token(node) || self.has_branch_tokens(node) || self.has_instances(node)
    }

    /// True when the case subject carries the terminated status.
    #[must_use]
    pub fn is_terminated(&self, case_subject: &NodeId) -> bool {
        self.status(case_subject) == Some(STATUS_TERMINATED)
    }

    /// Inserts a triple; returns `false` when it was already present.
    pub(crate) fn insert(&mut self, triple: Triple) -> bool {
        let Triple {
            subject,
            predicate,
            object,
        } = triple;
        if predicate == Predicate::InstanceOf {
            if let Term::Node(base) = &object {
                self.instances
                    .entry(base.clone())
                    .or_default()
                    .insert(subject.clone());
            }
        }
        let inserted = self.index.entry((subject, predicate)).or_default().insert(object);
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Removes a triple; returns `false` when it was absent.
    pub(crate) fn remove(&mut self, triple: &Triple) -> bool {
        let key = (triple.subject.clone(), triple.predicate);
        let Some(objects) = self.index.get_mut(&key) else {
            return false;
        };
        if !objects.remove(&triple.object) {
            return false;
        }
        if objects.is_empty() {
            self.index.remove(&key);
        }
        if triple.predicate == Predicate::InstanceOf {
            if let Term::Node(base) = &triple.object {
                if let Some(children) = self.instances.get_mut(base) {
                    children.remove(&triple.subject);
                    if children.is_empty() {
                        self.instances.remove(base);
                    }
                }
            }
        }
        self.len -= 1;
        true
    }

    /// Canonical BLAKE3 digest over every triple in store order.
    #[must_use]
    pub fn state_root(&self) -> Hash {
        let mut hasher = Hasher::new();
        hasher.update(b"wcp-store:");
        // Store format version tag.
        hasher.update(&1u16.to_le_bytes());
        hasher.update(&(self.len as u64).to_le_bytes());
        for (subject, predicate, object) in self.iter() {
            hasher.update(&(subject.as_str().len() as u64).to_le_bytes());
            hasher.update(subject.as_str().as_bytes());
            hasher.update(predicate.label().as_bytes());
            object.hash_into(&mut hasher);
        }
        hasher.finalize().into()
    }
}
