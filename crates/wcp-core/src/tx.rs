// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Transaction identifiers and the context handed to predicate evaluation.

use serde_json::Value;

/// Thin wrapper around a transaction identifier.
///
/// The engine issues monotonically increasing identifiers, one per rule
/// application. External callers may construct `TxId` values for replay
/// tooling using [`TxId::from_raw`].
///
/// # Invariants
/// - Zero (`TxId(0)`) is reserved as invalid. The engine never issues it.
/// - The counter wraps at `u64::MAX` and resumes at `1`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct TxId(u64);

impl TxId {
    /// Constructs a `TxId` from a raw `u64` value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for TxId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only view of the transaction a rule runs in.
///
/// Carries the case payload so predicates and dynamic cardinalities can read
/// case data without touching the triple store.
#[derive(Debug, Clone, Copy)]
pub struct TransactionContext<'a> {
    tx: TxId,
    data: &'a Value,
}

impl<'a> TransactionContext<'a> {
    /// Builds a context for `tx` over the case payload `data`.
    #[must_use]
    pub const fn new(tx: TxId, data: &'a Value) -> Self {
        Self { tx, data }
    }

    /// Transaction the rule executes in.
    #[must_use]
    pub const fn tx(&self) -> TxId {
        self.tx
    }

    /// Case payload.
    #[must_use]
    pub const fn data(&self) -> &'a Value {
        self.data
    }

    /// Looks up a payload value by key.
    ///
    /// Keys starting with `/` are JSON pointers; anything else is a top-level
    /// object key.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&'a Value> {
        if key.starts_with('/') {
            self.data.pointer(key)
        } else {
            self.data.get(key)
        }
    }
}
