// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

// Tracing helpers for the tick controller. The kernel never installs a
// subscriber; these only emit events.

use tracing::{debug, info, warn};

use crate::ident::Hash;
use crate::pattern::Occurrence;
use crate::provenance::{RuleFault, TxError};
use crate::receipt::TickReceipt;
use crate::tx::TxId;
use crate::verb::VerbKind;

/// First eight bytes of `h` as lowercase hex.
#[inline]
pub(crate) fn short_id(h: &Hash) -> String {
    let mut short = [0u8; 8];
    short.copy_from_slice(&h[0..8]);
    hex::encode(short)
}

pub(crate) fn rule_applied(
    tx: TxId,
    occurrence: &Occurrence,
    verb: VerbKind,
    added: usize,
    removed: usize,
) {
    debug!(
        tx = tx.value(),
        node = %occurrence.node,
        pattern = occurrence.pattern.label(),
        verb = verb.label(),
        added,
        removed,
        "rule applied"
    );
}

pub(crate) fn rule_rejected(tx: TxId, occurrence: &Occurrence, err: &TxError) {
    warn!(
        tx = tx.value(),
        node = %occurrence.node,
        pattern = occurrence.pattern.label(),
        error = %err,
        "rule rejected"
    );
}

pub(crate) fn rule_failed(tx: TxId, occurrence: &Occurrence, fault: &RuleFault) {
    warn!(
        tx = tx.value(),
        node = %occurrence.node,
        pattern = occurrence.pattern.label(),
        trigger = occurrence.trigger.label(),
        error = %fault,
        "rule failed"
    );
}

pub(crate) fn tick_completed(receipt: &TickReceipt) {
    debug!(
        tick = receipt.tick_number(),
        rules_applied = receipt.rules_applied(),
        delta = receipt.delta(),
        state_root = %short_id(&receipt.state_root()),
        digest = %short_id(&receipt.digest()),
        "tick completed"
    );
}

pub(crate) fn converged(receipt: &TickReceipt) {
    info!(
        tick = receipt.tick_number(),
        state_root = %short_id(&receipt.state_root()),
        "converged"
    );
}

pub(crate) fn budget_exhausted(ticks: u64) {
    info!(ticks, "tick budget exhausted without convergence");
}
