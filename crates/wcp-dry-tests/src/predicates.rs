// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Recording guard evaluator.

use std::sync::{Arc, Mutex};

use wcp_core::{
    Flow, FlowId, PrecomputedPredicates, PredicateError, PredicateEvaluator, TransactionContext,
};

/// Delegates to an inner evaluator and records every flow it was asked about.
///
/// Clones share the same log, so a test can keep one handle and move the
/// other into the engine.
#[derive(Clone)]
pub struct RecordingEvaluator<E = PrecomputedPredicates> {
    inner: Arc<E>,
    seen: Arc<Mutex<Vec<FlowId>>>,
}

impl<E> RecordingEvaluator<E> {
    /// Wraps `inner`.
    pub fn new(inner: E) -> Self {
        Self {
            inner: Arc::new(inner),
            seen: Arc::default(),
        }
    }

    /// Flows evaluated so far, in call order.
    pub fn seen(&self) -> Vec<FlowId> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of evaluations so far.
    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<E: PredicateEvaluator> PredicateEvaluator for RecordingEvaluator<E> {
    fn evaluate(&self, flow: &Flow, ctx: &TransactionContext<'_>) -> Result<bool, PredicateError> {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(flow.id.clone());
        self.inner.evaluate(flow, ctx)
    }
}
