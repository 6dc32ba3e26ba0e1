// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Flow guard evaluation seam.
//!
//! The kernel never interprets guard expressions itself. FILTER hands each
//! candidate flow to a [`PredicateEvaluator`] and acts on the boolean.
use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::ident::FlowId;
use crate::tx::TransactionContext;
use crate::workflow::Flow;

/// Guard evaluation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateError {
    /// No outcome is known for the guard.
    #[error("flow {flow}: no value for guard `{predicate}`")]
    Unresolved {
        /// Flow.
        flow: FlowId,
        /// Guard text.
        predicate: String,
    },
    /// The guard resolved to a non-boolean value.
    #[error("flow {flow}: guard `{predicate}` is not boolean")]
    NotBoolean {
        /// Flow.
        flow: FlowId,
        /// Guard text.
        predicate: String,
    },
}

/// Decides whether a guarded flow is taken.
pub trait PredicateEvaluator {
    /// Evaluates the guard of `flow` within `ctx`.
    fn evaluate(&self, flow: &Flow, ctx: &TransactionContext<'_>) -> Result<bool, PredicateError>;
}

impl<F> PredicateEvaluator for F
where
    F: Fn(&Flow, &TransactionContext<'_>) -> Result<bool, PredicateError>,
{
    fn evaluate(&self, flow: &Flow, ctx: &TransactionContext<'_>) -> Result<bool, PredicateError> {
        self(flow, ctx)
    }
}

/// Reads guards as boolean payload keys.
///
/// `approved` is taken when `data.approved == true`; `!approved` negates it.
/// Keys starting with `/` are JSON pointers. Unguarded flows are always taken.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadFlagEvaluator;

impl PredicateEvaluator for PayloadFlagEvaluator {
    fn evaluate(&self, flow: &Flow, ctx: &TransactionContext<'_>) -> Result<bool, PredicateError> {
        let Some(guard) = flow.predicate.as_deref() else {
            return Ok(true);
        };
        let (negated, key) = match guard.trim().strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, guard.trim()),
        };
        match ctx.lookup(key) {
            Some(Value::Bool(b)) => Ok(*b != negated),
            Some(_) => Err(PredicateError::NotBoolean {
                flow: flow.id.clone(),
                predicate: guard.to_owned(),
            }),
            None => Err(PredicateError::Unresolved {
                flow: flow.id.clone(),
                predicate: guard.to_owned(),
            }),
        }
    }
}

/// Caller-supplied outcome per flow.
///
/// Unguarded flows without an explicit outcome are taken. Guarded flows
/// without one fall back to [`PrecomputedPredicates::with_fallback`] or fail.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedPredicates {
    outcomes: BTreeMap<FlowId, bool>,
    fallback: Option<bool>,
}

impl PrecomputedPredicates {
    /// No outcomes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an outcome.
    pub fn with(mut self, flow: impl Into<FlowId>, outcome: bool) -> Self {
        self.outcomes.insert(flow.into(), outcome);
        self
    }

    /// Sets or replaces an outcome.
    pub fn set(&mut self, flow: impl Into<FlowId>, outcome: bool) {
        self.outcomes.insert(flow.into(), outcome);
    }

    /// Outcome for guarded flows with no explicit entry.
    pub fn with_fallback(mut self, outcome: bool) -> Self {
        self.fallback = Some(outcome);
        self
    }
}

impl PredicateEvaluator for PrecomputedPredicates {
    fn evaluate(&self, flow: &Flow, _ctx: &TransactionContext<'_>) -> Result<bool, PredicateError> {
        if let Some(outcome) = self.outcomes.get(&flow.id) {
            return Ok(*outcome);
        }
        match (&flow.predicate, self.fallback) {
            (None, _) => Ok(true),
            (Some(_), Some(fallback)) => Ok(fallback),
            (Some(predicate), None) => Err(PredicateError::Unresolved {
                flow: flow.id.clone(),
                predicate: predicate.clone(),
            }),
        }
    }
}
