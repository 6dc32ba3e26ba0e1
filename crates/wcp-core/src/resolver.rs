// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Verb resolver: merges a catalog entry with a node's structural parameters.
//!
//! Resolution never reads token state. The same (pattern, node, trigger)
//! always resolves to the same [`VerbConfig`].
use std::sync::Arc;

use thiserror::Error;

use crate::catalog::{CardinalityMode, RuleEntry, RuleStore, ScopeMode, ThresholdMode, VerbSpec};
use crate::ident::NodeId;
use crate::pattern::{PatternKind, Trigger};
use crate::verb::{
    AwaitConfig, AwaitOver, CancelScope, Cardinality, CopyConfig, FilterConfig, Threshold,
    VerbConfig, VoidConfig,
};
use crate::workflow::{CancelTarget, JoinType, MiCardinality, MiSync, NodeSpec, WorkflowGraph};

/// Resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The catalog has no entry for the pair.
    #[error("no verb mapping for {pattern} on trigger {trigger}")]
    MissingMapping {
        /// Pattern.
        pattern: PatternKind,
        /// Trigger.
        trigger: Trigger,
    },
    /// The entry needs a node parameter the node does not declare.
    #[error("{pattern} at {node}: node does not declare `{param}`")]
    MissingParameter {
        /// Pattern.
        pattern: PatternKind,
        /// Node.
        node: NodeId,
        /// Parameter.
        param: &'static str,
    },
}

/// Looks up rules and materializes verb configurations.
#[derive(Debug, Clone)]
pub struct VerbResolver {
    rules: Arc<RuleStore>,
}

impl VerbResolver {
    /// Resolver over `rules`.
    #[must_use]
    pub fn new(rules: Arc<RuleStore>) -> Self {
        Self { rules }
    }

    /// Underlying catalog.
    #[must_use]
    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    /// Catalog entry for `(pattern, trigger)`.
    pub fn lookup(
        &self,
        pattern: PatternKind,
        trigger: Trigger,
    ) -> Result<&Arc<RuleEntry>, ResolveError> {
        self.rules
            .get(pattern, trigger)
            .ok_or(ResolveError::MissingMapping { pattern, trigger })
    }

    /// Resolves the verb for `pattern` firing at `node` under `trigger`.
    pub fn resolve(
        &self,
        graph: &WorkflowGraph,
        pattern: PatternKind,
        node: &NodeSpec,
        trigger: Trigger,
    ) -> Result<VerbConfig, ResolveError> {
        let entry = self.lookup(pattern, trigger)?;
        let missing = |param| ResolveError::MissingParameter {
            pattern,
            node: node.id.clone(),
            param,
        };
        let template = Arc::clone(&entry.template);
        let declared = node.mi.as_ref().map(|mi| &mi.cardinality);

        let config = match &entry.verb {
            VerbSpec::Copy { cardinality, binding } => {
                let cardinality = match (cardinality, declared) {
                    (CardinalityMode::Topology, _) => Cardinality::Topology,
                    (
                        CardinalityMode::Static | CardinalityMode::Declared,
                        Some(MiCardinality::Static(n)),
                    ) => Cardinality::Static(*n),
                    (
                        CardinalityMode::Dynamic | CardinalityMode::Declared,
                        Some(MiCardinality::Dynamic { items }),
                    ) => Cardinality::Dynamic {
                        items: items.clone(),
                    },
                    (CardinalityMode::Static, _) => return Err(missing("count")),
                    (CardinalityMode::Dynamic, _) => return Err(missing("items")),
                    (CardinalityMode::Declared, None) => return Err(missing("mi")),
                };
                let binding = node
                    .mi
                    .as_ref()
                    .and_then(|mi| mi.binding)
                    .or(*binding)
                    .unwrap_or_default();
                VerbConfig::Copy(CopyConfig {
                    cardinality,
                    binding,
                    template,
                })
            }
            VerbSpec::Await {
                threshold,
                over,
                latch,
                reset_on_fire,
                completion,
            } => {
                let threshold = match (threshold, over) {
                    (ThresholdMode::All, _) => Threshold::All,
                    (ThresholdMode::One, _) => Threshold::One,
                    (ThresholdMode::Active, _) => Threshold::Active,
                    (ThresholdMode::Count, AwaitOver::Branches) => match node.join {
                        JoinType::Partial(n) => Threshold::Count(n),
                        _ => return Err(missing("threshold")),
                    },
                    (ThresholdMode::Count, AwaitOver::Instances) => {
                        match node.mi.as_ref().map(|mi| mi.sync) {
                            Some(MiSync::Quorum(n)) => Threshold::Count(n),
                            _ => return Err(missing("quorum")),
                        }
                    }
                };
                VerbConfig::Await(AwaitConfig {
                    threshold,
                    over: *over,
                    latch: *latch,
                    reset_on_fire: *reset_on_fire,
                    completion: *completion,
                    template,
                })
            }
            VerbSpec::Filter { selection } => VerbConfig::Filter(FilterConfig {
                selection: *selection,
                template,
            }),
            VerbSpec::Void { scope } => {
                let scope = match scope {
                    ScopeMode::Subject => CancelScope::Subject,
                    ScopeMode::Region => match &node.cancels {
                        Some(CancelTarget::Region(region)) => CancelScope::Region(region.clone()),
                        _ => return Err(missing("region")),
                    },
                    ScopeMode::Case => CancelScope::Case(graph.case().clone()),
                };
                VerbConfig::Void(VoidConfig { scope, template })
            }
        };
        Ok(config)
    }
}
