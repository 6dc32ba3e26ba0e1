// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Engine builder utilities for tests.

use std::sync::Arc;

use wcp_core::{
    Engine, EngineError, KernelConfig, PredicateEvaluator, RuleStore, WorkflowBuilder,
};

/// Builder for creating test engines with common configurations.
///
/// # Example
///
/// ```
/// use wcp_dry_tests::{sequence, EngineTestBuilder};
///
/// let mut engine = EngineTestBuilder::new(sequence(&["a", "b"]))
///     .with_tick_budget(8)
///     .build()
///     .unwrap();
/// assert_eq!(engine.run_until_converged().unwrap().len(), 2);
/// ```
pub struct EngineTestBuilder {
    workflow: WorkflowBuilder,
    config: KernelConfig,
    rules: Option<Arc<RuleStore>>,
    evaluator: Option<Box<dyn PredicateEvaluator>>,
}

impl EngineTestBuilder {
    /// Start from an unbuilt workflow.
    pub fn new(workflow: WorkflowBuilder) -> Self {
        Self {
            workflow,
            config: KernelConfig::default(),
            rules: None,
            evaluator: None,
        }
    }

    /// Replace the whole kernel config.
    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the tick budget used by `run_until_converged`.
    pub fn with_tick_budget(mut self, ticks: u64) -> Self {
        self.config.tick_budget = ticks;
        self
    }

    /// Set the per-COPY instance bound.
    pub fn with_max_instances(mut self, max: u32) -> Self {
        self.config.max_instances = max;
        self
    }

    /// Turn rule failures into tick errors.
    pub fn halting_on_fault(mut self) -> Self {
        self.config.halt_on_fault = true;
        self
    }

    /// Use `rules` instead of the built-in catalog.
    pub fn with_rules(mut self, rules: RuleStore) -> Self {
        self.rules = Some(Arc::new(rules));
        self
    }

    /// Install a guard evaluator.
    pub fn with_evaluator(mut self, evaluator: impl PredicateEvaluator + 'static) -> Self {
        self.evaluator = Some(Box::new(evaluator));
        self
    }

    /// Validate the workflow and build the engine.
    pub fn build(self) -> Result<Engine, EngineError> {
        let graph = self.workflow.build()?;
        let mut engine = match self.rules {
            Some(rules) => Engine::new(graph, rules, self.config)?,
            None => Engine::with_builtin_rules(graph, self.config)?,
        };
        if let Some(evaluator) = self.evaluator {
            engine.set_evaluator(evaluator);
        }
        Ok(engine)
    }
}
