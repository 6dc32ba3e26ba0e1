// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tick controller.
//!
//! The engine owns the triple store, the loaded graph and the resolver. It
//! never advances on its own: each [`Engine::tick`] snapshots the store size,
//! selects the applicable pattern occurrences in canonical order, and applies
//! each in its own transaction. A failing application is rolled back and
//! reported while earlier applications of the same tick stay committed.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::instrument;

use crate::catalog::{CatalogError, RuleStore};
use crate::config::{ConfigError, KernelConfig};
use crate::delta::{DeltaBuilder, QuadDelta};
use crate::document::load_yaml;
use crate::executor::{ExecError, Execution, VerbExecutor};
use crate::ident::{Hash, NodeId};
use crate::pattern::{derive_occurrences, Occurrence};
use crate::predicate::{PayloadFlagEvaluator, PredicateEvaluator};
use crate::provenance::{
    self, Applied, ProvenanceLog, RuleFault, TransactionRecord, TxError, TxOrigin, TxOutcome,
};
use crate::receipt::{SkipReason, TickReceipt, TickReceiptDisposition, TickReceiptEntry};
use crate::resolver::VerbResolver;
use crate::store::TripleStore;
use crate::telemetry;
use crate::triple::{Predicate, Triple, STATUS_ENABLED, STATUS_PENDING};
use crate::tx::{TransactionContext, TxId};
use crate::verb::VerbConfig;
use crate::workflow::{GraphError, WorkflowGraph};

/// Controller state. Nothing else exists: the engine never auto-advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Between ticks.
    Idle,
    /// A tick is in progress.
    Executing,
}

/// Errors emitted by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A command arrived while a tick was executing.
    #[error("a tick is already executing")]
    TickInProgress,
    /// A rule application failed and `halt_on_fault` is set.
    ///
    /// Applications committed earlier in the same tick stay committed.
    /// `receipt` reports them, ending with the failing entry.
    #[error("tick {tick}: rule at {node} failed: {fault}")]
    Fault {
        /// Tick that halted.
        tick: u64,
        /// Acting node of the failing rule.
        node: NodeId,
        /// Failure.
        fault: RuleFault,
        /// Partial receipt of the halted tick.
        receipt: Box<TickReceipt>,
    },
    /// An injected delta was rejected.
    #[error(transparent)]
    Tx(#[from] TxError),
    /// The tick budget ran out before a fixed point.
    #[error("no convergence within {} ticks", .0.ticks)]
    ConvergenceTimeout(Box<ConvergenceTimeout>),
    /// A command named a node the case does not have.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// Workflow document failure.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Rule catalog failure.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Kernel configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Payload of [`EngineError::ConvergenceTimeout`].
#[derive(Debug, Clone)]
pub struct ConvergenceTimeout {
    /// Ticks executed.
    pub ticks: u64,
    /// Every receipt produced, in order.
    pub history: Vec<TickReceipt>,
}

impl ConvergenceTimeout {
    /// Receipt of the final tick.
    #[must_use]
    pub fn last(&self) -> Option<&TickReceipt> {
        self.history.last()
    }
}

/// Workflow-pattern execution kernel for one case.
pub struct Engine {
    graph: WorkflowGraph,
    resolver: VerbResolver,
    occurrences: Vec<Occurrence>,
    store: TripleStore,
    evaluator: Box<dyn PredicateEvaluator>,
    config: KernelConfig,
    provenance: ProvenanceLog,
    state: ControllerState,
    tick: u64,
    tx_counter: u64,
    live_txs: FxHashSet<u64>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("case", self.graph.case())
            .field("tick", &self.tick)
            .field("state", &self.state)
            .field("triples", &self.store.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Builds an engine over `graph` and seeds initial tokens through a
    /// genesis transaction.
    pub fn new(
        graph: WorkflowGraph,
        rules: Arc<RuleStore>,
        config: KernelConfig,
    ) -> Result<Self, EngineError> {
        let config = config.validate()?;
        let occurrences = derive_occurrences(&graph);
        let mut engine = Self {
            graph,
            resolver: VerbResolver::new(rules),
            occurrences,
            store: TripleStore::new(),
            evaluator: Box::new(PayloadFlagEvaluator),
            config,
            provenance: ProvenanceLog::new(),
            state: ControllerState::Idle,
            tick: 0,
            tx_counter: 0,
            live_txs: FxHashSet::default(),
        };
        engine.genesis()?;
        Ok(engine)
    }

    /// Builds an engine using the built-in rule catalog.
    pub fn with_builtin_rules(
        graph: WorkflowGraph,
        config: KernelConfig,
    ) -> Result<Self, EngineError> {
        Self::new(graph, Arc::new(RuleStore::builtin()?), config)
    }

    /// Loads a YAML workflow document and builds an engine with built-in rules.
    pub fn from_yaml_str(src: &str, config: KernelConfig) -> Result<Self, EngineError> {
        Self::with_builtin_rules(load_yaml(src)?, config)
    }

    /// Installs the guard evaluator used by FILTER verbs.
    pub fn with_evaluator(mut self, evaluator: impl PredicateEvaluator + 'static) -> Self {
        self.set_evaluator(Box::new(evaluator));
        self
    }

    /// Replaces the guard evaluator between ticks.
    pub fn set_evaluator(&mut self, evaluator: Box<dyn PredicateEvaluator>) {
        self.evaluator = evaluator;
    }

    fn genesis(&mut self) -> Result<(), EngineError> {
        let mut seed = DeltaBuilder::new();
        for node in self.graph.nodes().filter(|n| n.initial_token) {
            seed.add(Triple::token(node.id.clone()));
            seed.add(Triple::status(node.id.clone(), STATUS_ENABLED));
        }
        self.transact(TxOrigin::Genesis, seed.finish())?;
        Ok(())
    }

    /// Begins a new transaction and returns its identifier.
    fn begin(&mut self) -> TxId {
        // Tx id 0 is reserved, so the counter skips it after wrapping.
        self.tx_counter = self.tx_counter.wrapping_add(1);
        if self.tx_counter == 0 {
            self.tx_counter = 1;
        }
        self.live_txs.insert(self.tx_counter);
        TxId::from_raw(self.tx_counter)
    }

    fn commit(&mut self, tx: TxId, delta: &QuadDelta) -> Result<Applied, TxError> {
        if tx.value() == 0 || !self.live_txs.contains(&tx.value()) {
            return Err(TxError::UnknownTx(tx));
        }
        provenance::apply(&mut self.store, delta)
    }

    fn close(&mut self, tx: TxId, origin: TxOrigin, outcome: TxOutcome, delta: &QuadDelta) {
        self.live_txs.remove(&tx.value());
        let (additions, removals) = if outcome.is_committed() {
            (delta.additions().to_vec(), delta.removals().to_vec())
        } else {
            (Vec::new(), Vec::new())
        };
        self.provenance.append(TransactionRecord {
            tx,
            tick: self.tick,
            origin,
            outcome,
            additions,
            removals,
        });
    }

    /// Runs a non-rule transaction outside any tick.
    fn transact(&mut self, origin: TxOrigin, delta: QuadDelta) -> Result<TxId, EngineError> {
        if self.state == ControllerState::Executing {
            return Err(EngineError::TickInProgress);
        }
        let tx = self.begin();
        match self.commit(tx, &delta) {
            Ok(_) => {
                self.close(tx, origin, TxOutcome::Committed, &delta);
                Ok(tx)
            }
            Err(err) => {
                self.close(tx, origin, TxOutcome::Rejected(err.clone()), &delta);
                Err(err.into())
            }
        }
    }

    /// Advances one tick.
    #[instrument(skip(self), fields(tick = self.tick + 1))]
    pub fn tick(&mut self) -> Result<TickReceipt, EngineError> {
        if self.state == ControllerState::Executing {
            return Err(EngineError::TickInProgress);
        }
        self.state = ControllerState::Executing;
        let result = self.execute_tick();
        self.state = ControllerState::Idle;
        result
    }

    fn execute_tick(&mut self) -> Result<TickReceipt, EngineError> {
        self.tick += 1;
        let tick = self.tick;
        let triples_before = self.store.len();
        let candidates = self.applicable();

        let mut entries = Vec::with_capacity(candidates.len());
        for occurrence in candidates {
            let entry = if self.is_terminated() {
                TickReceiptEntry::skipped(occurrence)
            } else {
                self.apply_rule(occurrence)
            };
            let halt = match &entry.disposition {
                TickReceiptDisposition::Failed(fault) if self.config.halt_on_fault => {
                    Some((entry.node.clone(), fault.clone()))
                }
                _ => None,
            };
            entries.push(entry);
            if let Some((node, fault)) = halt {
                let receipt = self.seal(tick, triples_before, entries);
                return Err(EngineError::Fault {
                    tick,
                    node,
                    fault,
                    receipt: Box::new(receipt),
                });
            }
        }
        Ok(self.seal(tick, triples_before, entries))
    }

    fn seal(
        &self,
        tick: u64,
        triples_before: usize,
        entries: Vec<TickReceiptEntry>,
    ) -> TickReceipt {
        let receipt = TickReceipt::new(
            tick,
            triples_before,
            self.store.len(),
            entries,
            self.store.state_root(),
        );
        telemetry::tick_completed(&receipt);
        receipt
    }

    fn apply_rule(&mut self, occurrence: Occurrence) -> TickReceiptEntry {
        let tx = self.begin();
        let mut entry = TickReceiptEntry {
            tx: Some(tx),
            rule_id: self
                .resolver
                .lookup(occurrence.pattern, occurrence.trigger)
                .ok()
                .map(|rule| rule.id),
            node: occurrence.node.clone(),
            pattern: occurrence.pattern,
            trigger: occurrence.trigger,
            verb: None,
            disposition: TickReceiptDisposition::Skipped(SkipReason::CaseTerminated),
        };
        let origin = TxOrigin::Rule(occurrence.clone());

        let config = match self.resolve(&occurrence) {
            Ok(config) => config,
            Err(fault) => return self.fail(tx, origin, entry, fault),
        };
        let verb = config.kind();
        entry.verb = Some(verb);

        let ctx = TransactionContext::new(tx, self.graph.data());
        let executed = VerbExecutor::new(
            &self.graph,
            &self.store,
            self.evaluator.as_ref(),
            ctx,
            self.config.max_instances,
        )
        .execute(&config, &occurrence.node);

        match executed {
            Err(err) => self.fail(tx, origin, entry, RuleFault::Exec(err)),
            Ok(Execution::NoOp(reason)) => {
                self.close(tx, origin, TxOutcome::NoOp, &QuadDelta::empty());
                entry.disposition = TickReceiptDisposition::NoOp(reason);
                entry
            }
            Ok(Execution::Delta(delta)) => match self.commit(tx, &delta) {
                Ok(applied) => {
                    telemetry::rule_applied(tx, &occurrence, verb, applied.added, applied.removed);
                    self.close(tx, origin, TxOutcome::Committed, &delta);
                    entry.disposition = TickReceiptDisposition::Applied {
                        added: applied.added,
                        removed: applied.removed,
                    };
                    entry
                }
                Err(err) => {
                    telemetry::rule_rejected(tx, &occurrence, &err);
                    self.close(tx, origin, TxOutcome::Rejected(err.clone()), &delta);
                    entry.disposition = TickReceiptDisposition::Rejected(err);
                    entry
                }
            },
        }
    }

    fn resolve(&self, occurrence: &Occurrence) -> Result<VerbConfig, RuleFault> {
        let node = self
            .graph
            .node(&occurrence.node)
            .ok_or_else(|| ExecError::UnknownNode(occurrence.node.clone()))?;
        self.resolver
            .resolve(&self.graph, occurrence.pattern, node, occurrence.trigger)
            .map_err(RuleFault::from)
    }

    fn fail(
        &mut self,
        tx: TxId,
        origin: TxOrigin,
        mut entry: TickReceiptEntry,
        fault: RuleFault,
    ) -> TickReceiptEntry {
        if let TxOrigin::Rule(occurrence) = &origin {
            telemetry::rule_failed(tx, occurrence, &fault);
        }
        self.close(tx, origin, TxOutcome::Failed(fault.clone()), &QuadDelta::empty());
        entry.disposition = TickReceiptDisposition::Failed(fault);
        entry
    }

    /// Ticks until a fixed point or until `max_ticks` ticks have run.
    ///
    /// On success the last receipt is the converged one.
    #[instrument(skip(self), fields(from_tick = self.tick))]
    pub fn run_to_completion(&mut self, max_ticks: u64) -> Result<Vec<TickReceipt>, EngineError> {
        let mut history = Vec::new();
        for _ in 0..max_ticks {
            let receipt = self.tick()?;
            let converged = receipt.converged();
            if converged {
                telemetry::converged(&receipt);
            }
            history.push(receipt);
            if converged {
                return Ok(history);
            }
        }
        telemetry::budget_exhausted(max_ticks);
        Err(EngineError::ConvergenceTimeout(Box::new(ConvergenceTimeout {
            ticks: max_ticks,
            history,
        })))
    }

    /// [`Engine::run_to_completion`] with the configured tick budget.
    pub fn run_until_converged(&mut self) -> Result<Vec<TickReceipt>, EngineError> {
        self.run_to_completion(self.config.tick_budget)
    }

    /// Applies corrective facts in their own transaction.
    pub fn inject(&mut self, delta: QuadDelta) -> Result<TxId, EngineError> {
        self.transact(TxOrigin::Injection, delta)
    }

    /// Records a cancellation request for `node`.
    ///
    /// The request is acted on by the next tick in which the node holds a token.
    /// Cancelling an MI base also destroys its live instances.
    pub fn request_cancel(&mut self, node: &NodeId) -> Result<TxId, EngineError> {
        if self.graph.node(node).is_none() {
            return Err(EngineError::UnknownNode(node.clone()));
        }
        self.transact(
            TxOrigin::CancelRequest(node.clone()),
            QuadDelta::new([Triple::cancel_request(node.clone())], []),
        )
    }

    /// Clears a discriminator latch and its absorbed-branch bookkeeping.
    ///
    /// Returns `false` when the join was not latched.
    pub fn reset_discriminator(&mut self, node: &NodeId) -> Result<bool, EngineError> {
        if !self.graph.is_join(node) {
            return Err(EngineError::UnknownNode(node.clone()));
        }
        let mut reset = DeltaBuilder::new();
        reset.clear(&self.store, node, Predicate::DiscriminatorFired);
        reset.clear(&self.store, node, Predicate::Absorbed);
        if reset.is_empty() {
            return Ok(false);
        }
        self.transact(TxOrigin::Reset(node.clone()), reset.finish())?;
        Ok(true)
    }

    /// Occurrences whose trigger holds right now, in canonical order.
    ///
    /// Empty once the case is terminated.
    #[must_use]
    pub fn applicable(&self) -> Vec<Occurrence> {
        if self.is_terminated() {
            return Vec::new();
        }
        self.occurrences
            .iter()
            .filter(|o| o.is_applicable(&self.store))
            .cloned()
            .collect()
    }

    /// Every derived occurrence, in canonical order.
    #[must_use]
    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    /// Status of every node and live instance. Nodes never touched report
    /// `Pending`.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<NodeId, String> {
        let status_of = |id: &NodeId| self.store.status(id).unwrap_or(STATUS_PENDING).to_owned();
        let mut out = BTreeMap::new();
        for node in self.graph.nodes() {
            out.insert(node.id.clone(), status_of(&node.id));
            for child in self.store.instances_of(&node.id) {
                let status = status_of(&child);
                out.insert(child, status);
            }
        }
        out
    }

    /// Status of the case itself.
    #[must_use]
    pub fn case_status(&self) -> &str {
        self.store
            .status(&self.graph.case().subject())
            .unwrap_or(STATUS_PENDING)
    }

    /// True when `node` holds its own token.
    #[must_use]
    pub fn has_token(&self, node: &NodeId) -> bool {
        self.store.has_token(node)
    }

    /// Sources of branch tokens waiting at `join`.
    #[must_use]
    pub fn branch_tokens(&self, join: &NodeId) -> Vec<NodeId> {
        self.store.branch_sources(join)
    }

    /// Live instances of `base`.
    #[must_use]
    pub fn instances(&self, base: &NodeId) -> Vec<NodeId> {
        self.store.instances_of(base)
    }

    /// True once the case has been terminated.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.store.is_terminated(&self.graph.case().subject())
    }

    /// Shared token store.
    #[must_use]
    pub fn store(&self) -> &TripleStore {
        &self.store
    }

    /// Loaded workflow graph.
    #[must_use]
    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Append-only transaction log.
    #[must_use]
    pub fn provenance(&self) -> &ProvenanceLog {
        &self.provenance
    }

    /// Number of ticks run so far.
    #[must_use]
    pub fn tick_number(&self) -> u64 {
        self.tick
    }

    /// Controller state.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Canonical digest of the current store.
    #[must_use]
    pub fn state_root(&self) -> Hash {
        self.store.state_root()
    }
}
