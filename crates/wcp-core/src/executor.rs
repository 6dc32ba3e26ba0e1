// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Verb executor: interprets a resolved [`VerbConfig`] against live state.
//!
//! Every verb runs the same three steps. The target query is evaluated first
//! (an empty result is a no-op). Instances are generated next when the
//! template declares it. Last, the mutation is interpreted over the typed
//! bindings into a [`QuadDelta`]. Verb policy only decides what gets bound.
//!
//! The executor reads the store and never writes it. Applying the delta is the
//! tick controller's job.
use serde_json::Value;
use thiserror::Error;

use crate::binding::{Binding, BindingError, Bindings, MiInstance};
use crate::delta::{DeltaBuilder, QuadDelta};
use crate::ident::{NodeId, RegionId};
use crate::predicate::{PredicateError, PredicateEvaluator};
use crate::store::TripleStore;
use crate::template::{
    InstanceQuery, Mutation, Placeholder, Relation, Statement, TargetFilter, TargetQuery,
};
use crate::triple::{
    Predicate, Term, Triple, STATUS_ENABLED, STATUS_TERMINATED, STATUS_VOIDED,
};
use crate::tx::TransactionContext;
use crate::verb::{
    AwaitConfig, AwaitOver, CancelScope, Cardinality, Completion, CopyConfig, FilterConfig,
    Selection, Threshold, VerbConfig, VoidConfig,
};
use crate::workflow::{InstanceBinding, MiSync, WorkflowGraph};

/// Outcome of a successful execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// State changes to apply.
    Delta(QuadDelta),
    /// Nothing to do.
    NoOp(NoOpReason),
}

/// Why an execution produced no delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    /// The target query matched nothing.
    EmptyTarget,
    /// An AWAIT threshold is not met yet.
    ThresholdNotMet,
    /// A latched join ignores further arrivals.
    Latched,
    /// No guarded flow evaluated to true.
    NoFlowSelected,
    /// The mutation cancelled out against current state.
    Unchanged,
}

/// Rule application failures. The tick records them and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    /// Placeholder binding failure.
    #[error(transparent)]
    Binding(#[from] BindingError),
    /// Guard evaluation failure.
    #[error(transparent)]
    Predicate(#[from] PredicateError),
    /// Instance generation exceeds the configured bound.
    #[error("{node}: {requested} instances exceed the limit of {limit}")]
    InstanceLimit {
        /// Base node.
        node: NodeId,
        /// Instances requested.
        requested: usize,
        /// Configured bound.
        limit: u32,
    },
    /// Dynamic item list is empty.
    #[error("{node}: item list `{items}` is empty")]
    EmptyItemList {
        /// Base node.
        node: NodeId,
        /// Payload key.
        items: String,
    },
    /// Dynamic item list is absent or not a list.
    #[error("{node}: payload has no item list under `{items}`")]
    MissingItems {
        /// Base node.
        node: NodeId,
        /// Payload key.
        items: String,
    },
    /// Quorum larger than the number of instances a runtime list produced.
    #[error("{node}: quorum of {quorum} exceeds {instances} instances")]
    QuorumExceedsInstances {
        /// Base node.
        node: NodeId,
        /// Declared quorum.
        quorum: u32,
        /// Instances the item list would spawn.
        instances: usize,
    },
    /// Instance copy without an instance generation query.
    #[error("{0}: template declares no instance generation")]
    MissingInstanceGeneration(NodeId),
    /// Acting node is not part of the graph.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// Bound region is not part of the graph.
    #[error("unknown region {0}")]
    UnknownRegion(RegionId),
}

/// Read-only view used to execute one rule application.
pub struct VerbExecutor<'a> {
    graph: &'a WorkflowGraph,
    store: &'a TripleStore,
    evaluator: &'a dyn PredicateEvaluator,
    ctx: TransactionContext<'a>,
    max_instances: u32,
}

impl<'a> VerbExecutor<'a> {
    /// Executor over the given state snapshot.
    #[must_use]
    pub fn new(
        graph: &'a WorkflowGraph,
        store: &'a TripleStore,
        evaluator: &'a dyn PredicateEvaluator,
        ctx: TransactionContext<'a>,
        max_instances: u32,
    ) -> Self {
        Self {
            graph,
            store,
            evaluator,
            ctx,
            max_instances,
        }
    }

    /// Executes `config` with `subject` as the acting node.
    pub fn execute(&self, config: &VerbConfig, subject: &NodeId) -> Result<Execution, ExecError> {
        if self.graph.node(subject).is_none() {
            return Err(ExecError::UnknownNode(subject.clone()));
        }
        let mut bindings = Bindings::new();
        bindings.bind(Placeholder::Subject, Binding::Node(subject.clone()))?;
        bindings.bind(Placeholder::TxId, Binding::Tx(self.ctx.tx()))?;
        bindings.bind(Placeholder::Case, Binding::Case(self.graph.case().clone()))?;
        bindings.bind(
            Placeholder::Successors,
            Binding::Nodes(self.graph.successors(subject)),
        )?;
        match config {
            VerbConfig::Copy(c) => self.copy(c, subject, bindings),
            VerbConfig::Await(c) => self.await_arrivals(c, subject, bindings),
            VerbConfig::Filter(c) => self.filter(c, subject, bindings),
            VerbConfig::Void(c) => self.void(c, bindings),
        }
    }

    fn copy(
        &self,
        c: &CopyConfig,
        subject: &NodeId,
        mut b: Bindings,
    ) -> Result<Execution, ExecError> {
        let targets = self.select(c.template.target(), &b)?;
        if targets.is_empty() {
            return Ok(Execution::NoOp(NoOpReason::EmptyTarget));
        }
        let items = match &c.cardinality {
            Cardinality::Topology => {
                b.bind(Placeholder::Targets, Binding::Nodes(targets))?;
                None
            }
            Cardinality::Static(count) => {
                self.check_limit(subject, *count as usize)?;
                Some(vec![Value::Null; *count as usize])
            }
            Cardinality::Dynamic { items } => {
                let list = self.item_list(subject, items)?;
                self.check_limit(subject, list.len())?;
                self.check_quorum(subject, list.len())?;
                Some(list)
            }
        };
        if let Some(items) = items {
            let Some(query) = c.template.instance_generation() else {
                return Err(ExecError::MissingInstanceGeneration(subject.clone()));
            };
            b.bind(Placeholder::Items, Binding::Items(items))?;
            let instances = self.generate(query, &b, c.binding)?;
            b.bind(
                Placeholder::Targets,
                Binding::Nodes(instances.iter().map(|i| i.id.clone()).collect()),
            )?;
            b.bind(Placeholder::Instances, Binding::Instances(instances))?;
        }
        Ok(finish(self.interpret(c.template.mutation(), &b)?))
    }

    fn await_arrivals(
        &self,
        c: &AwaitConfig,
        subject: &NodeId,
        mut b: Bindings,
    ) -> Result<Execution, ExecError> {
        let arrived = self.select(c.template.target(), &b)?;
        if c.latch && self.store.is_latched(subject) {
            if !c.reset_on_fire || arrived.is_empty() {
                return Ok(Execution::NoOp(NoOpReason::Latched));
            }
            let mut delta = DeltaBuilder::new();
            self.absorb(&mut delta, subject, &arrived);
            self.reset_when_drained(&mut delta, subject, &arrived);
            return Ok(finish(delta));
        }
        if arrived.is_empty() {
            return Ok(Execution::NoOp(NoOpReason::EmptyTarget));
        }

        let pool = match c.over {
            AwaitOver::Branches => self.graph.predecessors(subject),
            AwaitOver::Instances => self.store.instances_of(subject),
        };
        let contributors: Vec<NodeId> = match c.threshold {
            Threshold::All => {
                if !pool.iter().all(|p| arrived.contains(p)) {
                    return Ok(Execution::NoOp(NoOpReason::ThresholdNotMet));
                }
                arrived.clone()
            }
            Threshold::One => arrived.iter().take(1).cloned().collect(),
            Threshold::Count(n) => {
                let n = n as usize;
                if arrived.len() < n {
                    return Ok(Execution::NoOp(NoOpReason::ThresholdNotMet));
                }
                arrived.iter().take(n).cloned().collect()
            }
            Threshold::Active => {
                let blocked = pool
                    .iter()
                    .filter(|p| !arrived.contains(p))
                    .any(|p| self.graph.upstream_live(p, subject, self.store));
                if blocked {
                    return Ok(Execution::NoOp(NoOpReason::ThresholdNotMet));
                }
                arrived.clone()
            }
        };
        let remaining: Vec<NodeId> = match (c.completion, c.over) {
            (Completion::Leave, _) => Vec::new(),
            (Completion::CancelRemaining, AwaitOver::Branches) => {
                arrived.iter().filter(|n| !contributors.contains(n)).cloned().collect()
            }
            (Completion::CancelRemaining, AwaitOver::Instances) => {
                pool.iter().filter(|n| !contributors.contains(n)).cloned().collect()
            }
        };

        b.bind(Placeholder::Targets, Binding::Nodes(contributors.clone()))?;
        b.bind(Placeholder::Remaining, Binding::Nodes(remaining.clone()))?;
        let mut delta = self.interpret(c.template.mutation(), &b)?;
        if c.latch && c.reset_on_fire {
            let delivered: Vec<NodeId> = contributors.into_iter().chain(remaining).collect();
            self.reset_when_drained(&mut delta, subject, &delivered);
        }
        Ok(finish(delta))
    }

    fn filter(
        &self,
        c: &FilterConfig,
        subject: &NodeId,
        mut b: Bindings,
    ) -> Result<Execution, ExecError> {
        let candidates = self.select(c.template.target(), &b)?;
        if candidates.is_empty() {
            return Ok(Execution::NoOp(NoOpReason::EmptyTarget));
        }
        let mut chosen = Vec::new();
        for flow in self.graph.outgoing(subject).filter(|f| candidates.contains(&f.to)) {
            if self.evaluator.evaluate(flow, &self.ctx)? {
                chosen.push(flow.to.clone());
                if c.selection == Selection::ExactlyOne {
                    break;
                }
            }
        }
        if chosen.is_empty() {
            return Ok(Execution::NoOp(NoOpReason::NoFlowSelected));
        }
        b.bind(Placeholder::Targets, Binding::Nodes(chosen))?;
        Ok(finish(self.interpret(c.template.mutation(), &b)?))
    }

    fn void(&self, c: &VoidConfig, mut b: Bindings) -> Result<Execution, ExecError> {
        if let CancelScope::Region(region) = &c.scope {
            b.bind(Placeholder::Region, Binding::Region(region.clone()))?;
        }
        let targets = self.select(c.template.target(), &b)?;
        if targets.is_empty() {
            return Ok(Execution::NoOp(NoOpReason::EmptyTarget));
        }
        b.bind(Placeholder::Targets, Binding::Nodes(targets))?;
        Ok(finish(self.interpret(c.template.mutation(), &b)?))
    }

    fn select(&self, query: &TargetQuery, b: &Bindings) -> Result<Vec<NodeId>, ExecError> {
        let arg = query.argument;
        let mut nodes = match query.relation {
            Relation::SelfNode => vec![b.node(arg)?.clone()],
            Relation::Successors => self.graph.successors(b.node(arg)?),
            Relation::Predecessors => self.graph.predecessors(b.node(arg)?),
            Relation::Arrivals => self.store.branch_sources(b.node(arg)?),
            Relation::Instances => self.store.instances_of(b.node(arg)?),
            Relation::Region => {
                let id = b.region(arg)?;
                let region = self
                    .graph
                    .region(id)
                    .ok_or_else(|| ExecError::UnknownRegion(id.clone()))?;
                region.members.iter().cloned().collect()
            }
            Relation::Case => {
                b.case(arg)?;
                self.graph.nodes().map(|n| n.id.clone()).collect()
            }
        };
        for filter in &query.filters {
            match filter {
                TargetFilter::Tokened => nodes.retain(|n| self.store.holds_token(n)),
                TargetFilter::Untokened => nodes.retain(|n| !self.store.holds_token(n)),
            }
        }
        Ok(nodes)
    }

    fn check_limit(&self, node: &NodeId, requested: usize) -> Result<(), ExecError> {
        if requested > self.max_instances as usize {
            return Err(ExecError::InstanceLimit {
                node: node.clone(),
                requested,
                limit: self.max_instances,
            });
        }
        Ok(())
    }

    fn check_quorum(&self, node: &NodeId, instances: usize) -> Result<(), ExecError> {
        let quorum = self
            .graph
            .node(node)
            .and_then(|spec| spec.mi.as_ref())
            .and_then(|mi| match mi.sync {
                MiSync::Quorum(quorum) => Some(quorum),
                MiSync::None | MiSync::All => None,
            });
        match quorum {
            Some(quorum) if quorum as usize > instances => Err(ExecError::QuorumExceedsInstances {
                node: node.clone(),
                quorum,
                instances,
            }),
            _ => Ok(()),
        }
    }

    fn item_list(&self, node: &NodeId, key: &str) -> Result<Vec<Value>, ExecError> {
        match self.ctx.lookup(key) {
            Some(Value::Array(list)) if list.is_empty() => Err(ExecError::EmptyItemList {
                node: node.clone(),
                items: key.to_owned(),
            }),
            Some(Value::Array(list)) => Ok(list.clone()),
            _ => Err(ExecError::MissingItems {
                node: node.clone(),
                items: key.to_owned(),
            }),
        }
    }

    fn generate(
        &self,
        query: &InstanceQuery,
        b: &Bindings,
        binding: InstanceBinding,
    ) -> Result<Vec<MiInstance>, ExecError> {
        let base = b.node(query.base)?;
        let items = b.items(query.items)?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let index = u32::try_from(i).map_err(|_| ExecError::InstanceLimit {
                    node: base.clone(),
                    requested: items.len(),
                    limit: self.max_instances,
                })?;
                Ok(MiInstance {
                    id: base.instance(index),
                    base: base.clone(),
                    index,
                    item: match binding {
                        InstanceBinding::Item => Some(item.clone()),
                        InstanceBinding::Index => None,
                    },
                })
            })
            .collect()
    }

    fn interpret(&self, mutation: &Mutation, b: &Bindings) -> Result<DeltaBuilder, ExecError> {
        let store = self.store;
        let mut d = DeltaBuilder::new();
        for statement in mutation.statements() {
            match statement {
                Statement::Consume(p) => {
                    for node in b.nodes(*p)? {
                        d.remove(Triple::token(node.clone()));
                    }
                }
                Statement::Enable(p) => {
                    for node in b.nodes(*p)? {
                        self.give_token(&mut d, node);
                    }
                }
                Statement::Grant { to, from } => {
                    let from = b.node(*from)?;
                    for target in b.nodes(*to)? {
                        if self.graph.is_join(target) {
                            d.add(Triple::branch_token(target.clone(), from.clone()));
                        } else {
                            self.give_token(&mut d, target);
                        }
                    }
                }
                Statement::Take { join, from } => {
                    let join = b.node(*join)?;
                    for source in b.nodes(*from)? {
                        d.remove(Triple::branch_token(join.clone(), source.clone()));
                    }
                }
                Statement::Absorb { join, from } => {
                    self.absorb(&mut d, b.node(*join)?, b.nodes(*from)?);
                }
                Statement::Status { node, label } => {
                    for node in b.nodes(*node)? {
                        d.replace(store, node, Predicate::Status, Term::Text(label.clone()));
                    }
                }
                Statement::Latch(p) => {
                    d.replace(store, b.node(*p)?, Predicate::DiscriminatorFired, Term::Bool(true));
                }
                Statement::Unlatch(p) => {
                    let node = b.node(*p)?;
                    d.clear(store, node, Predicate::DiscriminatorFired);
                    d.clear(store, node, Predicate::Absorbed);
                }
                Statement::Spawn(p) => {
                    for instance in b.instances(*p)? {
                        self.spawn(&mut d, instance);
                    }
                }
                Statement::Destroy(p) => {
                    for node in b.nodes(*p)? {
                        d.purge(store, node);
                    }
                }
                Statement::Void(p) => {
                    for node in b.nodes(*p)? {
                        self.void_node(&mut d, node);
                    }
                }
                Statement::Terminate(p) => {
                    let case = b.case(*p)?;
                    d.replace(
                        store,
                        &case.subject(),
                        Predicate::Status,
                        Term::Text(STATUS_TERMINATED.to_owned()),
                    );
                }
                Statement::Stamp { node, tx } => {
                    let stamp = i64::try_from(b.tx(*tx)?.value()).unwrap_or(i64::MAX);
                    for node in b.nodes(*node)? {
                        d.replace(store, node, Predicate::FiredBy, Term::Int(stamp));
                    }
                }
            }
        }
        Ok(d)
    }

    fn give_token(&self, d: &mut DeltaBuilder, node: &NodeId) {
        d.add(Triple::token(node.clone()));
        d.replace(self.store, node, Predicate::Status, Term::Text(STATUS_ENABLED.to_owned()));
    }

    fn spawn(&self, d: &mut DeltaBuilder, instance: &MiInstance) {
        let id = &instance.id;
        d.add(Triple::new(id.clone(), Predicate::InstanceOf, Term::Node(instance.base.clone())));
        d.add(Triple::new(
            id.clone(),
            Predicate::InstanceIndex,
            Term::Int(i64::from(instance.index)),
        ));
        if let Some(item) = &instance.item {
            d.add(Triple::new(id.clone(), Predicate::BoundItem, Term::Json(item.to_string())));
        }
        self.give_token(d, id);
    }

    fn absorb(&self, d: &mut DeltaBuilder, join: &NodeId, from: &[NodeId]) {
        for source in from {
            d.remove(Triple::branch_token(join.clone(), source.clone()));
            d.add(Triple::new(join.clone(), Predicate::Absorbed, Term::Node(source.clone())));
        }
    }

    /// Clears the latch once every incoming branch has delivered.
    fn reset_when_drained(&self, d: &mut DeltaBuilder, join: &NodeId, delivered: &[NodeId]) {
        let mut seen = self.store.absorbed(join);
        seen.extend(delivered.iter().cloned());
        if self.graph.predecessors(join).iter().all(|p| seen.contains(p)) {
            d.clear(self.store, join, Predicate::DiscriminatorFired);
            d.clear(self.store, join, Predicate::Absorbed);
        }
    }

    fn void_node(&self, d: &mut DeltaBuilder, node: &NodeId) {
        if self.store.has_token(node) {
            d.remove(Triple::token(node.clone()));
        }
        for source in self.store.branch_sources(node) {
            d.remove(Triple::branch_token(node.clone(), source));
        }
        for child in self.store.instances_of(node) {
            d.purge(self.store, &child);
        }
        d.clear(self.store, node, Predicate::CancelRequested);
        d.replace(self.store, node, Predicate::Status, Term::Text(STATUS_VOIDED.to_owned()));
    }
}

fn finish(delta: DeltaBuilder) -> Execution {
    if delta.is_empty() {
        Execution::NoOp(NoOpReason::Unchanged)
    } else {
        Execution::Delta(delta.finish())
    }
}
