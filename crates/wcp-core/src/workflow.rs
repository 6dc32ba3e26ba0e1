// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Structural workflow graph: nodes, flows, control annotations, regions.
//!
//! The graph is immutable once built. It never holds tokens; token state
//! lives in the [`TripleStore`] and the two are joined at query time.
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ident::{CaseId, FlowId, NodeId, RegionId};
use crate::store::TripleStore;

/// Task or condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Unit of work.
    #[default]
    Task,
    /// Routing-only place.
    Condition,
}

/// Outgoing control annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitType {
    /// Plain sequence.
    #[default]
    None,
    /// Every successor receives a token.
    And,
    /// Exactly one guarded successor receives a token.
    Xor,
    /// Every successor whose guard holds receives a token.
    Or,
}

/// Incoming control annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    /// A single incoming flow, no convergence.
    #[default]
    None,
    /// Waits for every incoming branch.
    And,
    /// Fires once per arriving branch.
    Xor,
    /// Waits for every branch that can still arrive.
    Or,
    /// Fires on the first branch, absorbs the rest, then resets.
    Discriminator,
    /// Fires on the first branch and blocks until reset externally.
    BlockingDiscriminator,
    /// Fires once `n` branches arrived, absorbs the rest, then resets.
    Partial(u32),
}

impl JoinType {
    /// True for every annotation that converges branches.
    #[must_use]
    pub const fn is_join(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// How a multiple-instance node determines its instance count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiCardinality {
    /// Fixed at design time.
    Static(u32),
    /// Length of an item list read from the case payload under `items`.
    Dynamic {
        /// Payload key (or JSON pointer) naming the item list.
        items: String,
    },
}

/// How instance children synchronize back into the base node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MiSync {
    /// Children are not awaited.
    #[default]
    None,
    /// Every child must complete.
    All,
    /// `n` children complete, the rest are cancelled.
    Quorum(u32),
}

/// What each generated instance binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceBinding {
    /// The instance binds its item from the list.
    #[default]
    Item,
    /// The instance binds only its zero-based index.
    Index,
}

/// Multiple-instance annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiSpec {
    /// Instance count policy.
    pub cardinality: MiCardinality,
    /// Synchronization policy.
    pub sync: MiSync,
    /// Per-instance binding, when the node overrides the catalog default.
    pub binding: Option<InstanceBinding>,
}

/// Cancellation annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelTarget {
    /// Firing voids the tokened members of the region.
    Region(RegionId),
    /// Firing voids every tokened node and terminates the case.
    Case,
}

/// A task or condition with its control annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    /// Identity.
    pub id: NodeId,
    /// Task or condition.
    pub kind: NodeKind,
    /// Outgoing behaviour.
    pub split: SplitType,
    /// Incoming behaviour.
    pub join: JoinType,
    /// Multiple-instance annotation.
    pub mi: Option<MiSpec>,
    /// Cancellation annotation.
    pub cancels: Option<CancelTarget>,
    /// Receives a token at genesis.
    pub initial_token: bool,
}

impl NodeSpec {
    /// Plain task with no annotations.
    pub fn task(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Task,
            split: SplitType::None,
            join: JoinType::None,
            mi: None,
            cancels: None,
            initial_token: false,
        }
    }

    /// Plain condition with no annotations.
    pub fn condition(id: impl Into<NodeId>) -> Self {
        Self {
            kind: NodeKind::Condition,
            ..Self::task(id)
        }
    }

    /// Sets the split annotation.
    pub fn split(mut self, split: SplitType) -> Self {
        self.split = split;
        self
    }

    /// Sets the join annotation.
    pub fn join(mut self, join: JoinType) -> Self {
        self.join = join;
        self
    }

    /// Sets the multiple-instance annotation.
    pub fn multi_instance(mut self, mi: MiSpec) -> Self {
        self.mi = Some(mi);
        self
    }

    /// Sets the cancellation annotation.
    pub fn cancelling(mut self, target: CancelTarget) -> Self {
        self.cancels = Some(target);
        self
    }

    /// Marks the node as holding a token at genesis.
    pub fn with_token(mut self) -> Self {
        self.initial_token = true;
        self
    }
}

impl From<&str> for NodeSpec {
    fn from(id: &str) -> Self {
        Self::task(id)
    }
}

/// Directed flow, optionally guarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    /// Identity.
    pub id: FlowId,
    /// Source node.
    pub from: NodeId,
    /// Target node.
    pub to: NodeId,
    /// Opaque guard handed to the predicate evaluator.
    pub predicate: Option<String>,
    /// Tie-breaking key among competing flows (ascending).
    pub ordering: i64,
}

impl Flow {
    /// Unguarded flow with ordering 0 and the default id.
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        let (from, to) = (from.into(), to.into());
        Self {
            id: FlowId::between(&from, &to),
            from,
            to,
            predicate: None,
            ordering: 0,
        }
    }

    /// Attaches a guard.
    pub fn guarded(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// Sets the ordering key.
    pub fn ordered(mut self, ordering: i64) -> Self {
        self.ordering = ordering;
        self
    }

    /// Overrides the flow id.
    pub fn named(mut self, id: impl Into<FlowId>) -> Self {
        self.id = id.into();
        self
    }
}

/// Declared set of nodes voided together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRegion {
    /// Identity.
    pub id: RegionId,
    /// Member nodes.
    pub members: BTreeSet<NodeId>,
}

/// Structural validation failures (load time).
#[derive(Debug, Error)]
pub enum GraphError {
    /// Two nodes share an id.
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),
    /// A node id uses the `#` instance separator or the `case:` subject prefix.
    #[error("node id {0} is reserved for generated ids")]
    ReservedNodeId(NodeId),
    /// Two flows share an id.
    #[error("duplicate flow id: {0}")]
    DuplicateFlow(FlowId),
    /// Two flows connect the same ordered pair.
    #[error("duplicate flow {from} -> {to}")]
    DuplicateEdge {
        /// Source.
        from: NodeId,
        /// Target.
        to: NodeId,
    },
    /// A flow names a node that does not exist.
    #[error("flow {flow} references unknown node {node}")]
    UnknownFlowNode {
        /// Offending flow.
        flow: FlowId,
        /// Missing node.
        node: NodeId,
    },
    /// Two regions share an id.
    #[error("duplicate region id: {0}")]
    DuplicateRegion(RegionId),
    /// A region has no members.
    #[error("region {0} has no members")]
    EmptyRegion(RegionId),
    /// A region lists a node that does not exist.
    #[error("region {region} references unknown node {node}")]
    UnknownRegionMember {
        /// Offending region.
        region: RegionId,
        /// Missing node.
        node: NodeId,
    },
    /// A node cancels a region that does not exist.
    #[error("node {node} cancels unknown region {region}")]
    UnknownRegion {
        /// Cancelling node.
        node: NodeId,
        /// Missing region.
        region: RegionId,
    },
    /// A node cancels a region it belongs to.
    #[error("node {node} cancels region {region} which contains it")]
    SelfCancellingRegion {
        /// Cancelling node.
        node: NodeId,
        /// Region.
        region: RegionId,
    },
    /// Static multiple-instance count of zero.
    #[error("node {0} declares zero static instances")]
    ZeroInstances(NodeId),
    /// Dynamic multiple-instance node without an items key.
    #[error("node {0} declares dynamic instances without an items key")]
    MissingItems(NodeId),
    /// Partial join or quorum threshold out of range.
    #[error("node {node}: threshold {threshold} outside 1..={limit}")]
    InvalidThreshold {
        /// Offending node.
        node: NodeId,
        /// Declared threshold.
        threshold: u32,
        /// Largest admissible threshold.
        limit: u32,
    },
    /// Multiple-instance node with a choice split.
    #[error("multiple-instance node {0} cannot use a XOR/OR split")]
    MiChoiceSplit(NodeId),
    /// A document field combination is not representable.
    #[error("node {node}: {reason}")]
    InvalidNode {
        /// Offending node.
        node: NodeId,
        /// What is wrong.
        reason: &'static str,
    },
    /// YAML front-end failure.
    #[error("workflow document: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// JSON front-end failure.
    #[error("workflow document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Immutable workflow definition for one case.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    case: CaseId,
    data: serde_json::Value,
    nodes: BTreeMap<NodeId, NodeSpec>,
    flows: BTreeMap<FlowId, Flow>,
    outgoing: BTreeMap<NodeId, Vec<FlowId>>,
    incoming: BTreeMap<NodeId, Vec<FlowId>>,
    regions: BTreeMap<RegionId, CancelRegion>,
}

impl WorkflowGraph {
    /// Starts building a graph for `case`.
    pub fn builder(case: impl Into<CaseId>) -> WorkflowBuilder {
        WorkflowBuilder {
            case: case.into(),
            data: serde_json::Value::Null,
            nodes: Vec::new(),
            flows: Vec::new(),
            regions: Vec::new(),
        }
    }

    /// Case this graph runs as.
    #[must_use]
    pub fn case(&self) -> &CaseId {
        &self.case
    }

    /// Case payload.
    #[must_use]
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    /// All nodes in identity order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> + '_ {
        self.nodes.values()
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Looks up a flow.
    #[must_use]
    pub fn flow(&self, id: &FlowId) -> Option<&Flow> {
        self.flows.get(id)
    }

    /// Outgoing flows of `node`, ordered by (ordering, target).
    pub fn outgoing(&self, node: &NodeId) -> impl Iterator<Item = &Flow> + '_ {
        self.flow_list(self.outgoing.get(node))
    }

    /// Incoming flows of `node`, ordered by source.
    pub fn incoming(&self, node: &NodeId) -> impl Iterator<Item = &Flow> + '_ {
        self.flow_list(self.incoming.get(node))
    }

    fn flow_list<'a>(
        &'a self,
        ids: Option<&'a Vec<FlowId>>,
    ) -> impl Iterator<Item = &'a Flow> + 'a {
        ids.into_iter()
            .flatten()
            .filter_map(move |id| self.flows.get(id))
    }

    /// Structural successors in outgoing-flow order.
    #[must_use]
    pub fn successors(&self, node: &NodeId) -> Vec<NodeId> {
        self.outgoing(node).map(|f| f.to.clone()).collect()
    }

    /// Structural predecessors in source order.
    #[must_use]
    pub fn predecessors(&self, node: &NodeId) -> Vec<NodeId> {
        self.incoming(node).map(|f| f.from.clone()).collect()
    }

    /// True when tokens sent into `node` arrive as branch tokens.
    #[must_use]
    pub fn is_join(&self, node: &NodeId) -> bool {
        self.nodes.get(node).is_some_and(|n| n.join.is_join())
    }

    /// Looks up a region.
    #[must_use]
    pub fn region(&self, id: &RegionId) -> Option<&CancelRegion> {
        self.regions.get(id)
    }

    /// All regions in identity order.
    pub fn regions(&self) -> impl Iterator<Item = &CancelRegion> + '_ {
        self.regions.values()
    }

    /// True when some node upstream of `branch` (inclusive, not crossing
    /// `join`) still holds a token, so the branch may yet deliver into `join`.
    #[must_use]
    pub fn upstream_live(&self, branch: &NodeId, join: &NodeId, store: &TripleStore) -> bool {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([branch.clone()]);
        while let Some(node) = queue.pop_front() {
            if node == *join || !seen.insert(node.clone()) {
                continue;
            }
            if store.holds_token(&node) {
                return true;
            }
            queue.extend(self.predecessors(&node));
        }
        false
    }
}

/// Incremental, validating constructor for [`WorkflowGraph`].
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    case: CaseId,
    data: serde_json::Value,
    nodes: Vec<NodeSpec>,
    flows: Vec<Flow>,
    regions: Vec<(RegionId, Vec<NodeId>)>,
}

impl WorkflowBuilder {
    /// Sets the case payload.
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Adds a node.
    pub fn node(mut self, node: impl Into<NodeSpec>) -> Self {
        self.nodes.push(node.into());
        self
    }

    /// Adds a flow.
    pub fn flow(mut self, flow: Flow) -> Self {
        self.flows.push(flow);
        self
    }

    /// Adds an unguarded flow `from -> to`.
    pub fn edge(self, from: &str, to: &str) -> Self {
        self.flow(Flow::new(from, to))
    }

    /// Adds a cancellation region.
    pub fn region(mut self, id: impl Into<RegionId>, members: &[&str]) -> Self {
        self.regions
            .push((id.into(), members.iter().map(|m| NodeId::new(*m)).collect()));
        self
    }

    /// Adds a cancellation region from owned ids.
    pub fn region_of(mut self, id: RegionId, members: Vec<NodeId>) -> Self {
        self.regions.push((id, members));
        self
    }

    /// Validates and freezes the graph.
    pub fn build(self) -> Result<WorkflowGraph, GraphError> {
        let mut nodes = BTreeMap::new();
        for node in self.nodes {
            if node.id.is_reserved() {
                return Err(GraphError::ReservedNodeId(node.id));
            }
            if nodes.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode(node.id));
            }
            nodes.insert(node.id.clone(), node);
        }

        let mut flows = BTreeMap::new();
        let mut pairs = BTreeSet::new();
        for flow in self.flows {
            for end in [&flow.from, &flow.to] {
                if !nodes.contains_key(end) {
                    return Err(GraphError::UnknownFlowNode {
                        flow: flow.id.clone(),
                        node: end.clone(),
                    });
                }
            }
            if !pairs.insert((flow.from.clone(), flow.to.clone())) {
                return Err(GraphError::DuplicateEdge {
                    from: flow.from,
                    to: flow.to,
                });
            }
            if flows.contains_key(&flow.id) {
                return Err(GraphError::DuplicateFlow(flow.id));
            }
            flows.insert(flow.id.clone(), flow);
        }

        let mut outgoing: BTreeMap<NodeId, Vec<FlowId>> = BTreeMap::new();
        let mut incoming: BTreeMap<NodeId, Vec<FlowId>> = BTreeMap::new();
        for flow in flows.values() {
            outgoing.entry(flow.from.clone()).or_default().push(flow.id.clone());
            incoming.entry(flow.to.clone()).or_default().push(flow.id.clone());
        }
        for ids in outgoing.values_mut() {
            ids.sort_by(|a, b| {
                let (fa, fb) = (&flows[a], &flows[b]);
                (fa.ordering, &fa.to, &fa.id).cmp(&(fb.ordering, &fb.to, &fb.id))
            });
        }
        for ids in incoming.values_mut() {
            ids.sort_by(|a, b| (&flows[a].from, a).cmp(&(&flows[b].from, b)));
        }

        let mut regions = BTreeMap::new();
        for (id, members) in self.regions {
            if members.is_empty() {
                return Err(GraphError::EmptyRegion(id));
            }
            if let Some(unknown) = members.iter().find(|m| !nodes.contains_key(*m)) {
                return Err(GraphError::UnknownRegionMember {
                    region: id,
                    node: unknown.clone(),
                });
            }
            if regions.contains_key(&id) {
                return Err(GraphError::DuplicateRegion(id));
            }
            regions.insert(
                id.clone(),
                CancelRegion {
                    id,
                    members: members.into_iter().collect(),
                },
            );
        }

        let graph = WorkflowGraph {
            case: self.case,
            data: self.data,
            nodes,
            flows,
            outgoing,
            incoming,
            regions,
        };
        for node in graph.nodes.values() {
            validate_node(&graph, node)?;
        }
        Ok(graph)
    }
}

fn validate_node(graph: &WorkflowGraph, node: &NodeSpec) -> Result<(), GraphError> {
    if let Some(CancelTarget::Region(region)) = &node.cancels {
        let Some(found) = graph.region(region) else {
            return Err(GraphError::UnknownRegion {
                node: node.id.clone(),
                region: region.clone(),
            });
        };
        if found.members.contains(&node.id) {
            return Err(GraphError::SelfCancellingRegion {
                node: node.id.clone(),
                region: region.clone(),
            });
        }
    }
    if let JoinType::Partial(threshold) = node.join {
        let branches = u32::try_from(graph.incoming(&node.id).count()).unwrap_or(u32::MAX);
        check_threshold(&node.id, threshold, branches)?;
    }
    if let Some(mi) = &node.mi {
        if matches!(node.split, SplitType::Xor | SplitType::Or) {
            return Err(GraphError::MiChoiceSplit(node.id.clone()));
        }
        match &mi.cardinality {
            MiCardinality::Static(0) => return Err(GraphError::ZeroInstances(node.id.clone())),
            MiCardinality::Static(count) => {
                if let MiSync::Quorum(quorum) = mi.sync {
                    check_threshold(&node.id, quorum, *count)?;
                }
            }
            MiCardinality::Dynamic { items } => {
                if items.trim().is_empty() {
                    return Err(GraphError::MissingItems(node.id.clone()));
                }
                if let MiSync::Quorum(quorum) = mi.sync {
                    check_threshold(&node.id, quorum, u32::MAX)?;
                }
            }
        }
    }
    Ok(())
}

fn check_threshold(node: &NodeId, threshold: u32, limit: u32) -> Result<(), GraphError> {
    if threshold == 0 || threshold > limit {
        return Err(GraphError::InvalidThreshold {
            node: node.clone(),
            threshold,
            limit,
        });
    }
    Ok(())
}
