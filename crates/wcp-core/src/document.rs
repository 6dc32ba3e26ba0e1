// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Serialized workflow documents (YAML or JSON).
//!
//! ```yaml
//! case: order-7
//! data: { approved: true }
//! nodes:
//!   - { id: a, split: and, token: true }
//!   - id: review
//!     mi: { cardinality: dynamic, items: lines, sync: all }
//!   - { id: d, join: and }
//! flows:
//!   - { from: a, to: review }
//!   - { from: review, to: d }
//! ```
use serde::Deserialize;

use crate::ident::{CaseId, FlowId, NodeId, RegionId};
use crate::workflow::{
    CancelTarget, Flow, GraphError, InstanceBinding, JoinType, MiCardinality, MiSpec, MiSync,
    NodeKind, NodeSpec, SplitType, WorkflowGraph,
};

/// Top-level workflow document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDocument {
    /// Case identity.
    pub case: String,
    /// Case payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Node declarations.
    pub nodes: Vec<NodeDocument>,
    /// Flow declarations.
    #[serde(default)]
    pub flows: Vec<FlowDocument>,
    /// Cancellation regions.
    #[serde(default)]
    pub regions: Vec<RegionDocument>,
}

/// One node declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDocument {
    /// Node identity.
    pub id: String,
    /// Task or condition.
    #[serde(default)]
    pub kind: NodeKind,
    /// Outgoing behaviour.
    #[serde(default)]
    pub split: SplitType,
    /// Incoming behaviour.
    #[serde(default)]
    pub join: JoinKind,
    /// Partial join threshold.
    #[serde(default)]
    pub threshold: Option<u32>,
    /// Multiple-instance annotation.
    #[serde(default)]
    pub mi: Option<MiDocument>,
    /// Cancellation annotation.
    #[serde(default)]
    pub cancels: Option<CancelDocument>,
    /// Receives a token at genesis.
    #[serde(default)]
    pub token: bool,
}

/// Join annotation as written in documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// No convergence.
    #[default]
    None,
    /// AND-join.
    And,
    /// XOR-join.
    Xor,
    /// OR-join.
    Or,
    /// Structured discriminator.
    Discriminator,
    /// Blocking discriminator.
    BlockingDiscriminator,
    /// Partial join, requires `threshold`.
    Partial,
}

/// Multiple-instance annotation as written in documents.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MiDocument {
    /// `static` or `dynamic`.
    pub cardinality: CardinalityKind,
    /// Static instance count.
    #[serde(default)]
    pub count: Option<u32>,
    /// Payload key of the item list.
    #[serde(default)]
    pub items: Option<String>,
    /// Synchronization policy.
    #[serde(default)]
    pub sync: SyncKind,
    /// Quorum for `sync: quorum`.
    #[serde(default)]
    pub quorum: Option<u32>,
    /// Per-instance binding override.
    #[serde(default)]
    pub binding: Option<InstanceBinding>,
}

/// Instance-count policy as written in documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardinalityKind {
    /// Design-time count.
    Static,
    /// Runtime item list.
    Dynamic,
}

/// Synchronization policy as written in documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    /// Not awaited.
    #[default]
    None,
    /// Every instance.
    All,
    /// First `quorum` instances.
    Quorum,
}

/// Cancellation annotation: exactly one of `region` or `case: true`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelDocument {
    /// Region to void.
    #[serde(default)]
    pub region: Option<String>,
    /// Void the whole case.
    #[serde(default)]
    pub case: bool,
}

/// One flow declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowDocument {
    /// Explicit id, defaults to `from->to`.
    #[serde(default)]
    pub id: Option<String>,
    /// Source.
    pub from: String,
    /// Target.
    pub to: String,
    /// Guard expression.
    #[serde(default)]
    pub predicate: Option<String>,
    /// Tie-breaking key.
    #[serde(default)]
    pub ordering: i64,
}

/// One cancellation region.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionDocument {
    /// Region identity.
    pub id: String,
    /// Member node ids.
    pub members: Vec<String>,
}

impl WorkflowDocument {
    /// Parses a YAML document.
    pub fn from_yaml_str(src: &str) -> Result<Self, GraphError> {
        Ok(serde_yaml::from_str(src)?)
    }

    /// Parses a JSON document.
    pub fn from_json_str(src: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(src)?)
    }

    /// Converts the document into a validated graph.
    pub fn into_graph(self) -> Result<WorkflowGraph, GraphError> {
        let mut builder = WorkflowGraph::builder(CaseId::new(self.case)).data(self.data);
        for node in self.nodes {
            builder = builder.node(node.into_spec()?);
        }
        for flow in self.flows {
            let mut spec =
                Flow::new(NodeId::new(flow.from), NodeId::new(flow.to)).ordered(flow.ordering);
            if let Some(id) = flow.id {
                spec = spec.named(FlowId::new(id));
            }
            if let Some(predicate) = flow.predicate {
                spec = spec.guarded(predicate);
            }
            builder = builder.flow(spec);
        }
        for region in self.regions {
            builder = builder.region_of(
                RegionId::new(region.id),
                region.members.into_iter().map(NodeId::new).collect(),
            );
        }
        builder.build()
    }
}

impl NodeDocument {
    fn into_spec(self) -> Result<NodeSpec, GraphError> {
        let id = NodeId::new(self.id);
        let invalid = |reason| GraphError::InvalidNode {
            node: id.clone(),
            reason,
        };
        let join = match (self.join, self.threshold) {
            (JoinKind::Partial, Some(n)) => JoinType::Partial(n),
            (JoinKind::Partial, None) => return Err(invalid("partial join requires a threshold")),
            (_, Some(_)) => return Err(invalid("threshold is only valid on partial joins")),
            (JoinKind::None, None) => JoinType::None,
            (JoinKind::And, None) => JoinType::And,
            (JoinKind::Xor, None) => JoinType::Xor,
            (JoinKind::Or, None) => JoinType::Or,
            (JoinKind::Discriminator, None) => JoinType::Discriminator,
            (JoinKind::BlockingDiscriminator, None) => JoinType::BlockingDiscriminator,
        };
        let mi = match self.mi {
            None => None,
            Some(mi) => {
                let cardinality = match (mi.cardinality, mi.count, mi.items) {
                    (CardinalityKind::Static, Some(count), None) => MiCardinality::Static(count),
                    (CardinalityKind::Dynamic, None, Some(items)) => {
                        MiCardinality::Dynamic { items }
                    }
                    (CardinalityKind::Dynamic, None, None) => {
                        return Err(GraphError::MissingItems(id.clone()));
                    }
                    (CardinalityKind::Static, None, _) => {
                        return Err(invalid("static instances require a count"));
                    }
                    _ => return Err(invalid("count and items are mutually exclusive")),
                };
                let sync = match (mi.sync, mi.quorum) {
                    (SyncKind::Quorum, Some(n)) => MiSync::Quorum(n),
                    (SyncKind::Quorum, None) => {
                        return Err(invalid("quorum sync requires a quorum"));
                    }
                    (_, Some(_)) => return Err(invalid("quorum is only valid with quorum sync")),
                    (SyncKind::None, None) => MiSync::None,
                    (SyncKind::All, None) => MiSync::All,
                };
                Some(MiSpec {
                    cardinality,
                    sync,
                    binding: mi.binding,
                })
            }
        };
        let cancels = match self.cancels {
            None => None,
            Some(CancelDocument {
                region: Some(region),
                case: false,
            }) => Some(CancelTarget::Region(RegionId::new(region))),
            Some(CancelDocument {
                region: None,
                case: true,
            }) => Some(CancelTarget::Case),
            Some(_) => return Err(invalid("cancels must name exactly one of region or case")),
        };
        Ok(NodeSpec {
            id,
            kind: self.kind,
            split: self.split,
            join,
            mi,
            cancels,
            initial_token: self.token,
        })
    }
}

/// Parses and validates a YAML workflow document.
pub fn load_yaml(src: &str) -> Result<WorkflowGraph, GraphError> {
    WorkflowDocument::from_yaml_str(src)?.into_graph()
}

/// Parses and validates a JSON workflow document.
pub fn load_json(src: &str) -> Result<WorkflowGraph, GraphError> {
    WorkflowDocument::from_json_str(src)?.into_graph()
}
