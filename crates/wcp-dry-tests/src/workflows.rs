// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical workflow fixtures, one per control pattern family.
//!
//! Every fixture returns an unbuilt [`WorkflowBuilder`] so tests can extend it
//! before validation. Node names are chosen so that canonical (lexicographic)
//! order matches the order a test expects rules to run in.

use serde_json::Value;
use wcp_core::{
    CancelTarget, Flow, JoinType, MiCardinality, MiSpec, MiSync, NodeId, NodeSpec, RegionId,
    SplitType, WorkflowBuilder, WorkflowGraph,
};

/// Shorthand for a node id.
pub fn n(label: &str) -> NodeId {
    NodeId::from(label)
}

/// Linear chain over `labels`. The first node holds the initial token.
pub fn sequence(labels: &[&str]) -> WorkflowBuilder {
    let mut builder = WorkflowGraph::builder("sequence");
    for (i, label) in labels.iter().enumerate() {
        let node = NodeSpec::task(*label);
        builder = builder.node(if i == 0 { node.with_token() } else { node });
    }
    for pair in labels.windows(2) {
        builder = builder.edge(pair[0], pair[1]);
    }
    builder
}

/// `a` (AND-split, tokened) → {`b`, `c`} → `d` (AND-join).
pub fn and_split_join() -> WorkflowBuilder {
    WorkflowGraph::builder("and")
        .node(NodeSpec::task("a").split(SplitType::And).with_token())
        .node("b")
        .node("c")
        .node(NodeSpec::task("d").join(JoinType::And))
        .edge("a", "b")
        .edge("a", "c")
        .edge("b", "d")
        .edge("c", "d")
}

/// `a` (XOR-split, tokened) → `b` guarded by `go_b` (ordering 0) or `c`
/// guarded by `go_c` (ordering 1).
pub fn exclusive_choice() -> WorkflowBuilder {
    WorkflowGraph::builder("xor")
        .node(NodeSpec::task("a").split(SplitType::Xor).with_token())
        .node("b")
        .node("c")
        .flow(Flow::new("a", "b").guarded("go_b").ordered(0))
        .flow(Flow::new("a", "c").guarded("go_c").ordered(1))
}

/// `a` (OR-split, tokened) → `c` (`go_c`) | `x` (`go_x`) → `d` (OR-join).
///
/// `c` feeds `d` directly while `x` passes through `x1`. Both sort around `d`
/// so that `d` sees `c`'s arrival while `x1` still holds its token.
pub fn multi_choice_merge() -> WorkflowBuilder {
    WorkflowGraph::builder("or")
        .node(NodeSpec::task("a").split(SplitType::Or).with_token())
        .node("c")
        .node(NodeSpec::task("d").join(JoinType::Or))
        .node("x")
        .node("x1")
        .flow(Flow::new("a", "c").guarded("go_c"))
        .flow(Flow::new("a", "x").guarded("go_x"))
        .edge("c", "d")
        .edge("x", "x1")
        .edge("x1", "d")
}

fn fan_in(case: &str, join: JoinType) -> WorkflowBuilder {
    WorkflowGraph::builder(case)
        .node(NodeSpec::task("a").split(SplitType::And).with_token())
        .node("b")
        .node("c")
        .node("e")
        .node(NodeSpec::task("d").join(join))
        .edge("a", "b")
        .edge("a", "c")
        .edge("a", "e")
        .edge("b", "d")
        .edge("c", "d")
        .edge("e", "d")
}

/// `a` (AND-split, tokened) → {`b`, `c`, `e`} → `d` (discriminator).
pub fn discriminator(blocking: bool) -> WorkflowBuilder {
    let join = if blocking {
        JoinType::BlockingDiscriminator
    } else {
        JoinType::Discriminator
    };
    fan_in("discriminator", join)
}

/// `a` (AND-split, tokened) → {`b`, `c`, `e`} → `d` (partial join of `k`).
pub fn partial_join(k: u32) -> WorkflowBuilder {
    fan_in("partial", JoinType::Partial(k))
}

fn mi_chain(case: &str, mi: MiSpec) -> WorkflowBuilder {
    WorkflowGraph::builder(case)
        .node(NodeSpec::task("a").with_token())
        .node(NodeSpec::task("m").multi_instance(mi))
        .node("z")
        .edge("a", "m")
        .edge("m", "z")
}

/// `a` (tokened) → `m` (static MI of `count`, synchronized by `sync`) → `z`.
pub fn mi_static(count: u32, sync: MiSync) -> WorkflowBuilder {
    mi_chain(
        "mi-static",
        MiSpec {
            cardinality: MiCardinality::Static(count),
            sync,
            binding: None,
        },
    )
}

/// `a` (tokened) → `m` (dynamic MI over `data.items`, fully synchronized) → `z`.
pub fn mi_dynamic(items: Vec<Value>) -> WorkflowBuilder {
    mi_dynamic_synced(items, MiSync::All)
}

/// [`mi_dynamic`] synchronized by `sync`.
pub fn mi_dynamic_synced(items: Vec<Value>, sync: MiSync) -> WorkflowBuilder {
    mi_chain(
        "mi-dynamic",
        MiSpec {
            cardinality: MiCardinality::Dynamic {
                items: "items".to_owned(),
            },
            sync,
            binding: None,
        },
    )
    .data(serde_json::json!({ "items": items }))
}

/// `start` (AND-split, tokened) → {`a-cancel`, `b`, `c`, `x`}; region `r`
/// holds `b` and `c`, and `a-cancel` voids it. `b`, `c` and `x` each lead to
/// a sink (`b2`, `c2`, `x2`).
///
/// `a-cancel` sorts before `b`, so in the tick after the split the region is
/// voided before `b`'s own sequence runs.
pub fn cancel_region() -> WorkflowBuilder {
    WorkflowGraph::builder("region")
        .node(NodeSpec::task("start").split(SplitType::And).with_token())
        .node(NodeSpec::task("a-cancel").cancelling(CancelTarget::Region(RegionId::from("r"))))
        .node("b")
        .node("b2")
        .node("c")
        .node("c2")
        .node("x")
        .node("x2")
        .edge("start", "a-cancel")
        .edge("start", "b")
        .edge("start", "c")
        .edge("start", "x")
        .edge("b", "b2")
        .edge("c", "c2")
        .edge("x", "x2")
        .region("r", &["b", "c"])
}

/// `start` (AND-split, tokened) → {`a-stop`, `b`}; `a-stop` cancels the case.
/// `b` leads to `b2`.
pub fn cancel_case() -> WorkflowBuilder {
    WorkflowGraph::builder("case")
        .node(NodeSpec::task("start").split(SplitType::And).with_token())
        .node(NodeSpec::task("a-stop").cancelling(CancelTarget::Case))
        .node("b")
        .node("b2")
        .edge("start", "a-stop")
        .edge("start", "b")
        .edge("b", "b2")
}
