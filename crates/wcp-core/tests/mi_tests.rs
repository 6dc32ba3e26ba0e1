// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::collections::BTreeSet;

use proptest::prelude::*;
use proptest::test_runner::{Config as PropConfig, RngAlgorithm, TestRng, TestRunner};
use serde_json::{json, Value};
use wcp_core::{
    EngineError, ExecError, MiCardinality, MiSpec, MiSync, NoOpReason, NodeId, NodeSpec, Predicate,
    QuadDelta, RuleFault, SplitType, Term, TickReceiptDisposition, Triple, WorkflowGraph,
    STATUS_COMPLETED, STATUS_ENABLED, STATUS_SPAWNED,
};
use wcp_dry_tests::{mi_dynamic, mi_dynamic_synced, mi_static, n, EngineTestBuilder};

const SEED_BYTES: [u8; 32] = [
    0x4d, 0x49, 0x2d, 0x43, 0x41, 0x52, 0x44, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
    0xf0, 0xe1, 0xd2, 0xc3, 0xb4, 0xa5, 0x96, 0x87, 0x78, 0x69, 0x5a, 0x4b, 0x3c, 0x2d, 0x1e, 0x0f,
];

fn instance_ids(base: &str, count: u32) -> BTreeSet<NodeId> {
    (0..count).map(|i| n(base).instance(i)).collect()
}

#[test]
fn static_instances_spawn_then_synchronize() {
    let mut engine = EngineTestBuilder::new(mi_static(3, MiSync::All))
        .build()
        .expect("engine");

    engine.tick().expect("a enables m");
    assert!(engine.has_token(&n("m")));

    engine.tick().expect("spawn");
    let spawned: BTreeSet<NodeId> = engine.instances(&n("m")).into_iter().collect();
    assert_eq!(spawned, instance_ids("m", 3));
    assert!(!engine.has_token(&n("m")));
    let statuses = engine.statuses();
    assert_eq!(statuses[&n("m")], STATUS_SPAWNED);
    assert_eq!(statuses[&n("m#1")], STATUS_ENABLED);
    assert_eq!(
        engine
            .store()
            .objects(&n("m#2"), Predicate::InstanceIndex)
            .next(),
        Some(&Term::Int(2))
    );
    // Design-time instances bind their index, not an item.
    assert!(engine
        .store()
        .objects(&n("m#0"), Predicate::BoundItem)
        .next()
        .is_none());

    engine.tick().expect("synchronize");
    assert!(engine.instances(&n("m")).is_empty());
    assert!(engine.store().triples_of(&n("m#0")).is_empty());
    assert!(engine.has_token(&n("z")));
    assert_eq!(engine.statuses()[&n("m")], STATUS_COMPLETED);

    assert!(engine.tick().expect("settled").converged());
}

#[test]
fn runtime_instances_bind_one_item_each() {
    let mut engine = EngineTestBuilder::new(mi_dynamic(vec![json!("x"), json!({"sku": 7})]))
        .build()
        .expect("engine");

    engine.tick().expect("a enables m");
    engine.tick().expect("spawn");
    let item = |id: &str| {
        engine
            .store()
            .objects(&n(id), Predicate::BoundItem)
            .next()
            .cloned()
    };
    assert_eq!(item("m#0"), Some(Term::Json("\"x\"".to_owned())));
    assert_eq!(item("m#1"), Some(Term::Json(r#"{"sku":7}"#.to_owned())));

    let history = engine.run_until_converged().expect("converges");
    assert_eq!(history.len(), 2);
    assert!(engine.has_token(&n("z")));
    assert!(engine.instances(&n("m")).is_empty());
}

#[test]
fn unsynchronized_instances_release_the_successor_immediately() {
    let mut engine = EngineTestBuilder::new(mi_static(2, MiSync::None))
        .build()
        .expect("engine");

    engine.tick().expect("a enables m");
    engine.tick().expect("spawn and continue");
    assert!(engine.has_token(&n("z")));
    assert_eq!(engine.instances(&n("m")).len(), 2);
    assert_eq!(engine.statuses()[&n("m")], STATUS_COMPLETED);

    assert!(engine.tick().expect("settled").converged());
    assert_eq!(engine.instances(&n("m")).len(), 2);
}

#[test]
fn quorum_completes_at_threshold_and_cancels_the_rest() {
    let mut engine = EngineTestBuilder::new(mi_static(4, MiSync::Quorum(2)))
        .build()
        .expect("engine");

    engine.tick().expect("a enables m");
    engine.tick().expect("spawn");
    engine
        .inject(QuadDelta::new(
            [],
            ["m#1", "m#2", "m#3"].map(|id| Triple::token(n(id))),
        ))
        .expect("instances still working");

    let waiting = engine.tick().expect("below quorum");
    assert_eq!(
        waiting.entries()[0].disposition,
        TickReceiptDisposition::NoOp(NoOpReason::ThresholdNotMet)
    );
    assert_eq!(engine.instances(&n("m")).len(), 4);

    engine
        .inject(QuadDelta::new([Triple::token(n("m#2"))], []))
        .expect("second instance completes");
    engine.tick().expect("quorum reached");
    assert!(engine.instances(&n("m")).is_empty());
    assert!(engine.store().triples_of(&n("m#3")).is_empty());
    assert!(engine.has_token(&n("z")));
}

#[test]
fn instance_bound_fails_the_spawn_and_leaves_state_alone() {
    let mut engine = EngineTestBuilder::new(mi_static(5, MiSync::All))
        .with_max_instances(3)
        .build()
        .expect("engine");

    engine.tick().expect("a enables m");
    let root = engine.state_root();
    let receipt = engine.tick().expect("tick completes");
    assert!(receipt.is_partial());
    assert!(receipt.converged());
    let fault = receipt.faults().next().expect("one fault");
    assert!(matches!(
        &fault.disposition,
        TickReceiptDisposition::Failed(RuleFault::Exec(ExecError::InstanceLimit {
            requested: 5,
            limit: 3,
            ..
        }))
    ));
    assert_eq!(engine.state_root(), root);
    assert!(engine.has_token(&n("m")));
    assert!(engine.instances(&n("m")).is_empty());
}

#[test]
fn halt_on_fault_surfaces_the_failure_as_an_error() {
    // `b` sorts before `m`, so its sequence step commits before the spawn fails.
    let workflow = WorkflowGraph::builder("halt")
        .node(NodeSpec::task("a").split(SplitType::And).with_token())
        .node("b")
        .node("b2")
        .node(NodeSpec::task("m").multi_instance(MiSpec {
            cardinality: MiCardinality::Static(5),
            sync: MiSync::All,
            binding: None,
        }))
        .node("z")
        .edge("a", "b")
        .edge("a", "m")
        .edge("b", "b2")
        .edge("m", "z");
    let mut engine = EngineTestBuilder::new(workflow)
        .with_max_instances(3)
        .halting_on_fault()
        .build()
        .expect("engine");

    engine.tick().expect("a splits into b and m");
    let err = engine.tick().expect_err("halts");
    let EngineError::Fault {
        tick,
        node,
        fault,
        receipt,
    } = err
    else {
        panic!("expected Fault, got {err:?}");
    };
    assert_eq!(tick, 2);
    assert_eq!(node, n("m"));
    assert!(matches!(fault, RuleFault::Exec(ExecError::InstanceLimit { .. })));
    assert_eq!(engine.tick_number(), 2);
    assert_eq!(engine.state(), wcp_core::ControllerState::Idle);

    // The sequence step that committed before the halt is still reported.
    assert_eq!(receipt.tick_number(), 2);
    assert!(receipt.is_partial());
    assert_eq!(receipt.rules_applied(), 1);
    let nodes: Vec<NodeId> = receipt.entries().iter().map(|e| e.node.clone()).collect();
    assert_eq!(nodes, vec![n("b"), n("m")]);
    assert!(matches!(
        receipt.entries()[0].disposition,
        TickReceiptDisposition::Applied { .. }
    ));
    assert!(matches!(
        &receipt.entries()[1].disposition,
        TickReceiptDisposition::Failed(RuleFault::Exec(ExecError::InstanceLimit { .. }))
    ));
    assert!(engine.has_token(&n("b2")));
    assert!(!engine.has_token(&n("b")));
    assert_eq!(receipt.state_root(), engine.state_root());
}

#[test]
fn runtime_quorum_above_the_item_count_fails_the_spawn() {
    let workflow = mi_dynamic_synced(vec![json!("x"), json!("y")], MiSync::Quorum(3));
    let mut engine = EngineTestBuilder::new(workflow).build().expect("engine");

    engine.tick().expect("a enables m");
    let root = engine.state_root();
    let receipt = engine.tick().expect("tick completes");
    assert!(receipt.is_partial());
    assert!(matches!(
        &receipt.entries()[0].disposition,
        TickReceiptDisposition::Failed(RuleFault::Exec(ExecError::QuorumExceedsInstances {
            quorum: 3,
            instances: 2,
            ..
        }))
    ));
    assert_eq!(engine.state_root(), root);
    assert!(engine.has_token(&n("m")));
    assert!(engine.instances(&n("m")).is_empty());
}

#[test]
fn runtime_quorum_equal_to_the_item_count_completes() {
    let workflow = mi_dynamic_synced(vec![json!("x"), json!("y")], MiSync::Quorum(2));
    let mut engine = EngineTestBuilder::new(workflow).build().expect("engine");

    let history = engine.run_until_converged().expect("converges");
    assert!(history.iter().all(|r| !r.is_partial()));
    assert!(engine.has_token(&n("z")));
    assert!(engine.instances(&n("m")).is_empty());
}

#[test]
fn empty_item_list_is_a_fault_not_a_silent_completion() {
    let mut engine = EngineTestBuilder::new(mi_dynamic(Vec::new()))
        .build()
        .expect("engine");

    engine.tick().expect("a enables m");
    let receipt = engine.tick().expect("tick completes");
    assert!(matches!(
        &receipt.entries()[0].disposition,
        TickReceiptDisposition::Failed(RuleFault::Exec(ExecError::EmptyItemList { .. }))
    ));
    assert!(!engine.has_token(&n("z")));
}

#[test]
fn missing_item_list_is_reported() {
    let workflow = mi_dynamic(vec![json!(1)]).data(json!({ "other": [1, 2] }));
    let mut engine = EngineTestBuilder::new(workflow).build().expect("engine");

    engine.tick().expect("a enables m");
    let receipt = engine.tick().expect("tick completes");
    assert!(matches!(
        &receipt.entries()[0].disposition,
        TickReceiptDisposition::Failed(RuleFault::Exec(ExecError::MissingItems { .. }))
    ));
}

#[test]
fn static_cardinality_matches_the_declared_count() {
    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &SEED_BYTES);
    let mut runner = TestRunner::new_with_rng(PropConfig::default(), rng);

    runner
        .run(&(1u32..=24), |count| {
            let mut engine = EngineTestBuilder::new(mi_static(count, MiSync::All))
                .build()
                .expect("engine");
            engine.tick().expect("a enables m");
            engine.tick().expect("spawn");
            let spawned: BTreeSet<NodeId> = engine.instances(&n("m")).into_iter().collect();
            prop_assert_eq!(spawned, instance_ids("m", count));

            engine.run_until_converged().expect("converges");
            prop_assert!(engine.instances(&n("m")).is_empty());
            prop_assert!(engine.has_token(&n("z")));
            Ok(())
        })
        .expect("property holds");
}

#[test]
fn dynamic_cardinality_matches_the_item_count() {
    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &SEED_BYTES);
    let mut runner = TestRunner::new_with_rng(PropConfig::default(), rng);
    let items = prop::collection::vec(any::<i64>().prop_map(Value::from), 1..16);

    runner
        .run(&items, |items| {
            let expected = u32::try_from(items.len()).expect("small");
            let mut engine = EngineTestBuilder::new(mi_dynamic(items.clone()))
                .build()
                .expect("engine");
            engine.tick().expect("a enables m");
            engine.tick().expect("spawn");
            prop_assert_eq!(
                engine.instances(&n("m")).into_iter().collect::<BTreeSet<_>>(),
                instance_ids("m", expected)
            );
            for (i, item) in items.iter().enumerate() {
                let id = n("m").instance(u32::try_from(i).expect("small"));
                let bound = engine
                    .store()
                    .objects(&id, Predicate::BoundItem)
                    .next()
                    .cloned();
                prop_assert_eq!(bound, Some(Term::Json(item.to_string())));
            }
            Ok(())
        })
        .expect("property holds");
}
