// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use proptest::prelude::*;
use proptest::test_runner::{Config as PropConfig, RngAlgorithm, TestRng, TestRunner};
use wcp_core::{
    JoinType, NoOpReason, NodeSpec, PatternKind, PrecomputedPredicates, SplitType,
    TickReceiptDisposition, WorkflowGraph,
};
use wcp_dry_tests::{discriminator, multi_choice_merge, n, partial_join, EngineTestBuilder};

fn disposition_at<'a>(
    receipt: &'a wcp_core::TickReceipt,
    node: &str,
    pattern: PatternKind,
) -> &'a TickReceiptDisposition {
    &receipt
        .entries()
        .iter()
        .find(|e| e.node == n(node) && e.pattern == pattern)
        .unwrap_or_else(|| panic!("no {pattern} entry for {node}"))
        .disposition
}

#[test]
fn or_join_waits_while_a_selected_branch_is_still_live() {
    let predicates = PrecomputedPredicates::new()
        .with("a->c", true)
        .with("a->x", true);
    let mut engine = EngineTestBuilder::new(multi_choice_merge())
        .with_evaluator(predicates)
        .build()
        .expect("engine");

    engine.tick().expect("split");
    assert!(engine.has_token(&n("c")));
    assert!(engine.has_token(&n("x")));
    engine.tick().expect("c delivers, x advances");
    assert_eq!(engine.branch_tokens(&n("d")), vec![n("c")]);

    let third = engine.tick().expect("join evaluates");
    assert_eq!(
        disposition_at(&third, "d", PatternKind::StructuredSynchronizingMerge),
        &TickReceiptDisposition::NoOp(NoOpReason::ThresholdNotMet)
    );
    assert!(!engine.has_token(&n("d")));

    let fourth = engine.tick().expect("join fires");
    assert!(matches!(
        disposition_at(&fourth, "d", PatternKind::StructuredSynchronizingMerge),
        TickReceiptDisposition::Applied { removed, .. } if *removed == 2
    ));
    assert!(engine.has_token(&n("d")));
    assert!(engine.branch_tokens(&n("d")).is_empty());
}

#[test]
fn or_join_fires_once_unselected_branches_are_dead() {
    let predicates = PrecomputedPredicates::new()
        .with("a->c", true)
        .with("a->x", false);
    let mut engine = EngineTestBuilder::new(multi_choice_merge())
        .with_evaluator(predicates)
        .build()
        .expect("engine");

    engine.tick().expect("split");
    assert!(!engine.has_token(&n("x")));
    engine.tick().expect("c delivers");
    let third = engine.tick().expect("join fires");
    assert!(matches!(
        disposition_at(&third, "d", PatternKind::StructuredSynchronizingMerge),
        TickReceiptDisposition::Applied { removed, .. } if *removed == 1
    ));
    assert!(engine.has_token(&n("d")));
    assert!(engine.tick().expect("settled").converged());
}

#[test]
fn discriminator_fires_on_first_arrival_and_resets_after_the_rest() {
    let mut engine = EngineTestBuilder::new(discriminator(false))
        .build()
        .expect("engine");

    engine.tick().expect("split");
    engine.tick().expect("branches deliver");
    assert_eq!(engine.branch_tokens(&n("d")), vec![n("b"), n("c"), n("e")]);

    engine.tick().expect("first arrival fires");
    assert!(engine.has_token(&n("d")));
    assert!(engine.store().is_latched(&n("d")));
    assert_eq!(engine.branch_tokens(&n("d")), vec![n("c"), n("e")]);

    let absorbing = engine.tick().expect("stragglers absorbed");
    assert_eq!(absorbing.rules_applied(), 1);
    assert!(engine.branch_tokens(&n("d")).is_empty());
    assert!(!engine.store().is_latched(&n("d")));
    assert!(engine.store().absorbed(&n("d")).is_empty());

    assert!(engine.tick().expect("settled").converged());
}

#[test]
fn blocking_discriminator_holds_arrivals_until_reset() {
    let mut engine = EngineTestBuilder::new(discriminator(true))
        .build()
        .expect("engine");

    let history = engine.run_until_converged().expect("converges");
    assert_eq!(history.len(), 4);
    assert_eq!(
        disposition_at(&history[3], "d", PatternKind::BlockingDiscriminator),
        &TickReceiptDisposition::NoOp(NoOpReason::Latched)
    );
    assert!(engine.store().is_latched(&n("d")));
    assert_eq!(engine.branch_tokens(&n("d")), vec![n("c"), n("e")]);

    assert!(engine.reset_discriminator(&n("d")).expect("reset"));
    assert!(!engine.store().is_latched(&n("d")));
    assert!(!engine.reset_discriminator(&n("d")).expect("nothing to clear"));

    let refire = engine.tick().expect("next arrival fires");
    assert_eq!(refire.rules_applied(), 1);
    assert_eq!(engine.branch_tokens(&n("d")), vec![n("e")]);
    assert!(engine.store().is_latched(&n("d")));
}

#[test]
fn partial_join_fires_at_k_and_absorbs_the_rest() {
    let mut engine = EngineTestBuilder::new(partial_join(2))
        .build()
        .expect("engine");

    engine.tick().expect("split");
    engine.tick().expect("branches deliver");
    engine.tick().expect("two of three fire");
    assert!(engine.has_token(&n("d")));
    assert_eq!(engine.branch_tokens(&n("d")), vec![n("e")]);
    assert!(engine.store().is_latched(&n("d")));

    engine.tick().expect("last branch absorbed");
    assert!(engine.branch_tokens(&n("d")).is_empty());
    assert!(!engine.store().is_latched(&n("d")));
}

#[test]
fn partial_join_of_every_branch_resets_in_the_firing_transaction() {
    let mut engine = EngineTestBuilder::new(partial_join(3))
        .build()
        .expect("engine");

    engine.tick().expect("split");
    engine.tick().expect("branches deliver");
    engine.tick().expect("all three fire");
    assert!(engine.has_token(&n("d")));
    assert!(engine.branch_tokens(&n("d")).is_empty());
    assert!(!engine.store().is_latched(&n("d")));
}

#[test]
fn partial_join_threshold_above_fan_in_is_rejected() {
    let err = partial_join(4).build().expect_err("threshold exceeds inputs");
    assert!(matches!(err, wcp_core::GraphError::InvalidThreshold { .. }));
}

fn fan_in(width: usize) -> wcp_core::WorkflowBuilder {
    let mut builder = WorkflowGraph::builder("fan")
        .node(NodeSpec::task("a").split(SplitType::And).with_token())
        .node(NodeSpec::task("z").join(JoinType::And));
    for i in 0..width {
        let branch = format!("b{i}");
        builder = builder
            .node(branch.as_str())
            .edge("a", &branch)
            .edge(&branch, "z");
    }
    builder
}

#[test]
fn and_join_conserves_a_single_token_for_any_fan_in() {
    // Pin the seed so a failure reproduces byte-for-byte.
    let seed_bytes = [
        0x57, 0x43, 0x50, 0x03, 0x4a, 0x4f, 0x49, 0x4e, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66,
        0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60,
        0x70, 0x80,
    ];
    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &seed_bytes);
    let mut runner = TestRunner::new_with_rng(PropConfig::default(), rng);

    runner
        .run(&(1usize..8), |width| {
            let mut engine = EngineTestBuilder::new(fan_in(width))
                .build()
                .expect("engine");
            let history = engine.run_until_converged().expect("converges");
            prop_assert_eq!(history.len(), 4);
            prop_assert!(engine.has_token(&n("z")));
            prop_assert!(engine.branch_tokens(&n("z")).is_empty());
            for i in 0..width {
                let branch = n(&format!("b{i}"));
                prop_assert!(!engine.has_token(&branch));
            }
            Ok(())
        })
        .expect("property holds");
}
