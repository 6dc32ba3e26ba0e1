// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use wcp_core::{
    EngineError, JoinType, NodeSpec, QuadDelta, TickReceiptDisposition, Triple, TxError, TxOutcome,
    WorkflowGraph,
    STATUS_COMPLETED, STATUS_ENABLED, STATUS_PENDING,
};
use wcp_dry_tests::{and_split_join, n, sequence, EngineTestBuilder};

#[test]
fn sequence_moves_one_step_per_tick_and_converges_on_tick_three() {
    let mut engine = EngineTestBuilder::new(sequence(&["a", "b", "c"]))
        .build()
        .expect("engine");

    let receipts = engine.run_to_completion(10).expect("converges");
    assert_eq!(receipts.len(), 3);
    assert_eq!(receipts[0].tick_number(), 1);
    assert_eq!(receipts[0].rules_applied(), 1);
    assert!(!receipts[0].converged());
    assert!(!receipts[1].converged());
    assert!(receipts[2].converged());
    assert_eq!(receipts[2].delta(), 0);
    assert_eq!(receipts[2].rules_applied(), 0);

    assert!(!engine.has_token(&n("a")));
    assert!(!engine.has_token(&n("b")));
    assert!(engine.has_token(&n("c")));

    let statuses = engine.statuses();
    assert_eq!(statuses[&n("a")], STATUS_COMPLETED);
    assert_eq!(statuses[&n("b")], STATUS_COMPLETED);
    assert_eq!(statuses[&n("c")], STATUS_ENABLED);
}

#[test]
fn first_tick_hands_the_token_from_a_to_b() {
    let mut engine = EngineTestBuilder::new(sequence(&["a", "b", "c"]))
        .build()
        .expect("engine");
    let before = engine.store().len();

    let receipt = engine.tick().expect("tick");
    assert_eq!(receipt.triples_before(), before);
    assert_eq!(receipt.triples_after(), engine.store().len());
    assert!(engine.has_token(&n("b")));
    assert!(!engine.has_token(&n("a")));
    assert_eq!(engine.statuses()[&n("c")], STATUS_PENDING);
}

#[test]
fn re_ticking_a_converged_graph_is_idempotent() {
    let mut engine = EngineTestBuilder::new(and_split_join())
        .build()
        .expect("engine");
    engine.run_until_converged().expect("converges");
    let root = engine.state_root();

    for _ in 0..3 {
        let receipt = engine.tick().expect("tick");
        assert_eq!(receipt.delta(), 0);
        assert!(receipt.converged());
        assert_eq!(engine.state_root(), root);
    }
}

#[test]
fn and_split_grants_every_branch_in_a_single_application() {
    let mut engine = EngineTestBuilder::new(and_split_join())
        .build()
        .expect("engine");

    let receipt = engine.tick().expect("tick");
    assert_eq!(receipt.rules_applied(), 1);
    assert_eq!(receipt.entries().len(), 1);
    assert!(engine.has_token(&n("b")));
    assert!(engine.has_token(&n("c")));
    assert!(!engine.has_token(&n("a")));
}

#[test]
fn and_join_waits_for_the_missing_branch() {
    let workflow = WorkflowGraph::builder("join")
        .node(NodeSpec::task("b").with_token())
        .node("c")
        .node(NodeSpec::task("d").join(JoinType::And))
        .edge("b", "d")
        .edge("c", "d");
    let mut engine = EngineTestBuilder::new(workflow).build().expect("engine");

    engine.tick().expect("b delivers");
    assert_eq!(engine.branch_tokens(&n("d")), vec![n("b")]);

    let waiting = engine.tick().expect("join evaluates");
    assert_eq!(waiting.delta(), 0);
    assert!(waiting.converged());
    assert!(!engine.has_token(&n("d")));

    engine
        .inject(QuadDelta::new([Triple::token(n("c"))], []))
        .expect("inject");
    engine.tick().expect("c delivers and d fires");

    assert!(engine.has_token(&n("d")));
    assert!(engine.branch_tokens(&n("d")).is_empty());
}

#[test]
fn a_loop_without_fixed_point_exhausts_the_budget() {
    let workflow = WorkflowGraph::builder("loop")
        .node(NodeSpec::task("a").join(JoinType::Xor).with_token())
        .node("b")
        .edge("a", "b")
        .edge("b", "a");
    let mut engine = EngineTestBuilder::new(workflow).build().expect("engine");

    let err = engine.run_to_completion(5).expect_err("never converges");
    let EngineError::ConvergenceTimeout(timeout) = err else {
        panic!("expected ConvergenceTimeout, got {err:?}");
    };
    assert_eq!(timeout.ticks, 5);
    assert_eq!(timeout.history.len(), 5);
    assert_eq!(timeout.last().map(|r| r.tick_number()), Some(5));
    assert_eq!(engine.tick_number(), 5);
}

#[test]
fn run_until_converged_uses_the_configured_budget() {
    let workflow = WorkflowGraph::builder("loop")
        .node(NodeSpec::task("a").join(JoinType::Xor).with_token())
        .node("b")
        .edge("a", "b")
        .edge("b", "a");
    let mut engine = EngineTestBuilder::new(workflow)
        .with_tick_budget(3)
        .build()
        .expect("engine");

    assert!(matches!(
        engine.run_until_converged(),
        Err(EngineError::ConvergenceTimeout(t)) if t.ticks == 3
    ));
}

#[test]
fn identical_runs_produce_identical_receipt_digests() {
    let run = || {
        let mut engine = EngineTestBuilder::new(and_split_join())
            .build()
            .expect("engine");
        engine
            .run_until_converged()
            .expect("converges")
            .iter()
            .map(|r| (r.digest(), r.state_root()))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn injected_token_removal_of_an_absent_token_is_rejected() {
    let mut engine = EngineTestBuilder::new(sequence(&["a", "b"]))
        .build()
        .expect("engine");
    let root = engine.state_root();

    let err = engine
        .inject(QuadDelta::new([], [Triple::token(n("b"))]))
        .expect_err("b holds no token");
    assert!(matches!(err, EngineError::Tx(_)));
    assert_eq!(engine.state_root(), root);
    let last = engine.provenance().last().expect("recorded");
    assert!(matches!(last.outcome, TxOutcome::Rejected(TxError::DoubleFireGuard(_))));
    assert!(last.additions.is_empty() && last.removals.is_empty());
}

#[test]
fn applied_entries_report_their_counts() {
    let mut engine = EngineTestBuilder::new(sequence(&["a", "b"]))
        .build()
        .expect("engine");
    let receipt = engine.tick().expect("tick");
    let entry = &receipt.entries()[0];
    let TickReceiptDisposition::Applied { added, removed } = entry.disposition else {
        panic!("expected applied entry, got {:?}", entry.disposition);
    };
    assert_eq!(receipt.churn(), added + removed);
    assert!(entry.rule_id.is_some());
    assert!(entry.tx.is_some());
}
