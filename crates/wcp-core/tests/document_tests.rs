// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use wcp_core::{
    load_json, ConfigService, Engine, EngineError, GraphError, KernelConfig, STATUS_COMPLETED,
    STATUS_ENABLED, STATUS_PENDING,
};
use wcp_dry_tests::{n, InMemoryConfigStore};

const FULFILMENT: &str = r#"
case: order-9
data:
  lines: [l1, l2]
  express: true
nodes:
  - { id: start, split: and, token: true }
  - id: pick
    mi: { cardinality: dynamic, items: lines, sync: all }
  - { id: invoice }
  - { id: ship, join: and, split: xor }
  - { id: courier }
  - { id: post }
flows:
  - { from: start, to: pick }
  - { from: start, to: invoice }
  - { from: pick, to: ship }
  - { from: invoice, to: ship }
  - { from: ship, to: courier, predicate: express, ordering: 0 }
  - { from: ship, to: post, predicate: "!express", ordering: 1 }
"#;

#[test]
fn yaml_workflow_runs_end_to_end() {
    let mut engine = Engine::from_yaml_str(FULFILMENT, KernelConfig::default()).expect("engine");

    let history = engine.run_until_converged().expect("converges");
    assert_eq!(history.len(), 5);
    assert_eq!(history[1].tick_number(), 2);
    // Tick 3 drains the instances and the join fires behind them.
    assert_eq!(history[2].rules_applied(), 2);

    let statuses = engine.statuses();
    for id in ["start", "pick", "invoice", "ship"] {
        assert_eq!(statuses[&n(id)], STATUS_COMPLETED, "{id}");
    }
    assert_eq!(statuses[&n("courier")], STATUS_ENABLED);
    assert_eq!(statuses[&n("post")], STATUS_PENDING);
    assert!(engine.instances(&n("pick")).is_empty());
}

#[test]
fn json_workflow_follows_the_payload_guard() {
    let src = r#"{
        "case": "order-10",
        "data": {"express": false},
        "nodes": [
            {"id": "ship", "split": "xor", "token": true},
            {"id": "courier"},
            {"id": "post"}
        ],
        "flows": [
            {"from": "ship", "to": "courier", "predicate": "express"},
            {"from": "ship", "to": "post", "predicate": "!express", "ordering": 1}
        ]
    }"#;
    let graph = load_json(src).expect("document");
    let mut engine = Engine::with_builtin_rules(graph, KernelConfig::default()).expect("engine");

    engine.run_until_converged().expect("converges");
    assert!(engine.has_token(&n("post")));
    assert!(!engine.has_token(&n("courier")));
}

#[test]
fn invalid_documents_surface_as_engine_errors() {
    let src = "case: c\nnodes:\n  - { id: a }\nflows:\n  - { from: a, to: nowhere }\n";
    let err = Engine::from_yaml_str(src, KernelConfig::default()).expect_err("dangling flow");
    assert!(matches!(err, EngineError::Graph(_)));
}

#[test]
fn documents_cannot_declare_generated_instance_ids() {
    let src = r#"
case: c
nodes:
  - { id: a, token: true }
  - id: m
    mi: { cardinality: static, count: 2, sync: all }
  - { id: "m#0" }
flows:
  - { from: a, to: m }
"#;
    let err = Engine::from_yaml_str(src, KernelConfig::default()).expect_err("reserved id");
    assert!(matches!(
        err,
        EngineError::Graph(GraphError::ReservedNodeId(ref id)) if id.as_str() == "m#0"
    ));
}

#[test]
fn stored_kernel_config_bounds_the_run() {
    let store = InMemoryConfigStore::with_entry("kernel", br#"{"tick_budget": 4}"#);
    let service = ConfigService::new(store);
    let config = service.load_kernel_config().expect("config");
    assert_eq!(config.tick_budget, 4);
    assert_eq!(config.max_instances, KernelConfig::default().max_instances);

    let mut engine = Engine::from_yaml_str(FULFILMENT, config).expect("engine");
    let err = engine.run_until_converged().expect_err("five ticks needed");
    assert!(matches!(err, EngineError::ConvergenceTimeout(t) if t.ticks == 4));
}

#[test]
fn invalid_kernel_config_is_refused_at_construction() {
    let config = KernelConfig {
        max_instances: 0,
        ..KernelConfig::default()
    };
    let err = Engine::from_yaml_str(FULFILMENT, config).expect_err("zero bound");
    assert!(matches!(err, EngineError::Config(_)));
}
