// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! wcp-core: declarative workflow control-pattern kernel.
//!
//! A workflow graph annotated with split, join, multi-instance and
//! cancellation types is compiled into pattern occurrences. Each externally
//! commanded tick resolves the applicable occurrences through a rule catalog
//! into one of four verbs (COPY, AWAIT, FILTER, VOID) and applies the
//! resulting quad deltas to a typed triple store, one transaction per rule.
#![forbid(unsafe_code)]

mod binding;
mod catalog;
mod config;
mod delta;
/// Serde models for YAML/JSON workflow documents.
pub mod document;
mod engine;
mod executor;
mod ident;
mod pattern;
mod predicate;
mod provenance;
mod receipt;
mod resolver;
mod store;
mod telemetry;
/// Execution template language: placeholders, target queries, mutations.
pub mod template;
mod triple;
mod tx;
mod verb;
mod workflow;

// Re-exports for stable public API
/// Typed placeholder bindings.
pub use binding::{Binding, BindingError, Bindings, MiInstance};
/// Rule catalog and its load-time errors.
pub use catalog::{
    CardinalityMode, CatalogError, RuleEntry, RuleKey, RuleStore, ScopeMode, ThresholdMode,
    VerbSpec, BUILTIN_CATALOG,
};
/// Kernel configuration and the config service port.
pub use config::{ConfigError, ConfigService, ConfigStore, KernelConfig, KERNEL_CONFIG_KEY};
/// Quad deltas, the sole unit of state mutation.
pub use delta::{DeltaBuilder, QuadDelta};
pub use document::{load_json, load_yaml, WorkflowDocument};
/// Tick controller.
pub use engine::{ControllerState, ConvergenceTimeout, Engine, EngineError};
/// Verb executor.
pub use executor::{ExecError, Execution, NoOpReason, VerbExecutor};
/// Identifiers and the rule id hash.
pub use ident::{make_rule_id, CaseId, FlowId, Hash, NodeId, RegionId};
/// Pattern occurrences and triggers.
pub use pattern::{derive_occurrences, Occurrence, PatternKind, Trigger};
/// Guard evaluation seam.
pub use predicate::{
    PayloadFlagEvaluator, PrecomputedPredicates, PredicateError, PredicateEvaluator,
};
/// Transactions and provenance.
pub use provenance::{
    Applied, ProvenanceLog, RuleFault, TransactionRecord, TxError, TxOrigin, TxOutcome,
};
/// Tick receipts.
pub use receipt::{
    SkipReason, TickReceipt, TickReceiptDisposition, TickReceiptEntry, TickSummary,
};
pub use resolver::{ResolveError, VerbResolver};
pub use store::TripleStore;
pub use template::{ExecutionTemplate, Placeholder, TemplateParseError};
/// State vocabulary.
pub use triple::{
    Predicate, Term, Triple, STATUS_COMPLETED, STATUS_ENABLED, STATUS_PENDING, STATUS_SPAWNED,
    STATUS_TERMINATED, STATUS_VOIDED,
};
pub use tx::{TransactionContext, TxId};
/// Verbs and their resolved configurations.
pub use verb::{
    AwaitConfig, AwaitOver, CancelScope, Cardinality, Completion, CopyConfig, FilterConfig,
    Selection, Threshold, VerbConfig, VerbKind, VoidConfig,
};
/// Workflow graph model.
pub use workflow::{
    CancelRegion, CancelTarget, Flow, GraphError, InstanceBinding, JoinType, MiCardinality,
    MiSpec, MiSync, NodeKind, NodeSpec, SplitType, WorkflowBuilder, WorkflowGraph,
};
