// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Rule store: the (pattern, trigger) → verb + template catalog.
//!
//! Catalogs are YAML (or JSON) documents parsed and validated once. Every
//! template is parsed at load, so a malformed catalog never reaches a tick.
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;

use crate::ident::{make_rule_id, Hash};
use crate::pattern::{PatternKind, Trigger};
use crate::template::{ExecutionTemplate, Relation, TemplateParseError};
use crate::verb::{AwaitOver, Completion, Selection, VerbKind};
use crate::workflow::InstanceBinding;

/// Catalog shipped with the crate, covering every derivable pattern.
pub const BUILTIN_CATALOG: &str = include_str!("../catalog/wcp.yaml");

/// Lookup key of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleKey {
    /// Pattern.
    pub pattern: PatternKind,
    /// Trigger.
    pub trigger: Trigger,
}

impl RuleKey {
    /// Builds a key.
    #[must_use]
    pub const fn new(pattern: PatternKind, trigger: Trigger) -> Self {
        Self { pattern, trigger }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pattern.label(), self.trigger)
    }
}

/// COPY cardinality as declared in a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardinalityMode {
    /// Structural successors.
    Topology,
    /// The node's static count.
    Static,
    /// The node's item list.
    Dynamic,
    /// Whatever the node's multiple-instance annotation declares.
    Declared,
}

/// AWAIT threshold as declared in a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Every contributor.
    All,
    /// First arrival.
    One,
    /// The node's partial-join threshold or quorum.
    Count,
    /// OR-join liveness.
    Active,
}

/// VOID scope as declared in a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    /// The acting node.
    #[serde(rename = "self")]
    Subject,
    /// The node's cancellation region.
    Region,
    /// The owning case.
    Case,
}

/// Verb with catalog-level parameters, before node parameters are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerbSpec {
    /// COPY.
    Copy {
        /// Cardinality mode.
        cardinality: CardinalityMode,
        /// Binding override.
        binding: Option<InstanceBinding>,
    },
    /// AWAIT.
    Await {
        /// Threshold mode.
        threshold: ThresholdMode,
        /// Branches or instances.
        over: AwaitOver,
        /// Latch on firing.
        latch: bool,
        /// Reset latch after absorbing every branch.
        reset_on_fire: bool,
        /// Leftover handling.
        completion: Completion,
    },
    /// FILTER.
    Filter {
        /// Selection mode.
        selection: Selection,
    },
    /// VOID.
    Void {
        /// Scope mode.
        scope: ScopeMode,
    },
}

impl VerbSpec {
    /// Verb kind.
    #[must_use]
    pub const fn kind(&self) -> VerbKind {
        match self {
            Self::Copy { .. } => VerbKind::Copy,
            Self::Await { .. } => VerbKind::Await,
            Self::Filter { .. } => VerbKind::Filter,
            Self::Void { .. } => VerbKind::Void,
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    /// Key.
    pub key: RuleKey,
    /// Domain-separated rule id.
    pub id: Hash,
    /// Verb and catalog parameters.
    pub verb: VerbSpec,
    /// Parsed template.
    pub template: Arc<ExecutionTemplate>,
}

/// Catalog load failures.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// YAML front-end failure.
    #[error("rule catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// JSON front-end failure.
    #[error("rule catalog: {0}")]
    Json(#[from] serde_json::Error),
    /// Two entries share a key.
    #[error("duplicate rule mapping {0}")]
    DuplicateMapping(RuleKey),
    /// A template failed to parse.
    #[error("rule {key}: {source}")]
    Template {
        /// Entry.
        key: RuleKey,
        /// Parse failure.
        #[source]
        source: TemplateParseError,
    },
    /// A parameter required by the verb is missing.
    #[error("rule {key}: {verb} requires parameter `{param}`")]
    MissingParameter {
        /// Entry.
        key: RuleKey,
        /// Verb.
        verb: VerbKind,
        /// Parameter name.
        param: &'static str,
    },
    /// A parameter belongs to a different verb.
    #[error("rule {key}: parameter `{param}` does not apply to {verb}")]
    UnexpectedParameter {
        /// Entry.
        key: RuleKey,
        /// Verb.
        verb: VerbKind,
        /// Parameter name.
        param: &'static str,
    },
    /// Template shape does not fit the verb parameters.
    #[error("rule {key}: {reason}")]
    IncompatibleTemplate {
        /// Entry.
        key: RuleKey,
        /// What is wrong.
        reason: &'static str,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogDocument {
    rules: Vec<RuleDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDocument {
    pattern: PatternKind,
    trigger: Trigger,
    verb: VerbKind,
    #[serde(default)]
    params: ParamsDocument,
    template: TemplateDocument,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct ParamsDocument {
    cardinality: Option<CardinalityMode>,
    binding: Option<InstanceBinding>,
    threshold: Option<ThresholdMode>,
    over: Option<AwaitOver>,
    latch: Option<bool>,
    reset_on_fire: Option<bool>,
    completion: Option<Completion>,
    selection: Option<Selection>,
    scope: Option<ScopeMode>,
}

impl ParamsDocument {
    fn present(&self) -> Vec<&'static str> {
        let flags = [
            ("cardinality", self.cardinality.is_some()),
            ("binding", self.binding.is_some()),
            ("threshold", self.threshold.is_some()),
            ("over", self.over.is_some()),
            ("latch", self.latch.is_some()),
            ("reset_on_fire", self.reset_on_fire.is_some()),
            ("completion", self.completion.is_some()),
            ("selection", self.selection.is_some()),
            ("scope", self.scope.is_some()),
        ];
        flags.iter().filter(|(_, set)| *set).map(|(name, _)| *name).collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateDocument {
    target: String,
    mutation: String,
    #[serde(default)]
    instances: Option<String>,
}

/// Indexed, read-only rule catalog.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    rules: FxHashMap<RuleKey, Arc<RuleEntry>>,
}

impl RuleStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads [`BUILTIN_CATALOG`].
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(BUILTIN_CATALOG)
    }

    /// Loads a YAML catalog.
    pub fn from_yaml_str(src: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = serde_yaml::from_str(src)?;
        Self::from_document(doc)
    }

    /// Loads a JSON catalog.
    pub fn from_json_str(src: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = serde_json::from_str(src)?;
        Self::from_document(doc)
    }

    fn from_document(doc: CatalogDocument) -> Result<Self, CatalogError> {
        let mut store = Self::new();
        for rule in doc.rules {
            store.insert(build_entry(rule)?)?;
        }
        Ok(store)
    }

    /// Adds an entry; duplicate keys are rejected.
    pub fn insert(&mut self, entry: RuleEntry) -> Result<(), CatalogError> {
        if self.rules.contains_key(&entry.key) {
            return Err(CatalogError::DuplicateMapping(entry.key));
        }
        self.rules.insert(entry.key, Arc::new(entry));
        Ok(())
    }

    /// Looks up the entry for `(pattern, trigger)`.
    #[must_use]
    pub fn get(&self, pattern: PatternKind, trigger: Trigger) -> Option<&Arc<RuleEntry>> {
        self.rules.get(&RuleKey::new(pattern, trigger))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when the store has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Keys in canonical order.
    #[must_use]
    pub fn keys(&self) -> Vec<RuleKey> {
        let mut keys: Vec<RuleKey> = self.rules.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

fn build_entry(rule: RuleDocument) -> Result<RuleEntry, CatalogError> {
    let key = RuleKey::new(rule.pattern, rule.trigger);
    let template = ExecutionTemplate::parse(
        &rule.template.target,
        &rule.template.mutation,
        rule.template.instances.as_deref(),
    )
    .map_err(|source| CatalogError::Template { key, source })?;

    let verb = rule.verb;
    let params = rule.params;
    let allowed: &[&str] = match verb {
        VerbKind::Copy => &["cardinality", "binding"],
        VerbKind::Await => &["threshold", "over", "latch", "reset_on_fire", "completion"],
        VerbKind::Filter => &["selection"],
        VerbKind::Void => &["scope"],
    };
    if let Some(param) = params.present().into_iter().find(|p| !allowed.contains(p)) {
        return Err(CatalogError::UnexpectedParameter { key, verb, param });
    }
    let missing = |param| CatalogError::MissingParameter { key, verb, param };
    let incompatible = |reason| CatalogError::IncompatibleTemplate { key, reason };

    let relation = template.target().relation;
    let spec = match verb {
        VerbKind::Copy => {
            let cardinality = params.cardinality.ok_or_else(|| missing("cardinality"))?;
            let generates = template.instance_generation().is_some();
            if cardinality == CardinalityMode::Topology {
                if generates || template.spawns_instances() {
                    return Err(incompatible("topology copy cannot generate instances"));
                }
            } else if !generates || !template.spawns_instances() {
                return Err(incompatible(
                    "instance copy requires an instance generation query and a spawn statement",
                ));
            }
            VerbSpec::Copy {
                cardinality,
                binding: params.binding,
            }
        }
        VerbKind::Await => {
            let over = params.over.unwrap_or_default();
            let expected = match over {
                AwaitOver::Branches => Relation::Arrivals,
                AwaitOver::Instances => Relation::Instances,
            };
            if relation != expected {
                return Err(incompatible(
                    "await target must select arrivals or instances to match `over`",
                ));
            }
            VerbSpec::Await {
                threshold: params.threshold.ok_or_else(|| missing("threshold"))?,
                over,
                latch: params.latch.unwrap_or(false),
                reset_on_fire: params.reset_on_fire.unwrap_or(false),
                completion: params.completion.unwrap_or_default(),
            }
        }
        VerbKind::Filter => {
            if relation != Relation::Successors {
                return Err(incompatible("filter target must select successors"));
            }
            VerbSpec::Filter {
                selection: params.selection.ok_or_else(|| missing("selection"))?,
            }
        }
        VerbKind::Void => {
            let scope = params.scope.ok_or_else(|| missing("scope"))?;
            let expected = match scope {
                ScopeMode::Subject => Relation::SelfNode,
                ScopeMode::Region => Relation::Region,
                ScopeMode::Case => Relation::Case,
            };
            if relation != expected {
                return Err(incompatible("void target relation must match its scope"));
            }
            VerbSpec::Void { scope }
        }
    };
    if template.instance_generation().is_some() && verb != VerbKind::Copy {
        return Err(incompatible("only copy may generate instances"));
    }

    Ok(RuleEntry {
        key,
        id: make_rule_id(key.pattern.label(), key.trigger.label()),
        verb: spec,
        template: Arc::new(template),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::derive_occurrences;
    use crate::workflow::{
        CancelTarget, JoinType, MiCardinality, MiSpec, MiSync, NodeSpec, SplitType, WorkflowGraph,
    };

    #[test]
    fn builtin_catalog_loads() {
        let store = RuleStore::builtin().expect("builtin catalog is valid");
        let entry = store
            .get(PatternKind::Sequence, Trigger::TokenPresent)
            .expect("sequence mapping");
        assert_eq!(entry.verb.kind(), VerbKind::Copy);
        assert_eq!(
            entry.id,
            make_rule_id("sequence", "token_present"),
            "rule id is label-derived"
        );
    }

    #[test]
    fn builtin_catalog_covers_every_derivable_occurrence() {
        let store = RuleStore::builtin().expect("builtin catalog is valid");
        let mi = |cardinality, sync| MiSpec {
            cardinality,
            sync,
            binding: None,
        };
        let graph = WorkflowGraph::builder("c")
            .node(NodeSpec::task("a").split(SplitType::And))
            .node(NodeSpec::task("b").split(SplitType::Xor))
            .node(NodeSpec::task("c").split(SplitType::Or))
            .node(NodeSpec::task("j1").join(JoinType::And))
            .node(NodeSpec::task("j2").join(JoinType::Xor))
            .node(NodeSpec::task("j3").join(JoinType::Or))
            .node(NodeSpec::task("j4").join(JoinType::Discriminator))
            .node(NodeSpec::task("j5").join(JoinType::BlockingDiscriminator))
            .node(NodeSpec::task("j6").join(JoinType::Partial(1)))
            .node(NodeSpec::task("m1").multi_instance(mi(MiCardinality::Static(2), MiSync::All)))
            .node(NodeSpec::task("m2").multi_instance(mi(
                MiCardinality::Dynamic { items: "xs".into() },
                MiSync::All,
            )))
            .node(
                NodeSpec::task("m3")
                    .multi_instance(mi(MiCardinality::Static(2), MiSync::Quorum(1))),
            )
            .node(NodeSpec::task("m4").multi_instance(mi(MiCardinality::Static(2), MiSync::None)))
            .node(NodeSpec::task("x1").cancelling(CancelTarget::Region("r".into())))
            .node(NodeSpec::task("x2").cancelling(CancelTarget::Case))
            .node("z")
            .region("r", &["z"])
            .edge("a", "j1")
            .edge("b", "j2")
            .edge("c", "j3")
            .edge("z", "j4")
            .edge("z", "j5")
            .edge("z", "j6")
            .build()
            .expect("graph builds");
        for occurrence in derive_occurrences(&graph) {
            assert!(
                store.get(occurrence.pattern, occurrence.trigger).is_some(),
                "no mapping for {} / {}",
                occurrence.pattern,
                occurrence.trigger
            );
        }
    }

    #[test]
    fn duplicate_mappings_are_rejected() {
        let src = r#"
rules:
  - pattern: sequence
    trigger: token_present
    verb: copy
    params: { cardinality: topology }
    template: { target: "successors(%SUBJECT%)", mutation: "consume %SUBJECT%" }
  - pattern: sequence
    trigger: token_present
    verb: copy
    params: { cardinality: topology }
    template: { target: "successors(%SUBJECT%)", mutation: "consume %SUBJECT%" }
"#;
        assert!(matches!(
            RuleStore::from_yaml_str(src),
            Err(CatalogError::DuplicateMapping(_))
        ));
    }

    #[test]
    fn malformed_templates_fail_at_load() {
        let src = r#"
rules:
  - pattern: sequence
    trigger: token_present
    verb: copy
    params: { cardinality: topology }
    template: { target: "successors(%SUBJECT%", mutation: "consume %SUBJECT%" }
"#;
        assert!(matches!(
            RuleStore::from_yaml_str(src),
            Err(CatalogError::Template { .. })
        ));
    }

    #[test]
    fn verb_parameters_are_checked() {
        let missing = r#"
rules:
  - pattern: exclusive_choice
    trigger: token_present
    verb: filter
    template: { target: "successors(%SUBJECT%)", mutation: "consume %SUBJECT%" }
"#;
        assert!(matches!(
            RuleStore::from_yaml_str(missing),
            Err(CatalogError::MissingParameter { param: "selection", .. })
        ));

        let foreign = r#"
rules:
  - pattern: exclusive_choice
    trigger: token_present
    verb: filter
    params: { selection: exactly_one, latch: true }
    template: { target: "successors(%SUBJECT%)", mutation: "consume %SUBJECT%" }
"#;
        assert!(matches!(
            RuleStore::from_yaml_str(foreign),
            Err(CatalogError::UnexpectedParameter { param: "latch", .. })
        ));
    }

    #[test]
    fn instance_copy_requires_generation() {
        let src = r#"
rules:
  - pattern: mi_design_time
    trigger: token_present
    verb: copy
    params: { cardinality: static }
    template: { target: "self(%SUBJECT%)", mutation: "consume %SUBJECT%" }
"#;
        assert!(matches!(
            RuleStore::from_yaml_str(src),
            Err(CatalogError::IncompatibleTemplate { .. })
        ));
    }

    #[test]
    fn json_catalogs_load() {
        let src = r#"{"rules":[{"pattern":"cancel_task","trigger":"cancel_requested","verb":"void",
            "params":{"scope":"self"},
            "template":{"target":"self(%SUBJECT%) where tokened","mutation":"void %TARGETS%"}}]}"#;
        let store = RuleStore::from_json_str(src).expect("json catalog loads");
        assert_eq!(
            store.keys(),
            vec![RuleKey::new(PatternKind::CancelTask, Trigger::CancelRequested)]
        );
    }
}
