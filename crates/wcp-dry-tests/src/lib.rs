// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for wcp crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`engine`] - Engine builder utilities
//! - [`predicates`] - Recording guard evaluator
//! - [`workflows`] - Canonical pattern fixtures

pub mod config;
pub mod engine;
pub mod predicates;
pub mod workflows;

// Re-export commonly used items at crate root for convenience
pub use config::InMemoryConfigStore;
pub use engine::EngineTestBuilder;
pub use predicates::RecordingEvaluator;
pub use workflows::{
    and_split_join, cancel_case, cancel_region, discriminator, exclusive_choice, mi_dynamic,
    mi_dynamic_synced, mi_static, multi_choice_merge, partial_join, sequence, n,
};
