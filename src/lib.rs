//! Registry Pruner Library
//!
//! Decides which tags of a Docker Registry v2 to keep and which to delete, following
//! a set of retention rules, and carries out the deletions with a bounded worker pool.
//!
//! - [`artifact`]: tags as versioned, timestamped, labeled artifacts
//! - [`rules`]: selectors, retention policies and ruleset reconciliation
//! - [`pipeline`]: the worker pool and the list/fetch/delete stages
//! - [`registry`]: the [`registry::Registry`] seam and its HTTP client
//! - [`pruner`]: orchestration of a full run

pub mod artifact;
pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod pruner;
pub mod registry;
pub mod rules;

pub use artifact::Artifact;
pub use config::{PrunerConfig, Settings};
pub use error::{PrunerError, Result};
pub use logging::Logger;
pub use pruner::{Plan, Pruner};
pub use rules::{Classification, RetentionPolicy, Rule, Ruleset, Selector};
