//! Retention rules
//!
//! - [`selector`]: which artifacts a rule applies to
//! - [`rule`]: a selector with one retention policy, and rulesets
//! - [`policy`]: keep/delete split for one rule in one repository
//! - [`reconcile`]: every rule over every repository, with delete precedence

pub mod policy;
pub mod reconcile;
pub mod rule;
pub mod selector;

pub use policy::{Retention, apply_rule, evaluate};
pub use reconcile::{Classification, Reconciler, apply_rules, group_by_repository};
pub use rule::{LATEST_TAG, RetentionPolicy, Rule, Ruleset};
pub use selector::{Selector, TagPattern, filter_artifacts, match_any};
