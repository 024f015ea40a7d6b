//! Ruleset reconciliation
//!
//! Every rule is applied to every repository's artifacts. Recommendations are
//! concatenated, anything any rule wants deleted is removed from the keep list, and both
//! lists are deduplicated by `(repository, tag)`. An artifact no rule selects appears in
//! neither list: rules define what is managed, there is no implicit keep-everything.

use crate::artifact::Artifact;
use crate::logging::Logger;
use crate::rules::policy::apply_rule;
use crate::rules::rule::Ruleset;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

/// Final keep/delete split. The two lists never share a `(repository, tag)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub keep: Vec<Artifact>,
    pub delete: Vec<Artifact>,
}

impl Classification {
    pub fn is_kept(&self, repository: &str, tag: &str) -> bool {
        self.keep.iter().any(|a| a.key() == (repository, tag))
    }

    pub fn is_deleted(&self, repository: &str, tag: &str) -> bool {
        self.delete.iter().any(|a| a.key() == (repository, tag))
    }
}

/// Group artifacts by repository, repositories and tags in sorted order.
///
/// Fetch results arrive in completion order; sorting here means policy ties resolve
/// the same way for the same snapshot.
pub fn group_by_repository(artifacts: &[Artifact]) -> BTreeMap<&str, Vec<&Artifact>> {
    let mut groups: BTreeMap<&str, Vec<&Artifact>> = BTreeMap::new();
    for artifact in artifacts {
        groups.entry(artifact.repository()).or_default().push(artifact);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.tag().cmp(b.tag()));
    }
    groups
}

/// Applies rulesets and logs what each rule decided
#[derive(Debug, Clone)]
pub struct Reconciler {
    logger: Logger,
}

impl Reconciler {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    pub fn apply(
        &self,
        ruleset: &Ruleset,
        artifacts: &[Artifact],
        now: DateTime<Utc>,
    ) -> Classification {
        let mut keep: Vec<&Artifact> = Vec::new();
        let mut delete: Vec<&Artifact> = Vec::new();

        for (repository, group) in group_by_repository(artifacts) {
            for rule in ruleset {
                let retention = apply_rule(rule, &group, now);
                self.logger.debug(&format!(
                    "{}: rule [{}] keeps {} and deletes {}",
                    repository,
                    rule.policy(),
                    retention.keep.len(),
                    retention.delete.len()
                ));
                keep.extend(retention.keep);
                delete.extend(retention.delete);
            }
        }

        let doomed: HashSet<(&str, &str)> = delete.iter().map(|a| a.key()).collect();
        let keep = dedupe(keep.into_iter().filter(|a| !doomed.contains(&a.key())));
        let delete = dedupe(delete.into_iter());

        self.logger.detail(&format!(
            "Classified {} artifacts: keeping {}, deleting {}",
            artifacts.len(),
            keep.len(),
            delete.len()
        ));

        Classification { keep, delete }
    }
}

fn dedupe<'a>(artifacts: impl Iterator<Item = &'a Artifact>) -> Vec<Artifact> {
    let mut seen = HashSet::new();
    artifacts
        .filter(|a| seen.insert(a.key()))
        .cloned()
        .collect()
}

/// Classify `artifacts` under `ruleset` without logging.
pub fn apply_rules(ruleset: &Ruleset, artifacts: &[Artifact], now: DateTime<Utc>) -> Classification {
    Reconciler::new(Logger::new_quiet()).apply(ruleset, artifacts, now)
}
