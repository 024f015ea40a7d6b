//! Rules and rulesets

use crate::artifact::Artifact;
use crate::error::RuleError;
use crate::rules::selector::{Selector, TagPattern};
use std::collections::BTreeSet;
use std::fmt;

/// Tag that every rule ignores unless told otherwise
pub const LATEST_TAG: &str = "latest";

/// The single retention action of a rule; every count is positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep the N highest versions
    KeepVersions(usize),
    /// Keep everything modified within the last N days
    KeepDays(u32),
    /// Keep the N most recently modified
    KeepMostRecent(usize),
}

impl RetentionPolicy {
    /// Pick the one positive action out of raw configuration counts, where zero means unset.
    pub fn from_counts(
        keep_versions: i64,
        keep_days: i64,
        keep_recent: i64,
    ) -> Result<Self, RuleError> {
        match (keep_versions, keep_days, keep_recent) {
            (v, d, _) if v != 0 && d != 0 => Err(RuleError::MultipleActionVersionsDays),
            (_, d, r) if d != 0 && r != 0 => Err(RuleError::MultipleActionDaysRecent),
            (v, _, r) if v != 0 && r != 0 => Err(RuleError::MultipleActionRecentVersions),
            (_, d, _) if d < 0 => Err(RuleError::KeepDaysMustBePositive),
            (v, _, _) if v < 0 => Err(RuleError::KeepVersionsMustBePositive),
            (_, _, r) if r < 0 => Err(RuleError::KeepRecentMustBePositive),
            (0, 0, 0) => Err(RuleError::ActionMustBeSpecified),
            (v, 0, 0) => Ok(RetentionPolicy::KeepVersions(
                usize::try_from(v).unwrap_or(usize::MAX),
            )),
            (0, d, 0) => Ok(RetentionPolicy::KeepDays(
                u32::try_from(d).unwrap_or(u32::MAX),
            )),
            (_, _, r) => Ok(RetentionPolicy::KeepMostRecent(
                usize::try_from(r).unwrap_or(usize::MAX),
            )),
        }
    }

    fn validate(self) -> Result<Self, RuleError> {
        match self {
            RetentionPolicy::KeepVersions(0) => Err(RuleError::KeepVersionsMustBePositive),
            RetentionPolicy::KeepDays(0) => Err(RuleError::KeepDaysMustBePositive),
            RetentionPolicy::KeepMostRecent(0) => Err(RuleError::KeepRecentMustBePositive),
            policy => Ok(policy),
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionPolicy::KeepVersions(n) => write!(f, "keep latest {} versions", n),
            RetentionPolicy::KeepDays(n) => write!(f, "keep latest {} days", n),
            RetentionPolicy::KeepMostRecent(n) => write!(f, "keep latest {} images", n),
        }
    }
}

/// A selector paired with exactly one retention policy
#[derive(Debug, Clone)]
pub struct Rule {
    selector: Selector,
    policy: RetentionPolicy,
}

impl Rule {
    /// Validate and build a rule. Adds an ignore pattern for `latest` unless one of
    /// the selector's ignore patterns already covers it.
    pub fn new(mut selector: Selector, policy: RetentionPolicy) -> Result<Self, RuleError> {
        if !selector.is_scoped() {
            return Err(RuleError::MissingReposOrLabels);
        }
        let policy = policy.validate()?;

        if !selector
            .ignore_tags
            .iter()
            .any(|re| re.is_full_match(LATEST_TAG))
        {
            selector.ignore_tags.push(TagPattern::new("^latest$")?);
        }

        Ok(Self { selector, policy })
    }

    /// Build from raw configuration counts (zero means unset).
    pub fn from_counts(
        selector: Selector,
        keep_versions: i64,
        keep_days: i64,
        keep_recent: i64,
    ) -> Result<Self, RuleError> {
        if !selector.is_scoped() {
            return Err(RuleError::MissingReposOrLabels);
        }
        let policy = RetentionPolicy::from_counts(keep_versions, keep_days, keep_recent)?;
        Self::new(selector, policy)
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    pub fn matches(&self, artifact: &Artifact) -> bool {
        self.selector.matches(artifact)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |patterns: &[TagPattern]| {
            patterns
                .iter()
                .map(TagPattern::as_str)
                .collect::<Vec<_>>()
                .join(" or ")
        };
        let labels = self
            .selector
            .labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        write!(
            f,
            "Repos:{} Labels:{{{}}} Selector{{ignore tags [{}], match tags [{}]}} Action{{{}}}",
            self.selector.repos.join(","),
            labels,
            join(&self.selector.ignore_tags),
            join(&self.selector.match_tags),
            self.policy
        )
    }
}

/// Ordered rules. Order only affects logging, never classification.
#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    rules: Vec<Rule>,
}

impl Ruleset {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn selectors(&self) -> Vec<&Selector> {
        self.rules.iter().map(Rule::selector).collect()
    }

    /// Sorted, unique repositories named by any rule
    pub fn repositories(&self) -> Vec<String> {
        self.rules
            .iter()
            .flat_map(|r| r.selector.repos.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Whether some rule applies to every repository (a label-only rule)
    pub fn spans_all_repositories(&self) -> bool {
        self.rules.iter().any(|r| r.selector.repos.is_empty())
    }
}

impl<'a> IntoIterator for &'a Ruleset {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scoped() -> Selector {
        Selector::new().with_repos(["a/b"])
    }

    #[test]
    fn test_exactly_one_action() {
        assert_eq!(
            RetentionPolicy::from_counts(0, 0, 0),
            Err(RuleError::ActionMustBeSpecified)
        );
        assert_eq!(
            RetentionPolicy::from_counts(1, 2, 0),
            Err(RuleError::MultipleActionVersionsDays)
        );
        assert_eq!(
            RetentionPolicy::from_counts(0, 2, 3),
            Err(RuleError::MultipleActionDaysRecent)
        );
        assert_eq!(
            RetentionPolicy::from_counts(1, 0, 3),
            Err(RuleError::MultipleActionRecentVersions)
        );
        assert_eq!(
            RetentionPolicy::from_counts(5, 0, 0),
            Ok(RetentionPolicy::KeepVersions(5))
        );
        assert_eq!(
            RetentionPolicy::from_counts(0, 7, 0),
            Ok(RetentionPolicy::KeepDays(7))
        );
        assert_eq!(
            RetentionPolicy::from_counts(0, 0, 3),
            Ok(RetentionPolicy::KeepMostRecent(3))
        );
    }

    #[test]
    fn test_negative_actions_rejected() {
        assert_eq!(
            RetentionPolicy::from_counts(-1, 0, 0),
            Err(RuleError::KeepVersionsMustBePositive)
        );
        assert_eq!(
            RetentionPolicy::from_counts(0, -1, 0),
            Err(RuleError::KeepDaysMustBePositive)
        );
        assert_eq!(
            RetentionPolicy::from_counts(0, 0, -4),
            Err(RuleError::KeepRecentMustBePositive)
        );
    }

    #[test]
    fn test_zero_count_policy_rejected() {
        let err = Rule::new(scoped(), RetentionPolicy::KeepMostRecent(0)).unwrap_err();
        assert_eq!(err, RuleError::KeepRecentMustBePositive);
    }

    #[test]
    fn test_unscoped_rule_rejected() {
        let err = Rule::from_counts(Selector::new(), 1, 0, 0).unwrap_err();
        assert_eq!(err, RuleError::MissingReposOrLabels);

        let labeled = Selector::new().with_label("team", "infra");
        assert!(Rule::from_counts(labeled, 1, 0, 0).is_ok());
    }

    #[test]
    fn test_latest_is_implicitly_ignored() {
        let rule = Rule::new(scoped(), RetentionPolicy::KeepMostRecent(1)).unwrap();
        assert!(!rule.matches(&Artifact::new("a/b", "latest")));
        assert!(rule.matches(&Artifact::new("a/b", "latest-2")));
        assert_eq!(rule.selector().ignore_tags.len(), 1);
    }

    #[test]
    fn test_existing_latest_ignore_not_duplicated() {
        let selector = scoped().with_ignore_tags(&["latest"]).unwrap();
        let rule = Rule::new(selector, RetentionPolicy::KeepMostRecent(1)).unwrap();
        assert_eq!(rule.selector().ignore_tags.len(), 1);
        assert_eq!(rule.selector().ignore_tags[0].as_str(), "latest");
    }

    #[test]
    fn test_rule_display() {
        let selector = scoped().with_match_tags(&["^v"]).unwrap();
        let rule = Rule::new(selector, RetentionPolicy::KeepVersions(3)).unwrap();
        assert_eq!(
            rule.to_string(),
            "Repos:a/b Labels:{} Selector{ignore tags [^latest$], match tags [^v]} Action{keep latest 3 versions}"
        );
    }

    #[test]
    fn test_ruleset_repositories_are_unique_and_sorted() {
        let rules = vec![
            Rule::new(
                Selector::new().with_repos(["z/z", "a/b"]),
                RetentionPolicy::KeepDays(1),
            )
            .unwrap(),
            Rule::new(
                Selector::new().with_repos(["a/b"]),
                RetentionPolicy::KeepVersions(1),
            )
            .unwrap(),
        ];
        let ruleset = Ruleset::new(rules);
        assert_eq!(ruleset.repositories(), vec!["a/b", "z/z"]);
        assert!(!ruleset.spans_all_repositories());
        assert_eq!(ruleset.selectors().len(), 2);
    }
}
