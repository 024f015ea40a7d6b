//! Retention policy evaluation for one rule over one repository

use crate::artifact::Artifact;
use crate::rules::rule::{RetentionPolicy, Rule};
use chrono::{DateTime, Utc};

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Keep/delete split produced by a single rule
#[derive(Debug, Default)]
pub struct Retention<'a> {
    pub keep: Vec<&'a Artifact>,
    pub delete: Vec<&'a Artifact>,
}

/// Select the artifacts a rule applies to and evaluate its policy over them.
///
/// `artifacts` must all belong to one repository; version and recency comparisons
/// are meaningless across repositories. Unselected artifacts are absent from the result.
pub fn apply_rule<'a>(
    rule: &Rule,
    artifacts: &[&'a Artifact],
    now: DateTime<Utc>,
) -> Retention<'a> {
    let selected = artifacts
        .iter()
        .copied()
        .filter(|a| rule.matches(a))
        .collect();
    evaluate(rule.policy(), selected, now)
}

/// Split already-selected artifacts according to `policy`.
pub fn evaluate<'a>(
    policy: RetentionPolicy,
    selected: Vec<&'a Artifact>,
    now: DateTime<Utc>,
) -> Retention<'a> {
    match policy {
        RetentionPolicy::KeepVersions(n) => keep_versions(selected, n),
        RetentionPolicy::KeepDays(n) => keep_days(selected, n, now),
        RetentionPolicy::KeepMostRecent(n) => keep_most_recent(selected, n),
    }
}

// Unversioned tags are neither kept nor deleted by a version rule.
fn keep_versions(selected: Vec<&Artifact>, n: usize) -> Retention<'_> {
    let mut versioned: Vec<&Artifact> = selected
        .into_iter()
        .filter(|a| !a.version().is_unparsed())
        .collect();
    versioned.sort_by(|a, b| a.version().cmp(b.version()).then_with(|| a.tag().cmp(b.tag())));

    let cut = versioned.len().saturating_sub(n);
    let keep = versioned.split_off(cut);
    Retention {
        keep,
        delete: versioned,
    }
}

fn keep_days(mut selected: Vec<&Artifact>, days: u32, now: DateTime<Utc>) -> Retention<'_> {
    selected.sort_by_key(|a| a.last_modified());

    let limit = MINUTES_PER_DAY * i64::from(days);
    let (delete, keep): (Vec<&Artifact>, Vec<&Artifact>) = selected
        .into_iter()
        .partition(|a| (now - a.last_modified()).num_minutes() > limit);
    Retention { keep, delete }
}

fn keep_most_recent(mut selected: Vec<&Artifact>, n: usize) -> Retention<'_> {
    selected.sort_by_key(|a| a.last_modified());

    let cut = selected.len().saturating_sub(n);
    let keep = selected.split_off(cut);
    Retention {
        keep,
        delete: selected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::selector::Selector;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap()
    }

    fn tags<'a>(artifacts: &[&'a Artifact]) -> Vec<&'a str> {
        artifacts.iter().map(|a| a.tag()).collect()
    }

    fn rule(policy: RetentionPolicy) -> Rule {
        Rule::new(Selector::new().with_repos(["a/b"]), policy).unwrap()
    }

    #[test]
    fn test_keep_versions_boundary() {
        let owned: Vec<Artifact> = ["3", "1", "5", "2", "4", "nightly"]
            .iter()
            .map(|t| Artifact::new("a/b", *t))
            .collect();
        let refs: Vec<&Artifact> = owned.iter().collect();

        let result = apply_rule(&rule(RetentionPolicy::KeepVersions(2)), &refs, now());
        assert_eq!(tags(&result.keep), vec!["4", "5"]);
        assert_eq!(tags(&result.delete), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_keep_versions_more_than_available() {
        let owned = vec![Artifact::new("a/b", "v1"), Artifact::new("a/b", "v2")];
        let refs: Vec<&Artifact> = owned.iter().collect();

        let result = evaluate(RetentionPolicy::KeepVersions(10), refs, now());
        assert_eq!(tags(&result.keep), vec!["v1", "v2"]);
        assert!(result.delete.is_empty());
    }

    #[test]
    fn test_keep_versions_equal_versions_break_ties_on_tag() {
        let owned = vec![
            Artifact::new("a/b", "v1.0"),
            Artifact::new("a/b", "1.0.0"),
            Artifact::new("a/b", "1.0"),
        ];
        let forward: Vec<&Artifact> = owned.iter().collect();
        let backward: Vec<&Artifact> = owned.iter().rev().collect();

        let a = evaluate(RetentionPolicy::KeepVersions(1), forward, now());
        let b = evaluate(RetentionPolicy::KeepVersions(1), backward, now());
        assert_eq!(tags(&a.keep), vec!["v1.0"]);
        assert_eq!(tags(&a.delete), vec!["1.0", "1.0.0"]);
        assert_eq!(tags(&a.keep), tags(&b.keep));
        assert_eq!(tags(&a.delete), tags(&b.delete));
    }

    #[test]
    fn test_keep_versions_treats_real_zero_as_versioned() {
        let owned = vec![
            Artifact::new("a/b", "0.0.0"),
            Artifact::new("a/b", "deadbeef"),
            Artifact::new("a/b", "0.1.0"),
        ];
        let refs: Vec<&Artifact> = owned.iter().collect();

        let result = evaluate(RetentionPolicy::KeepVersions(1), refs, now());
        assert_eq!(tags(&result.keep), vec!["0.1.0"]);
        assert_eq!(tags(&result.delete), vec!["0.0.0"]);
    }

    #[test]
    fn test_keep_days_boundary() {
        let days = 3;
        let exact = now() - Duration::minutes(MINUTES_PER_DAY * days);
        let owned = vec![
            Artifact::with_last_modified("a/b", "older", exact - Duration::minutes(1)),
            Artifact::with_last_modified("a/b", "exact", exact),
            Artifact::with_last_modified("a/b", "partial", exact - Duration::seconds(59)),
            Artifact::with_last_modified("a/b", "fresh", now()),
        ];
        let refs: Vec<&Artifact> = owned.iter().collect();

        let result = evaluate(RetentionPolicy::KeepDays(days as u32), refs, now());
        assert_eq!(tags(&result.delete), vec!["older"]);
        assert_eq!(tags(&result.keep), vec!["partial", "exact", "fresh"]);
    }

    #[test]
    fn test_keep_days_epoch_artifacts_are_old() {
        let owned = vec![Artifact::new("a/b", "v1")];
        let refs: Vec<&Artifact> = owned.iter().collect();

        let result = evaluate(RetentionPolicy::KeepDays(30), refs, now());
        assert_eq!(tags(&result.delete), vec!["v1"]);
    }

    #[test]
    fn test_keep_most_recent_boundary() {
        let base = now() - Duration::days(10);
        let owned: Vec<Artifact> = (0..5)
            .map(|i| Artifact::with_last_modified("a/b", format!("t{}", i), base + Duration::days(i)))
            .rev()
            .collect();
        let refs: Vec<&Artifact> = owned.iter().collect();

        let result = evaluate(RetentionPolicy::KeepMostRecent(2), refs, now());
        assert_eq!(tags(&result.delete), vec!["t0", "t1", "t2"]);
        assert_eq!(tags(&result.keep), vec!["t3", "t4"]);
    }

    #[test]
    fn test_keep_most_recent_ties_follow_input_order() {
        let ts = now() - Duration::days(1);
        let owned = vec![
            Artifact::with_last_modified("a/b", "first", ts),
            Artifact::with_last_modified("a/b", "second", ts),
            Artifact::with_last_modified("a/b", "third", ts),
        ];
        let refs: Vec<&Artifact> = owned.iter().collect();

        let result = evaluate(RetentionPolicy::KeepMostRecent(1), refs, now());
        assert_eq!(tags(&result.delete), vec!["first", "second"]);
        assert_eq!(tags(&result.keep), vec!["third"]);
    }

    #[test]
    fn test_unselected_artifacts_absent() {
        let owned = vec![Artifact::new("a/b", "v1"), Artifact::new("a/b", "latest")];
        let refs: Vec<&Artifact> = owned.iter().collect();

        let result = apply_rule(&rule(RetentionPolicy::KeepMostRecent(5)), &refs, now());
        assert_eq!(tags(&result.keep), vec!["v1"]);
        assert!(result.delete.is_empty());
    }
}
