//! Selectors decide whether a rule applies to an artifact

use crate::artifact::Artifact;
use crate::error::RuleError;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

/// A compiled tag regular expression that remembers its source text
#[derive(Debug, Clone)]
pub struct TagPattern {
    source: String,
    search: Regex,
    full: Regex,
}

impl TagPattern {
    pub fn new(pattern: &str) -> Result<Self, RuleError> {
        let invalid = |e: regex::Error| RuleError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        };
        let search = Regex::new(pattern).map_err(invalid)?;
        let full = Regex::new(&format!("^(?:{})$", pattern)).map_err(invalid)?;
        Ok(Self {
            source: pattern.to_string(),
            search,
            full,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the pattern matches anywhere in the tag.
    pub fn is_match(&self, tag: &str) -> bool {
        self.search.is_match(tag)
    }

    /// True when the pattern matches the whole tag.
    pub fn is_full_match(&self, tag: &str) -> bool {
        self.full.is_match(tag)
    }
}

impl fmt::Display for TagPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Predicate over repository, labels and tag name.
///
/// Empty `repos` matches any repository, empty `labels` imposes no label requirement,
/// and empty `match_tags` accepts any tag that is not ignored.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    pub repos: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub ignore_tags: Vec<TagPattern>,
    pub match_tags: Vec<TagPattern>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repos<I, S>(mut self, repos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.repos = repos.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_ignore_tags(mut self, patterns: &[&str]) -> Result<Self, RuleError> {
        for pattern in patterns {
            self.ignore_tags.push(TagPattern::new(pattern)?);
        }
        Ok(self)
    }

    pub fn with_match_tags(mut self, patterns: &[&str]) -> Result<Self, RuleError> {
        for pattern in patterns {
            self.match_tags.push(TagPattern::new(pattern)?);
        }
        Ok(self)
    }

    /// A selector must scope itself to at least one repository or label.
    pub fn is_scoped(&self) -> bool {
        !self.repos.is_empty() || !self.labels.is_empty()
    }

    fn matches_repository(&self, repository: &str) -> bool {
        self.repos.is_empty() || self.repos.iter().any(|r| r == repository)
    }

    fn matches_labels(&self, artifact: &Artifact) -> bool {
        self.labels
            .iter()
            .all(|(key, value)| artifact.label(key) == Some(value.as_str()))
    }

    fn matches_tag(&self, tag: &str) -> bool {
        if self.ignore_tags.iter().any(|re| re.is_full_match(tag)) {
            return false;
        }
        self.match_tags.is_empty() || self.match_tags.iter().any(|re| re.is_match(tag))
    }

    /// Repository and labels must both match before tag patterns are considered;
    /// an ignore pattern always overrides a match pattern.
    pub fn matches(&self, artifact: &Artifact) -> bool {
        if !self.matches_repository(artifact.repository()) || !self.matches_labels(artifact) {
            return false;
        }
        self.matches_tag(artifact.tag())
    }

    /// Label-agnostic pre-check used before metadata is known.
    ///
    /// Never false when [`Selector::matches`] could be true for some label set.
    pub fn may_match(&self, repository: &str, tag: &str) -> bool {
        self.matches_repository(repository) && self.matches_tag(tag)
    }
}

/// True if any selector matches the artifact.
pub fn match_any<'a, I>(selectors: I, artifact: &Artifact) -> bool
where
    I: IntoIterator<Item = &'a Selector>,
{
    selectors.into_iter().any(|s| s.matches(artifact))
}

/// Keep only the artifacts matched by at least one selector.
pub fn filter_artifacts(artifacts: Vec<Artifact>, selectors: &[&Selector]) -> Vec<Artifact> {
    artifacts
        .into_iter()
        .filter(|a| match_any(selectors.iter().copied(), a))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn labeled(repo: &str, tag: &str, labels: &[(&str, &str)]) -> Artifact {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>();
        Artifact::new(repo, tag).with_labels(labels)
    }

    #[test]
    fn test_repository_mismatch_never_matches() {
        let selector = Selector::new().with_repos(["c/d"]);
        assert!(!selector.matches(&Artifact::new("a/b", "v1")));
        assert!(selector.matches(&Artifact::new("c/d", "v1")));
    }

    #[test]
    fn test_label_mismatch_overrides_tag_patterns() {
        let selector = Selector::new()
            .with_label("team", "infra")
            .with_match_tags(&["^v"])
            .unwrap();
        assert!(!selector.matches(&labeled("a/b", "v1", &[("team", "web")])));
        assert!(!selector.matches(&labeled("a/b", "v1", &[])));
        assert!(selector.matches(&labeled("a/b", "v1", &[("team", "infra")])));
    }

    #[test]
    fn test_all_labels_required() {
        let selector = Selector::new()
            .with_label("team", "infra")
            .with_label("tier", "web");
        assert!(!selector.matches(&labeled("a/b", "v1", &[("team", "infra")])));
        assert!(selector.matches(&labeled(
            "a/b",
            "v1",
            &[("team", "infra"), ("tier", "web"), ("extra", "x")]
        )));
    }

    #[test]
    fn test_ignore_beats_match() {
        let selector = Selector::new()
            .with_repos(["a/b"])
            .with_ignore_tags(&["v1.*"])
            .unwrap()
            .with_match_tags(&["^v1"])
            .unwrap();
        assert!(!selector.matches(&Artifact::new("a/b", "v1.0.0")));
        assert!(!selector.matches(&Artifact::new("a/b", "v2.0.0")));
    }

    #[test]
    fn test_ignore_requires_full_match() {
        let selector = Selector::new()
            .with_repos(["a/b"])
            .with_ignore_tags(&["dev"])
            .unwrap();
        assert!(!selector.matches(&Artifact::new("a/b", "dev")));
        assert!(selector.matches(&Artifact::new("a/b", "dev-123")));
    }

    #[test]
    fn test_match_tags_are_or_and_unanchored() {
        let selector = Selector::new()
            .with_repos(["a/b"])
            .with_match_tags(&["rc", "^v2"])
            .unwrap();
        assert!(selector.matches(&Artifact::new("a/b", "1.0.0-rc1")));
        assert!(selector.matches(&Artifact::new("a/b", "v2.1")));
        assert!(!selector.matches(&Artifact::new("a/b", "v1.1")));
    }

    #[test]
    fn test_match_any_and_filter() {
        let only_ab = Selector::new().with_repos(["a/b"]);
        let only_cd = Selector::new().with_repos(["c/d"]);
        let selectors = [&only_ab, &only_cd];

        let artifacts = vec![
            Artifact::new("a/b", "1"),
            Artifact::new("c/d", "1"),
            Artifact::new("e/f", "1"),
        ];
        assert!(match_any(selectors, &artifacts[1]));
        assert!(!match_any(selectors, &artifacts[2]));

        let filtered = filter_artifacts(artifacts, &selectors);
        let repos: Vec<_> = filtered.iter().map(|a| a.repository()).collect();
        assert_eq!(repos, vec!["a/b", "c/d"]);
    }

    #[test]
    fn test_may_match_is_label_agnostic() {
        let selector = Selector::new()
            .with_label("team", "infra")
            .with_ignore_tags(&["latest"])
            .unwrap();
        assert!(selector.may_match("any/repo", "v1"));
        assert!(!selector.may_match("any/repo", "latest"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = Selector::new().with_match_tags(&["(unclosed"]).unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { .. }));
    }
}
