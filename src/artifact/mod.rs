//! Artifact model
//!
//! An [`Artifact`] is one `(repository, tag)` pair with the facts the retention rules
//! look at: a version derived from the tag, a last-modified time and a label set.
//! Artifacts are immutable once built; the policy engine only classifies them.

pub mod metadata;
pub mod version;

pub use metadata::ImageMetadata;
pub use version::{ArtifactVersion, Version, is_hash_like, parse_version};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp used when no metadata timestamp is available.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH)
}

/// One tag in one repository
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    repository: String,
    tag: String,
    last_modified: DateTime<Utc>,
    version: ArtifactVersion,
    labels: BTreeMap<String, String>,
    digest: Option<String>,
}

impl Artifact {
    /// Artifact with no metadata: epoch timestamp, no labels.
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::with_last_modified(repository, tag, epoch())
    }

    pub fn with_last_modified(
        repository: impl Into<String>,
        tag: impl Into<String>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        let tag = tag.into();
        let version = parse_version(&tag);
        Self {
            repository: repository.into(),
            tag,
            last_modified,
            version,
            labels: BTreeMap::new(),
            digest: None,
        }
    }

    /// Build an artifact from whatever metadata could be gathered. Never fails.
    pub fn from_metadata(
        repository: impl Into<String>,
        tag: impl Into<String>,
        metadata: &ImageMetadata,
    ) -> Self {
        Self::with_last_modified(repository, tag, metadata.last_modified())
            .with_labels(metadata.merged_labels())
            .with_digest(metadata.digest().map(str::to_string))
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_digest(mut self, digest: Option<String>) -> Self {
        self.digest = digest;
        self
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn version(&self) -> &ArtifactVersion {
        &self.version
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Identity used for deduplication and delete precedence
    pub fn key(&self) -> (&str, &str) {
        (&self.repository, &self.tag)
    }

    /// Whole days elapsed since the artifact was last modified
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_modified).num_days()
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_new_artifact_defaults() {
        let artifact = Artifact::new("team/app", "v1.2.3");
        assert_eq!(artifact.key(), ("team/app", "v1.2.3"));
        assert_eq!(artifact.last_modified(), epoch());
        assert!(artifact.labels().is_empty());
        assert_eq!(artifact.version().to_string(), "1.2.3");
        assert_eq!(artifact.to_string(), "team/app:v1.2.3");
    }

    #[test]
    fn test_from_metadata() {
        let mut metadata = ImageMetadata::new();
        let ts = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();
        metadata.push_timestamp(ts);
        metadata.push_labels(BTreeMap::from([("env".to_string(), "prod".to_string())]));
        metadata.push_labels(BTreeMap::from([("env".to_string(), "dev".to_string())]));
        let metadata = metadata.with_digest(Some("sha256:abc".to_string()));

        let artifact = Artifact::from_metadata("team/app", "3f2a9c1", &metadata);
        assert_eq!(artifact.last_modified(), ts);
        assert_eq!(artifact.label("env"), Some("prod"));
        assert_eq!(artifact.digest(), Some("sha256:abc"));
        assert!(artifact.version().is_unparsed());
    }

    #[test]
    fn test_age_days() {
        let now = Utc.with_ymd_and_hms(2021, 6, 10, 0, 0, 0).unwrap();
        let artifact = Artifact::with_last_modified("a", "1", now - Duration::hours(49));
        assert_eq!(artifact.age_days(now), 2);
    }
}
