//! Timestamp and label extraction from registry metadata
//!
//! Two sources are understood: the `history[].v1Compatibility` blobs of a schema1
//! manifest, and the image configuration blob referenced by a schema2 or OCI manifest.
//! Malformed entries are skipped; extraction never fails.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Raw facts gathered about one tag before it becomes an [`Artifact`](super::Artifact)
#[derive(Debug, Clone, Default)]
pub struct ImageMetadata {
    timestamps: Vec<DateTime<Utc>>,
    label_sources: Vec<BTreeMap<String, String>>,
    digest: Option<String>,
}

impl ImageMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract metadata from a schema1 manifest document.
    pub fn from_schema1_manifest(manifest: &Value) -> Self {
        let mut metadata = Self::new();

        let history = manifest
            .get("history")
            .and_then(|h| h.as_array())
            .map(|h| h.as_slice())
            .unwrap_or_default();

        for entry in history {
            let Some(raw) = entry.get("v1Compatibility").and_then(|v| v.as_str()) else {
                continue;
            };
            let Ok(compat) = serde_json::from_str::<Value>(raw) else {
                continue;
            };
            metadata.absorb_config_document(&compat);
        }

        metadata
    }

    /// Extract metadata from an image configuration blob.
    pub fn from_image_config(config: &Value) -> Self {
        let mut metadata = Self::new();
        metadata.absorb_config_document(config);

        if let Some(history) = config.get("history").and_then(|h| h.as_array()) {
            for entry in history {
                if let Some(ts) = entry.get("created").and_then(parse_timestamp) {
                    metadata.timestamps.push(ts);
                }
            }
        }

        metadata
    }

    // Both v1Compatibility entries and config blobs carry `created`, `config.Labels`
    // and `container_config.Labels`.
    fn absorb_config_document(&mut self, doc: &Value) {
        if let Some(ts) = doc.get("created").and_then(parse_timestamp) {
            self.timestamps.push(ts);
        }
        for section in ["config", "container_config"] {
            if let Some(labels) = doc
                .get(section)
                .and_then(|c| c.get("Labels"))
                .and_then(|l| l.as_object())
            {
                let labels = labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect::<BTreeMap<_, _>>();
                self.label_sources.push(labels);
            }
        }
    }

    pub fn push_timestamp(&mut self, ts: DateTime<Utc>) {
        self.timestamps.push(ts);
    }

    pub fn push_labels(&mut self, labels: BTreeMap<String, String>) {
        self.label_sources.push(labels);
    }

    pub fn with_digest(mut self, digest: Option<String>) -> Self {
        self.digest = digest;
        self
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Most recent timestamp seen, or the Unix epoch when there is none.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.timestamps
            .iter()
            .max()
            .copied()
            .unwrap_or_else(super::epoch)
    }

    /// Labels from every source; a key keeps the value from the first source that set it.
    pub fn merged_labels(&self) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        for source in &self.label_sources {
            for (k, v) in source {
                merged.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        merged
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
