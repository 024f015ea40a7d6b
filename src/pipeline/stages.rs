//! The three registry stages run on a [`WorkerPool`]
//!
//! Stages run one after another; within a stage items complete in no particular order.

use super::{ItemFailure, StageOutcome, WorkItem, WorkerPool};
use crate::artifact::Artifact;
use crate::registry::Registry;
use crate::rules::Selector;
use std::sync::Arc;

/// Tags listed for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryTags {
    pub repository: String,
    pub tags: Vec<String>,
}

/// One tag waiting for its metadata
#[derive(Debug, Clone)]
struct TagRef {
    repository: String,
    tag: String,
}

impl WorkItem for TagRef {
    fn label(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

impl WorkItem for Artifact {
    fn label(&self) -> String {
        self.to_string()
    }
}

/// Result of the delete stage
#[derive(Debug, Default)]
pub struct DeletionReport {
    pub deleted: usize,
    pub errors: Vec<ItemFailure>,
}

impl DeletionReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// List the tags of every repository.
pub async fn list_tags(
    pool: &WorkerPool,
    registry: Arc<dyn Registry>,
    repositories: Vec<String>,
) -> StageOutcome<RepositoryTags> {
    pool.run("list tags", repositories, move |repository: String| {
        let registry = Arc::clone(&registry);
        async move {
            let tags = registry.list_tags(&repository).await?;
            Ok(RepositoryTags { repository, tags })
        }
    })
    .await
}

/// Fetch metadata for every listed tag that at least one selector could match.
///
/// Tags no selector can match regardless of labels are skipped without a request.
pub async fn fetch_artifacts(
    pool: &WorkerPool,
    registry: Arc<dyn Registry>,
    repo_tags: &[RepositoryTags],
    selectors: &[&Selector],
) -> StageOutcome<Artifact> {
    let mut items = Vec::new();
    let mut skipped = 0usize;
    for listing in repo_tags {
        for tag in &listing.tags {
            if selectors
                .iter()
                .any(|s| s.may_match(&listing.repository, tag))
            {
                items.push(TagRef {
                    repository: listing.repository.clone(),
                    tag: tag.clone(),
                });
            } else {
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        pool.logger()
            .detail(&format!("Skipping {} tags no rule can select", skipped));
    }

    pool.run("fetch metadata", items, move |item: TagRef| {
        let registry = Arc::clone(&registry);
        async move { registry.fetch_artifact(&item.repository, &item.tag).await }
    })
    .await
}

/// Delete every artifact, collecting per-item errors.
pub async fn delete_artifacts(
    pool: &WorkerPool,
    registry: Arc<dyn Registry>,
    artifacts: Vec<Artifact>,
) -> DeletionReport {
    let outcome = pool
        .run("delete", artifacts, move |artifact: Artifact| {
            let registry = Arc::clone(&registry);
            async move { registry.delete(&artifact).await }
        })
        .await;

    DeletionReport {
        deleted: outcome.successes.len(),
        errors: outcome.failures,
    }
}
