//! Pruning orchestration
//!
//! list tags → fetch metadata → filter by selectors → classify → (delete).
//! Planning never touches the registry beyond reads; only [`Pruner::execute`] deletes.

use crate::artifact::Artifact;
use crate::error::Result;
use crate::logging::Logger;
use crate::pipeline::{
    DeletionReport, ItemFailure, WorkerPool, delete_artifacts, fetch_artifacts, list_tags,
};
use crate::registry::Registry;
use crate::rules::{Classification, Reconciler, Ruleset, filter_artifacts};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Keep/delete decision for a registry snapshot, plus what could not be scanned
#[derive(Debug)]
pub struct Plan {
    pub classification: Classification,
    /// Repositories or tags that could not be listed or fetched
    pub scan_failures: Vec<ItemFailure>,
    pub now: DateTime<Utc>,
}

impl Plan {
    pub fn keep(&self) -> &[Artifact] {
        &self.classification.keep
    }

    pub fn delete(&self) -> &[Artifact] {
        &self.classification.delete
    }
}

pub struct Pruner {
    registry: Arc<dyn Registry>,
    ruleset: Ruleset,
    pool: WorkerPool,
    logger: Logger,
}

impl Pruner {
    pub fn new(
        registry: Arc<dyn Registry>,
        ruleset: Ruleset,
        parallelism: usize,
        logger: Logger,
    ) -> Self {
        Self {
            registry,
            ruleset,
            pool: WorkerPool::new(parallelism, logger.clone()),
            logger,
        }
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Repositories named by the rules, or the whole catalog when a rule selects by
    /// labels alone.
    pub async fn repositories(&self) -> Result<Vec<String>> {
        if self.ruleset.spans_all_repositories() {
            self.logger
                .detail("A rule selects by labels only, scanning the whole catalog");
            let mut repositories = self.registry.list_repositories().await?;
            repositories.sort();
            repositories.dedup();
            return Ok(repositories);
        }
        Ok(self.ruleset.repositories())
    }

    /// Snapshot the registry and classify every selected artifact as of `now`.
    pub async fn plan(&self, now: DateTime<Utc>) -> Result<Plan> {
        self.logger.section("Scanning registry");
        let repositories = self.repositories().await?;
        self.logger
            .info(&format!("Scanning {} repositories", repositories.len()));

        let listed = list_tags(&self.pool, Arc::clone(&self.registry), repositories).await;
        let tag_count: usize = listed.successes.iter().map(|r| r.tags.len()).sum();
        self.logger.info(&format!("Found {} tags", tag_count));

        let selectors = self.ruleset.selectors();
        let fetched = fetch_artifacts(
            &self.pool,
            Arc::clone(&self.registry),
            &listed.successes,
            &selectors,
        )
        .await;

        let mut scan_failures = listed.failures;
        scan_failures.extend(fetched.failures);
        scan_failures.sort_by(|a, b| a.label.cmp(&b.label));
        if !scan_failures.is_empty() {
            self.logger.warning(&format!(
                "{} repositories or tags could not be scanned",
                scan_failures.len()
            ));
        }

        let artifacts = filter_artifacts(fetched.successes, &selectors);
        self.logger
            .detail(&format!("{} artifacts selected by the rules", artifacts.len()));

        self.logger.section("Applying rules");
        for rule in &self.ruleset {
            self.logger.detail(&rule.to_string());
        }
        let classification = Reconciler::new(self.logger.clone()).apply(&self.ruleset, &artifacts, now);

        Ok(Plan {
            classification,
            scan_failures,
            now,
        })
    }

    /// Delete everything the plan marks for deletion.
    pub async fn execute(&self, plan: &Plan) -> DeletionReport {
        self.logger.section("Deleting images");
        let report = delete_artifacts(
            &self.pool,
            Arc::clone(&self.registry),
            plan.delete().to_vec(),
        )
        .await;
        for failure in &report.errors {
            self.logger
                .error(&format!("{}: {}", failure.label, failure.error));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::rules::{RetentionPolicy, Rule, Selector};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Delays each fetch by a varying amount so results arrive in a different order
    /// from run to run.
    struct StaggeredRegistry {
        inner: InMemoryRegistry,
        calls: AtomicU64,
    }

    #[async_trait]
    impl Registry for StaggeredRegistry {
        async fn list_repositories(&self) -> Result<Vec<String>> {
            self.inner.list_repositories().await
        }

        async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
            self.inner.list_tags(repository).await
        }

        async fn fetch_artifact(&self, repository: &str, tag: &str) -> Result<Artifact> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis((n * 37) % 11)).await;
            self.inner.fetch_artifact(repository, tag).await
        }

        async fn delete(&self, artifact: &Artifact) -> Result<()> {
            self.inner.delete(artifact).await
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn aged(repo: &str, tag: &str, days: i64) -> Artifact {
        Artifact::with_last_modified(repo, tag, now() - Duration::days(days))
    }

    fn registry() -> InMemoryRegistry {
        InMemoryRegistry::new().with_artifacts([
            aged("web/app", "1.0.0", 90),
            aged("web/app", "1.1.0", 60),
            aged("web/app", "1.2.0", 10),
            aged("web/app", "latest", 1),
            aged("other/app", "1.0.0", 400),
        ])
    }

    #[tokio::test]
    async fn test_plan_scans_only_named_repositories() {
        let rule = Rule::new(
            Selector::new().with_repos(["web/app"]),
            RetentionPolicy::KeepVersions(2),
        )
        .unwrap();
        let pruner = Pruner::new(
            Arc::new(registry()),
            Ruleset::new(vec![rule]),
            4,
            Logger::new_quiet(),
        );

        assert_eq!(pruner.repositories().await.unwrap(), vec!["web/app"]);
        let plan = pruner.plan(now()).await.unwrap();
        assert!(plan.classification.is_deleted("web/app", "1.0.0"));
        assert!(plan.classification.is_kept("web/app", "1.1.0"));
        assert!(plan.classification.is_kept("web/app", "1.2.0"));
        assert!(!plan.classification.is_kept("other/app", "1.0.0"));
        assert!(!plan.classification.is_deleted("other/app", "1.0.0"));
        assert!(plan.scan_failures.is_empty());
    }

    #[tokio::test]
    async fn test_plan_is_stable_when_fetches_finish_out_of_order() {
        // equal (epoch) timestamps, so only tag order can break the tie
        let registry = StaggeredRegistry {
            inner: InMemoryRegistry::new()
                .with_artifacts(["a", "b", "c", "d", "e"].map(|t| Artifact::new("web/app", t))),
            calls: AtomicU64::new(0),
        };
        let rule = Rule::new(
            Selector::new().with_repos(["web/app"]),
            RetentionPolicy::KeepMostRecent(1),
        )
        .unwrap();
        let pruner = Pruner::new(
            Arc::new(registry),
            Ruleset::new(vec![rule]),
            5,
            Logger::new_quiet(),
        );

        let mut seen = BTreeSet::new();
        for _ in 0..10 {
            let plan = pruner.plan(now()).await.unwrap();
            let kept: Vec<String> = plan.keep().iter().map(|a| a.tag().to_string()).collect();
            seen.insert(kept);
        }

        assert_eq!(seen, BTreeSet::from([vec!["e".to_string()]]));
    }

    #[tokio::test]
    async fn test_label_only_rule_scans_catalog() {
        let labels = BTreeMap::from([("owner".to_string(), "ops".to_string())]);
        let registry = InMemoryRegistry::new().with_artifacts([
            aged("a/one", "1", 50).with_labels(labels.clone()),
            aged("b/two", "1", 50).with_labels(labels),
            aged("c/three", "1", 50),
        ]);
        let rule = Rule::new(
            Selector::new().with_label("owner", "ops"),
            RetentionPolicy::KeepDays(30),
        )
        .unwrap();
        let pruner = Pruner::new(
            Arc::new(registry),
            Ruleset::new(vec![rule]),
            2,
            Logger::new_quiet(),
        );

        assert_eq!(
            pruner.repositories().await.unwrap(),
            vec!["a/one", "b/two", "c/three"]
        );
        let plan = pruner.plan(now()).await.unwrap();
        assert_eq!(plan.delete().len(), 2);
        assert!(!plan.classification.is_deleted("c/three", "1"));
    }

    #[tokio::test]
    async fn test_execute_deletes_planned_artifacts() {
        let registry = Arc::new(registry().failing_delete("web/app", "1.1.0"));
        let rule = Rule::new(
            Selector::new().with_repos(["web/app"]),
            RetentionPolicy::KeepMostRecent(1),
        )
        .unwrap();
        let pruner = Pruner::new(
            registry.clone(),
            Ruleset::new(vec![rule]),
            4,
            Logger::new_quiet(),
        );

        let plan = pruner.plan(now()).await.unwrap();
        assert_eq!(plan.delete().len(), 2);

        let report = pruner.execute(&plan).await;
        assert_eq!(report.deleted, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(
            registry.deleted(),
            vec![("web/app".to_string(), "1.0.0".to_string())]
        );
    }
}
