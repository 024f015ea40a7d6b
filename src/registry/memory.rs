//! In-memory registry for tests and dry runs
//!
//! Holds artifacts keyed by repository and supports injecting per-item failures
//! (errors or panics) so pipeline fault isolation can be exercised without a network.

use crate::artifact::Artifact;
use crate::error::{PrunerError, Result};
use crate::registry::Registry;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock};

type Key = (String, String);

#[derive(Debug, Default)]
struct State {
    repositories: BTreeMap<String, Vec<Artifact>>,
    failing_listings: HashSet<String>,
    failing_fetches: HashSet<Key>,
    panicking_fetches: HashSet<Key>,
    failing_deletes: HashSet<Key>,
    deleted: Vec<Key>,
}

fn poison_err<T>(_: PoisonError<T>) -> PrunerError {
    PrunerError::Registry("in-memory registry lock poisoned".to_string())
}

fn key(repository: &str, tag: &str) -> Key {
    (repository.to_string(), tag.to_string())
}

/// Thread-safe [`Registry`] backed by a map
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: RwLock<State>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact, replacing any artifact with the same repository and tag.
    pub fn with_artifact(self, artifact: Artifact) -> Self {
        if let Ok(mut state) = self.state.write() {
            let tags = state
                .repositories
                .entry(artifact.repository().to_string())
                .or_default();
            tags.retain(|a| a.tag() != artifact.tag());
            tags.push(artifact);
        }
        self
    }

    pub fn with_artifacts(self, artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        artifacts
            .into_iter()
            .fold(self, |registry, artifact| registry.with_artifact(artifact))
    }

    pub fn failing_listing(self, repository: &str) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.failing_listings.insert(repository.to_string());
        }
        self
    }

    pub fn failing_fetch(self, repository: &str, tag: &str) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.failing_fetches.insert(key(repository, tag));
        }
        self
    }

    pub fn panicking_fetch(self, repository: &str, tag: &str) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.panicking_fetches.insert(key(repository, tag));
        }
        self
    }

    pub fn failing_delete(self, repository: &str, tag: &str) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.failing_deletes.insert(key(repository, tag));
        }
        self
    }

    /// `(repository, tag)` pairs deleted so far, in completion order
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.state
            .read()
            .map(|state| state.deleted.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn list_repositories(&self) -> Result<Vec<String>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.repositories.keys().cloned().collect())
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let state = self.state.read().map_err(poison_err)?;
        if state.failing_listings.contains(repository) {
            return Err(PrunerError::Registry(format!(
                "list tags of {} failed",
                repository
            )));
        }
        Ok(state
            .repositories
            .get(repository)
            .map(|tags| tags.iter().map(|a| a.tag().to_string()).collect())
            .unwrap_or_default())
    }

    async fn fetch_artifact(&self, repository: &str, tag: &str) -> Result<Artifact> {
        let (should_panic, result) = {
            let state = self.state.read().map_err(poison_err)?;
            let id = key(repository, tag);
            let result = if state.failing_fetches.contains(&id) {
                Err(PrunerError::Registry(format!(
                    "fetch manifest {}:{} failed",
                    repository, tag
                )))
            } else {
                state
                    .repositories
                    .get(repository)
                    .and_then(|tags| tags.iter().find(|a| a.tag() == tag))
                    .cloned()
                    .ok_or_else(|| {
                        PrunerError::Registry(format!("manifest {}:{} not found", repository, tag))
                    })
            };
            (state.panicking_fetches.contains(&id), result)
        };

        if should_panic {
            panic!("fetch of {}:{} panicked", repository, tag);
        }
        result
    }

    async fn delete(&self, artifact: &Artifact) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let id = key(artifact.repository(), artifact.tag());
        if state.failing_deletes.contains(&id) {
            return Err(PrunerError::Registry(format!("delete {} failed", artifact)));
        }

        let tags = state
            .repositories
            .get_mut(artifact.repository())
            .ok_or_else(|| PrunerError::Registry(format!("repository of {} not found", artifact)))?;
        let before = tags.len();
        tags.retain(|a| a.tag() != artifact.tag());
        if tags.len() == before {
            return Err(PrunerError::Registry(format!("manifest {} not found", artifact)));
        }

        state.deleted.push(id);
        Ok(())
    }
}
