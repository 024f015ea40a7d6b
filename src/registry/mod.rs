//! Registry module for Docker registry interactions
//!
//! [`Registry`] is the seam between the retention engine and a concrete registry.
//! [`RegistryClient`] implements it over the Docker Registry HTTP API v2 with basic and
//! bearer-token authentication; [`InMemoryRegistry`] implements it for tests.

pub mod auth;
pub mod client;
pub mod memory;

pub use auth::{Auth, BearerChallenge, Credentials};
pub use client::{RegistryClient, RegistryClientBuilder};
pub use memory::InMemoryRegistry;

use crate::artifact::Artifact;
use crate::error::Result;
use async_trait::async_trait;

/// Operations the pruner needs from a registry.
///
/// Every call is independent; the pipeline issues many of them concurrently.
#[async_trait]
pub trait Registry: Send + Sync {
    /// All repositories in the catalog
    async fn list_repositories(&self) -> Result<Vec<String>>;

    /// All tags of one repository
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>>;

    /// Fetch metadata for one tag. Unparseable metadata degrades to defaults;
    /// only transport and HTTP failures are errors.
    async fn fetch_artifact(&self, repository: &str, tag: &str) -> Result<Artifact>;

    /// Delete the manifest behind an artifact
    async fn delete(&self, artifact: &Artifact) -> Result<()>;
}
