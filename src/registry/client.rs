//! Docker Registry HTTP API v2 client
//!
//! Lists the catalog and tags (following `Link` pagination), fetches manifests and image
//! configuration blobs to build [`Artifact`]s, and deletes manifests by digest.

use crate::artifact::{Artifact, ImageMetadata};
use crate::digest::DigestUtils;
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{PrunerError, Result};
use crate::logging::Logger;
use crate::registry::Registry;
use crate::registry::auth::{Auth, BearerChallenge, Credentials};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, LINK, WWW_AUTHENTICATE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const MANIFEST_V1: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";
const MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
const MANIFEST_LIST_V2: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

const DIGEST_HEADER: &str = "docker-content-digest";
const CATALOG_PAGE_SIZE: usize = 1000;

/// Shape of a fetched manifest, as far as metadata extraction cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestKind {
    Schema1,
    Image { config_digest: String },
    Index,
    Unknown,
}

impl ManifestKind {
    pub fn classify(manifest: &Value) -> Self {
        if manifest.get("schemaVersion").and_then(Value::as_i64) == Some(1) {
            return ManifestKind::Schema1;
        }
        if let Some(digest) = manifest.pointer("/config/digest").and_then(Value::as_str) {
            return ManifestKind::Image {
                config_digest: digest.to_string(),
            };
        }
        if manifest.get("manifests").is_some() {
            return ManifestKind::Index;
        }
        ManifestKind::Unknown
    }
}

#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(default)]
    repositories: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TagsPage {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Extract the `rel="next"` target of a `Link` header, resolved against `base`.
pub fn next_page_url(link: &str, base: &Url) -> Option<Url> {
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.contains(r#"rel="next""#) {
            return None;
        }
        let target = target.trim().trim_start_matches('<').trim_end_matches('>');
        base.join(target).ok()
    })
}

pub struct RegistryClientBuilder {
    address: String,
    credentials: Option<Credentials>,
    skip_tls: bool,
    timeout: Option<u64>,
    logger: Logger,
}

impl RegistryClientBuilder {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: None,
            skip_tls: false,
            timeout: None,
            logger: Logger::new_quiet(),
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_skip_tls(mut self, skip_tls: bool) -> Self {
        self.skip_tls = skip_tls;
        self
    }

    /// Per-request timeout in seconds
    pub fn with_timeout(mut self, timeout: Option<u64>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        let address = self.address.trim_end_matches('/').to_string();
        Url::parse(&address)?;

        let mut builder = Client::builder();
        if self.skip_tls {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        if let Some(secs) = self.timeout {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| PrunerError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let auth = Auth::new(client.clone(), self.credentials, self.logger.clone());

        Ok(RegistryClient {
            client,
            address,
            auth,
            logger: self.logger,
        })
    }
}

/// HTTP implementation of [`Registry`]
pub struct RegistryClient {
    client: Client,
    address: String,
    auth: Auth,
    logger: Logger,
}

impl RegistryClient {
    pub fn builder(address: impl Into<String>) -> RegistryClientBuilder {
        RegistryClientBuilder::new(address)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn pull_scope(repository: &str) -> String {
        format!("repository:{}:pull", repository)
    }

    fn delete_scope(repository: &str) -> String {
        format!("repository:{}:pull,delete", repository)
    }

    /// Send a request, answering one bearer challenge and retrying once.
    async fn send<F>(&self, operation: &str, scope: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let response = self
            .auth
            .apply(build(), scope)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, operation))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(BearerChallenge::parse);
        let Some(challenge) = challenge else {
            return Ok(response);
        };

        self.logger.debug(&format!(
            "{} requires a token (realm {}), retrying",
            operation, challenge.realm
        ));
        self.auth.authorize(scope, &challenge).await?;

        self.auth
            .apply(build(), scope)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, operation))
    }

    async fn check_status(response: Response, operation: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response.text().await.unwrap_or_default();
        Err(HttpErrorHandler::handle_registry_error(
            status,
            &error_text,
            operation,
        ))
    }

    /// GET every page of a paginated listing.
    async fn get_paged<T, F>(
        &self,
        first: Url,
        operation: &str,
        scope: &str,
        extract: F,
    ) -> Result<Vec<String>>
    where
        T: serde::de::DeserializeOwned,
        F: Fn(T) -> Vec<String>,
    {
        let mut items = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            let response = self
                .send(operation, scope, || self.client.get(url.clone()))
                .await?;
            let response = Self::check_status(response, operation).await?;

            next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(|link| next_page_url(link, &url));

            let page: T = response
                .json()
                .await
                .map_err(|e| PrunerError::Parse(format!("{}: invalid response: {}", operation, e)))?;
            items.extend(extract(page));
        }

        Ok(items)
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{}", self.address, path))?)
    }

    async fn fetch_config_blob(&self, repository: &str, digest: &str) -> Result<Option<Value>> {
        let operation = format!("fetch config {}@{}", repository, digest);
        let url = self.url(&format!("/v2/{}/blobs/{}", repository, digest))?;
        let response = self
            .send(&operation, &Self::pull_scope(repository), || {
                self.client.get(url.clone())
            })
            .await?;
        let bytes = Self::check_status(response, &operation).await?.bytes().await?;

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                self.logger
                    .warning(&format!("{}: unreadable config blob: {}", operation, e));
                Ok(None)
            }
        }
    }

    /// Resolve a tag to its manifest digest with a HEAD request.
    pub async fn resolve_digest(&self, repository: &str, tag: &str) -> Result<String> {
        let operation = format!("resolve digest {}:{}", repository, tag);
        let url = self.url(&format!("/v2/{}/manifests/{}", repository, tag))?;
        let response = self
            .send(&operation, &Self::pull_scope(repository), || {
                self.client.head(url.clone()).header(ACCEPT, manifest_accept())
            })
            .await?;
        let response = Self::check_status(response, &operation).await?;

        if let Some(digest) = response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            return DigestUtils::normalize_digest(digest);
        }

        // No digest header: hash the manifest body instead.
        let response = self
            .send(&operation, &Self::pull_scope(repository), || {
                self.client.get(url.clone()).header(ACCEPT, manifest_accept())
            })
            .await?;
        let body = Self::check_status(response, &operation).await?.bytes().await?;
        Ok(DigestUtils::compute_docker_digest(&body))
    }
}

fn manifest_accept() -> String {
    [MANIFEST_V2, OCI_MANIFEST, MANIFEST_LIST_V2, OCI_INDEX, MANIFEST_V1].join(", ")
}

#[async_trait]
impl Registry for RegistryClient {
    async fn list_repositories(&self) -> Result<Vec<String>> {
        let mut url = self.url("/v2/_catalog")?;
        url.query_pairs_mut()
            .append_pair("n", &CATALOG_PAGE_SIZE.to_string());
        let repositories = self
            .get_paged(url, "list catalog", "registry:catalog:*", |page: CatalogPage| {
                page.repositories.unwrap_or_default()
            })
            .await?;
        self.logger
            .detail(&format!("Catalog lists {} repositories", repositories.len()));
        Ok(repositories)
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let operation = format!("list tags of {}", repository);
        let url = self.url(&format!("/v2/{}/tags/list", repository))?;
        self.get_paged(url, &operation, &Self::pull_scope(repository), |page: TagsPage| {
            page.tags.unwrap_or_default()
        })
        .await
    }

    async fn fetch_artifact(&self, repository: &str, tag: &str) -> Result<Artifact> {
        let operation = format!("fetch manifest {}:{}", repository, tag);
        let url = self.url(&format!("/v2/{}/manifests/{}", repository, tag))?;
        let response = self
            .send(&operation, &Self::pull_scope(repository), || {
                self.client.get(url.clone()).header(ACCEPT, manifest_accept())
            })
            .await?;
        let response = Self::check_status(response, &operation).await?;

        let header_digest = response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|d| DigestUtils::normalize_digest(d).ok());
        let body = response.bytes().await?;
        let digest = header_digest.unwrap_or_else(|| DigestUtils::compute_docker_digest(&body));

        let manifest = match serde_json::from_slice::<Value>(&body) {
            Ok(manifest) => manifest,
            Err(e) => {
                self.logger
                    .warning(&format!("{}: unreadable manifest: {}", operation, e));
                Value::Null
            }
        };

        let metadata = match ManifestKind::classify(&manifest) {
            ManifestKind::Schema1 => ImageMetadata::from_schema1_manifest(&manifest),
            ManifestKind::Image { config_digest } => {
                match self.fetch_config_blob(repository, &config_digest).await? {
                    Some(config) => ImageMetadata::from_image_config(&config),
                    None => ImageMetadata::new(),
                }
            }
            ManifestKind::Index | ManifestKind::Unknown => {
                self.logger.debug(&format!(
                    "{}: no image metadata in manifest, using defaults",
                    operation
                ));
                ImageMetadata::new()
            }
        };

        Ok(Artifact::from_metadata(
            repository,
            tag,
            &metadata.with_digest(Some(digest)),
        ))
    }

    async fn delete(&self, artifact: &Artifact) -> Result<()> {
        let repository = artifact.repository();
        let digest = match artifact.digest() {
            Some(digest) => digest.to_string(),
            None => self.resolve_digest(repository, artifact.tag()).await?,
        };

        let operation = format!("delete {}", artifact);
        let url = self.url(&format!("/v2/{}/manifests/{}", repository, digest))?;
        let response = self
            .send(&operation, &Self::delete_scope(repository), || {
                self.client.delete(url.clone())
            })
            .await?;
        Self::check_status(response, &operation).await?;

        self.logger
            .detail(&format!("Deleted {} ({})", artifact, digest));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_manifests() {
        assert_eq!(
            ManifestKind::classify(&json!({"schemaVersion": 1, "history": []})),
            ManifestKind::Schema1
        );
        assert_eq!(
            ManifestKind::classify(&json!({
                "schemaVersion": 2,
                "mediaType": MANIFEST_V2,
                "config": {"digest": "sha256:abc"}
            })),
            ManifestKind::Image {
                config_digest: "sha256:abc".to_string()
            }
        );
        assert_eq!(
            ManifestKind::classify(&json!({"schemaVersion": 2, "manifests": []})),
            ManifestKind::Index
        );
        assert_eq!(ManifestKind::classify(&Value::Null), ManifestKind::Unknown);
    }

    #[test]
    fn test_next_page_url() {
        let base = Url::parse("https://registry.example.com/v2/_catalog?n=2").unwrap();
        let next = next_page_url(r#"</v2/_catalog?last=b&n=2>; rel="next""#, &base).unwrap();
        assert_eq!(
            next.as_str(),
            "https://registry.example.com/v2/_catalog?last=b&n=2"
        );
        assert!(next_page_url(r#"</v2/_catalog?last=b>; rel="prev""#, &base).is_none());
    }

    #[test]
    fn test_builder_normalizes_address() {
        let client = RegistryClient::builder("https://registry.example.com/")
            .with_timeout(Some(30))
            .build()
            .unwrap();
        assert_eq!(client.address(), "https://registry.example.com");
        assert_eq!(
            client.url("/v2/team/app/tags/list").unwrap().as_str(),
            "https://registry.example.com/v2/team/app/tags/list"
        );
    }

    #[test]
    fn test_builder_rejects_invalid_address() {
        assert!(RegistryClient::builder("not a url").build().is_err());
    }
}
