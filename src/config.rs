//! Configuration loading
//!
//! A YAML file names the registry, optional credentials and the retention rules.
//! Credential files and environment variables override inline values in that order.
//! Everything is validated up front: a bad configuration fails before any network I/O.

use crate::error::handlers::ValidationErrorHandler;
use crate::error::{PrunerError, Result};
use crate::pipeline::DEFAULT_PARALLELISM;
use crate::registry::Credentials;
use crate::rules::{Rule, Ruleset, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_USERNAME: &str = "REGISTRY_PRUNER_USERNAME";
pub const ENV_PASSWORD: &str = "REGISTRY_PRUNER_PASSWORD";
pub const ENV_PARALLELISM: &str = "REGISTRY_PRUNER_PARALLELISM";

/// One entry of the `rules` list, as written in the file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub repos: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub ignore_tags: Vec<String>,
    pub match_tags: Vec<String>,
    pub keep_versions: i64,
    pub keep_days: i64,
    pub keep_recent: i64,
}

impl RuleConfig {
    pub fn to_rule(&self) -> Result<Rule> {
        let ignore: Vec<&str> = self.ignore_tags.iter().map(String::as_str).collect();
        let matching: Vec<&str> = self.match_tags.iter().map(String::as_str).collect();

        let selector = self
            .labels
            .iter()
            .fold(Selector::new().with_repos(self.repos.iter().cloned()), |s, (k, v)| {
                s.with_label(k.clone(), v.clone())
            })
            .with_ignore_tags(&ignore)?
            .with_match_tags(&matching)?;

        Ok(Rule::from_counts(
            selector,
            self.keep_versions,
            self.keep_days,
            self.keep_recent,
        )?)
    }
}

/// The configuration file as written
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrunerConfig {
    pub registry: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub username_file: Option<PathBuf>,
    pub password_file: Option<PathBuf>,
    pub parallel_workers: Option<usize>,
    pub skip_tls: bool,
    pub timeout: Option<u64>,
    pub rules: Vec<RuleConfig>,
}

/// Validated settings ready to drive a run
#[derive(Debug, Clone)]
pub struct Settings {
    pub registry: String,
    pub credentials: Option<Credentials>,
    pub parallelism: usize,
    pub skip_tls: bool,
    pub timeout: Option<u64>,
    pub ruleset: Ruleset,
}

impl PrunerConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PrunerError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    /// Replace inline credentials with the contents of `username_file` / `password_file`.
    pub fn read_credential_files(mut self) -> Result<Self> {
        if let Some(path) = &self.username_file {
            self.username = Some(read_secret(path)?);
        }
        if let Some(path) = &self.password_file {
            self.password = Some(read_secret(path)?);
        }
        Ok(self)
    }

    /// Apply `REGISTRY_PRUNER_*` overrides looked up through `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(username) = lookup(ENV_USERNAME) {
            self.username = Some(username);
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.password = Some(password);
        }
        if let Some(raw) = lookup(ENV_PARALLELISM) {
            let workers = raw.trim().parse::<usize>().map_err(|_| {
                PrunerError::Config(format!(
                    "{} must be a non-negative integer, got '{}'",
                    ENV_PARALLELISM, raw
                ))
            })?;
            self.parallel_workers = Some(workers);
        }
        Ok(self)
    }

    /// Validate everything and compile the rules.
    pub fn resolve(self) -> Result<Settings> {
        let registry = self.registry.unwrap_or_default();
        ValidationErrorHandler::validate_registry_url(&registry)?;
        ValidationErrorHandler::validate_credentials(&self.username, &self.password)?;
        if let Some(timeout) = self.timeout {
            ValidationErrorHandler::validate_timeout(timeout)?;
        }

        if self.rules.is_empty() {
            return Err(PrunerError::Config(
                "no rules loaded - did you forget to specify the 'rules' list?".to_string(),
            ));
        }
        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                rule.to_rule()
                    .map_err(|e| PrunerError::Config(format!("rule #{}: {}", i + 1, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let credentials = match (self.username, self.password) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            _ => None,
        };

        Ok(Settings {
            registry,
            credentials,
            parallelism: match self.parallel_workers {
                None | Some(0) => DEFAULT_PARALLELISM,
                Some(n) => n,
            },
            skip_tls: self.skip_tls,
            timeout: self.timeout,
            ruleset: Ruleset::new(rules),
        })
    }
}

impl Settings {
    /// Load, apply credential files and process environment, and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_env(path, |key| std::env::var(key).ok())
    }

    pub fn from_file_with_env<F>(path: impl AsRef<Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        PrunerConfig::load(path)?
            .read_credential_files()?
            .apply_env(lookup)?
            .resolve()
    }
}

fn read_secret(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path).map_err(|e| {
        PrunerError::Config(format!("cannot read credential file {}: {}", path.display(), e))
    })?;
    Ok(raw.trim().to_string())
}
