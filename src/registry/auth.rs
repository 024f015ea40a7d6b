//! Authentication module for Docker registry access
//!
//! Requests carry basic credentials until the registry answers 401 with a `Bearer`
//! challenge. The token obtained from the challenge's realm is cached per scope and
//! used for every later request in that scope.

use crate::error::handlers::HttpErrorHandler;
use crate::error::{PrunerError, Result};
use crate::logging::Logger;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

static CHALLENGE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#).expect("valid challenge regex"));

/// Username and password for a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Parsed `WWW-Authenticate: Bearer realm="..",service="..",scope=".."` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl BearerChallenge {
    /// Returns `None` for non-Bearer schemes or a challenge without a realm.
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let params: HashMap<&str, &str> = CHALLENGE_PARAM
            .captures_iter(params)
            .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
            .collect();

        Some(Self {
            realm: params.get("realm")?.to_string(),
            service: params.get("service").map(|s| s.to_string()),
            scope: params.get("scope").map(|s| s.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Credential holder and bearer token cache, shared by all requests of one client
#[derive(Debug, Clone)]
pub struct Auth {
    client: Client,
    credentials: Option<Credentials>,
    tokens: Arc<RwLock<HashMap<String, String>>>,
    logger: Logger,
}

impl Auth {
    pub fn new(client: Client, credentials: Option<Credentials>, logger: Logger) -> Self {
        Self {
            client,
            credentials,
            tokens: Arc::new(RwLock::new(HashMap::new())),
            logger,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn cached_token(&self, scope: &str) -> Option<String> {
        self.tokens
            .read()
            .ok()
            .and_then(|tokens| tokens.get(scope).cloned())
    }

    /// Attach the cached bearer token for `scope`, or basic credentials when there is none.
    pub fn apply(&self, request: RequestBuilder, scope: &str) -> RequestBuilder {
        if let Some(token) = self.cached_token(scope) {
            return request.bearer_auth(token);
        }
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            None => request,
        }
    }

    /// Exchange a challenge for a token and cache it under `scope`.
    pub async fn authorize(&self, scope: &str, challenge: &BearerChallenge) -> Result<String> {
        let mut url = url::Url::parse(&challenge.realm)
            .map_err(|e| PrunerError::Auth(format!("Invalid token realm '{}': {}", challenge.realm, e)))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }
            query.append_pair("scope", challenge.scope.as_deref().unwrap_or(scope));
        }

        self.logger.detail(&format!("Requesting token from: {}", url));

        let mut request = self.client.get(url);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = request
            .send()
            .await
            .map_err(|e| PrunerError::Network(format!("Failed to get auth token: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HttpErrorHandler::handle_auth_error(status, &error_text));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PrunerError::Parse(format!("Failed to parse token response: {}", e)))?;
        let token = body
            .token
            .or(body.access_token)
            .ok_or_else(|| PrunerError::Auth("Token response carried no token".to_string()))?;

        self.logger
            .detail(&format!("Token obtained for scope {} ({} chars)", scope, token.len()));
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(scope.to_string(), token.clone());
        }
        Ok(token)
    }
}
