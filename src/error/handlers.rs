//! Standardized error construction for registry responses and configuration checks

use crate::error::{PrunerError, Result};
use reqwest::StatusCode;

/// Maps non-success registry responses onto [`PrunerError`]
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Error for a failed registry API call; `operation` names the call, e.g. "tag listing".
    pub fn handle_registry_error(
        status: StatusCode,
        error_text: &str,
        operation: &str,
    ) -> PrunerError {
        let reason = match status {
            StatusCode::UNAUTHORIZED => "credentials rejected",
            StatusCode::FORBIDDEN => "account lacks the required scope",
            StatusCode::NOT_FOUND => "repository, tag or manifest does not exist",
            StatusCode::METHOD_NOT_ALLOWED => "registry refused; is deletion enabled on the registry?",
            StatusCode::TOO_MANY_REQUESTS => "rate limited, lower parallel_workers",
            s if s.is_server_error() => "registry-side failure",
            _ => "unexpected response",
        };

        PrunerError::Registry(format!(
            "{} returned {} ({}): {}",
            operation,
            status.as_u16(),
            reason,
            error_text.trim()
        ))
    }

    /// Error for a failed token request against the challenge realm
    pub fn handle_auth_error(status: StatusCode, error_text: &str) -> PrunerError {
        let reason = match status {
            StatusCode::BAD_REQUEST => "token service rejected the scope or service parameters",
            StatusCode::UNAUTHORIZED => "token service rejected the configured credentials",
            StatusCode::FORBIDDEN => "token service denied the requested scope",
            StatusCode::NOT_FOUND => "token realm from the challenge does not exist",
            _ => "token request failed",
        };

        PrunerError::Auth(format!(
            "{} (status {}): {}",
            reason,
            status.as_u16(),
            error_text.trim()
        ))
    }
}

/// Maps transport failures onto [`PrunerError::Network`]
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    pub fn handle_network_error(error: &reqwest::Error, context: &str) -> PrunerError {
        let kind = if error.is_timeout() {
            "timed out"
        } else if error.is_connect() {
            "could not connect"
        } else if error.to_string().contains("certificate") {
            "TLS verification failed (see skip_tls)"
        } else {
            "transport error"
        };
        PrunerError::Network(format!("{}: {}: {}", context, kind, error))
    }
}

/// Checks applied while resolving a configuration file
pub struct ValidationErrorHandler;

impl ValidationErrorHandler {
    /// Registry endpoints must be absolute http(s) URLs
    pub fn validate_registry_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(PrunerError::Config("missing 'registry' key".to_string()));
        }

        let parsed = url::Url::parse(url)?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(PrunerError::Config(format!(
                "registry URL must use http or https, got '{}'",
                other
            ))),
        }
    }

    /// A username without a password (or the reverse) is a configuration mistake.
    pub fn validate_credentials(user: &Option<String>, pass: &Option<String>) -> Result<()> {
        let missing = match (user, pass) {
            (Some(_), None) => "password",
            (None, Some(_)) => "username",
            _ => return Ok(()),
        };
        Err(PrunerError::Config(format!(
            "registry credentials are incomplete: {} is not set",
            missing
        )))
    }

    /// Request timeout in seconds, 1..=3600
    pub fn validate_timeout(timeout: u64) -> Result<()> {
        if (1..=3600).contains(&timeout) {
            Ok(())
        } else {
            Err(PrunerError::Config(format!(
                "timeout must be between 1 and 3600 seconds, got {}",
                timeout
            )))
        }
    }
}
