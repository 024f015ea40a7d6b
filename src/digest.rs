//! SHA256 manifest digests
//!
//! Registries address manifests for deletion by content digest. When a registry does not
//! return `Docker-Content-Digest`, the digest is computed locally from the manifest body.

use crate::error::{PrunerError, Result};
use sha2::{Digest, Sha256};

const SHA256_PREFIX: &str = "sha256:";

/// Utilities for working with SHA256 digests in registry context
pub struct DigestUtils;

impl DigestUtils {
    /// Hex SHA256 of `data`
    pub fn compute_sha256(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    /// Full digest (`sha256:<hex>`) of a manifest body
    pub fn compute_docker_digest(data: &[u8]) -> String {
        format!("{}{}", SHA256_PREFIX, Self::compute_sha256(data))
    }

    /// 64 lowercase-or-uppercase hex characters
    pub fn is_valid_sha256_hex(digest: &str) -> bool {
        digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
    }

    pub fn is_valid_docker_digest(digest: &str) -> bool {
        digest
            .strip_prefix(SHA256_PREFIX)
            .is_some_and(Self::is_valid_sha256_hex)
    }

    /// Accept a digest with or without the `sha256:` prefix and return the prefixed form.
    pub fn normalize_digest(digest: &str) -> Result<String> {
        let digest = digest.trim();
        let hex_part = digest.strip_prefix(SHA256_PREFIX).unwrap_or(digest);
        if !Self::is_valid_sha256_hex(hex_part) {
            return Err(PrunerError::Parse(format!(
                "Invalid SHA256 digest '{}': expected 64 hex characters",
                digest
            )));
        }
        Ok(format!("{}{}", SHA256_PREFIX, hex_part.to_ascii_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_compute_docker_digest() {
        assert_eq!(DigestUtils::compute_sha256(b""), EMPTY);
        assert_eq!(
            DigestUtils::compute_docker_digest(b""),
            format!("sha256:{}", EMPTY)
        );
    }

    #[test]
    fn test_digest_validation() {
        assert!(DigestUtils::is_valid_docker_digest(&format!("sha256:{}", EMPTY)));
        assert!(!DigestUtils::is_valid_docker_digest(EMPTY));
        assert!(!DigestUtils::is_valid_docker_digest("sha256:abc"));
    }

    #[test]
    fn test_normalize_digest() {
        let expected = format!("sha256:{}", EMPTY);
        assert_eq!(DigestUtils::normalize_digest(EMPTY).unwrap(), expected);
        assert_eq!(
            DigestUtils::normalize_digest(&format!(" sha256:{} ", EMPTY.to_uppercase())).unwrap(),
            expected
        );
        assert!(DigestUtils::normalize_digest("sha256:xyz").is_err());
    }
}
