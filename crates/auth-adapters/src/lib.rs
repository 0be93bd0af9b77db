//! # auth-adapters
//!
//! Argon2-based implementation of `CredentialHasher`.
//! Hashing is CPU-bound, so both directions run on the blocking pool.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use domains::{CredentialHasher, DomainError, Result};
use tracing::{error, warn};

/// Produces PHC-format `$argon2id$...` strings with a fresh salt per call.
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher;

impl Argon2Hasher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CredentialHasher for Argon2Hasher {
    async fn hash_password(&self, password: &str) -> Result<String> {
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| {
                    error!(error = %e, "password hashing failed");
                    DomainError::Internal("password hashing failed".into())
                })
        })
        .await
        .map_err(|e| {
            error!(error = %e, "hashing task panicked");
            DomainError::Internal("password hashing failed".into())
        })?
    }

    /// Verifies if a provided password matches a stored Argon2 hash.
    /// Malformed hashes never verify.
    async fn verify_password(&self, password: &str, hash: &str) -> bool {
        let (password, hash) = (password.to_owned(), hash.to_owned());
        let verified = tokio::task::spawn_blocking(move || {
            let parsed_hash = match PasswordHash::new(&hash) {
                Ok(p) => p,
                Err(_) => {
                    warn!("stored password hash is not in PHC format");
                    return false;
                }
            };
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok()
        })
        .await;
        verified.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_then_verify() {
        let hasher = Argon2Hasher::new();
        let hash = hasher.hash_password("correct horse battery").await.unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(!hash.contains("correct horse"));
        assert!(hasher.verify_password("correct horse battery", &hash).await);
        assert!(!hasher.verify_password("wrong horse battery", &hash).await);
    }

    #[tokio::test]
    async fn test_salts_differ_per_hash() {
        let hasher = Argon2Hasher::new();
        let a = hasher.hash_password("same password").await.unwrap();
        let b = hasher.hash_password("same password").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_malformed_hash_never_verifies() {
        let hasher = Argon2Hasher::new();
        assert!(!hasher.verify_password("anything", "not-a-phc-string").await);
        assert!(!hasher.verify_password("", "").await);
    }
}
